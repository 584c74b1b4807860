//! Process-wide application state.
//!
//! `CoreState` is built once at startup and shared (behind `Arc`) by every
//! HTTP handler. It owns the loaded model registry, the narrative client
//! and the summary store, and the analyzer wired from them.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, LlmFlavor};
use crate::db::{self, DatabaseError, SqliteSummaryStore, SummaryStore};
use crate::pipeline::extraction::PdfDocumentExtractor;
use crate::pipeline::inference::ModelRegistry;
use crate::pipeline::narrative::{
    ChatCompletionsClient, NarrativeClient, NarrativeError, OllamaClient, RetryingClient,
};
use crate::pipeline::processor::DocumentAnalyzer;

/// First retry delay for the narrative service; doubles per attempt.
const NARRATIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Startup failures. Model problems are not among them: a missing or
/// broken model only degrades analysis.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Narrative client error: {0}")]
    Narrative(#[from] NarrativeError),
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: AppConfig,
    analyzer: DocumentAnalyzer,
    registry: Arc<ModelRegistry>,
    narrator: Arc<dyn NarrativeClient>,
    store: Arc<dyn SummaryStore>,
}

impl CoreState {
    /// Load models, open the summaries database and build the narrative
    /// client described by `config`.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let registry = Arc::new(ModelRegistry::load(&config.models_dir, &config.inference));
        let status = registry.status();
        tracing::info!(
            strategy = ?status.strategy,
            models_dir = %config.models_dir.display(),
            "Model registry loaded"
        );

        let conn = db::open_database(&config.database_path)?;
        let store: Arc<dyn SummaryStore> = Arc::new(SqliteSummaryStore::new(conn));

        let narrator: Arc<dyn NarrativeClient> = Arc::new(RetryingClient::new(
            build_narrator(&config)?,
            config.llm_retries,
            NARRATIVE_BACKOFF,
        ));
        tracing::info!(
            flavor = ?config.llm_flavor(),
            url = config.effective_llm_url(),
            model = narrator.model(),
            "Narrative client ready"
        );

        Ok(Self::from_parts(config, registry, narrator, store))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: AppConfig,
        registry: Arc<ModelRegistry>,
        narrator: Arc<dyn NarrativeClient>,
        store: Arc<dyn SummaryStore>,
    ) -> Self {
        let analyzer = DocumentAnalyzer::new(
            Box::new(PdfDocumentExtractor),
            registry.clone(),
            narrator.clone(),
            store.clone(),
        );
        Self {
            config,
            analyzer,
            registry,
            narrator,
            store,
        }
    }

    pub fn analyzer(&self) -> &DocumentAnalyzer {
        &self.analyzer
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn narrator(&self) -> &dyn NarrativeClient {
        self.narrator.as_ref()
    }

    pub fn store(&self) -> &dyn SummaryStore {
        self.store.as_ref()
    }
}

fn build_narrator(config: &AppConfig) -> Result<Box<dyn NarrativeClient>, NarrativeError> {
    let url = config.effective_llm_url();
    let model = config.effective_llm_model();
    Ok(match (config.llm_flavor(), config.llm_api_key.as_deref()) {
        (LlmFlavor::ChatCompletions, Some(key)) => Box::new(ChatCompletionsClient::new(
            url,
            model,
            key,
            config.llm_timeout_secs,
        )?),
        _ => Box::new(OllamaClient::new(url, model, config.llm_timeout_secs)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::inference::InferenceConfig;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            models_dir: dir.join("models"),
            database_path: dir.join("data").join("summaries.db"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn starts_without_any_model() {
        let tmp = tempfile::tempdir().unwrap();
        let core = CoreState::from_config(config_in(tmp.path())).unwrap();
        assert!(core.registry().strategy().is_none());
        assert!(tmp.path().join("data").join("summaries.db").exists());
        assert_eq!(core.narrator().model(), crate::config::DEFAULT_LLM_MODEL);
    }

    #[test]
    fn api_key_builds_hosted_client() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            llm_api_key: Some("gsk_test".into()),
            ..config_in(tmp.path())
        };
        let core = CoreState::from_config(config).unwrap();
        assert_eq!(core.narrator().model(), crate::config::DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn unopenable_database_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the database file should be
        let blocked = tmp.path().join("summaries.db");
        std::fs::create_dir_all(&blocked).unwrap();
        let config = AppConfig {
            database_path: blocked,
            ..config_in(tmp.path())
        };
        assert!(matches!(
            CoreState::from_config(config),
            Err(CoreError::Database(_))
        ));
    }

    #[test]
    fn from_parts_shares_collaborators() {
        let registry = Arc::new(ModelRegistry::empty(InferenceConfig::default()));
        let narrator = Arc::new(crate::pipeline::narrative::MockNarrativeClient::new("ok"));
        let store = Arc::new(SqliteSummaryStore::new(db::open_memory_database().unwrap()));
        let core = CoreState::from_parts(AppConfig::default(), registry, narrator, store);
        assert!(core.store().list("nobody").unwrap().is_empty());
        assert_eq!(core.narrator().model(), "mock");
        assert!(core.analyzer().registry().strategy().is_none());
    }
}
