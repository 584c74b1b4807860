use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::pipeline::inference::InferenceConfig;

/// Application-level constants
pub const APP_NAME: &str = "LucidCare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for the analysis API.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Default narrative endpoint: a local Ollama instance.
pub const DEFAULT_LLM_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LLM_RETRIES: u32 = 2;

/// Hosted OpenAI-compatible endpoint used when only an API key is given.
pub const DEFAULT_CHAT_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

/// Get the application data directory
/// ~/LucidCare/ on all platforms. Falls back to the working directory
/// when no home directory can be resolved (containers, service accounts).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the models directory (classifier, detector, Grad-CAM companion graph)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Get the summaries database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("summaries.db")
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "lucidcare=info,tower_http=info,ort=warn"
}

/// Which text-completion API the narrative collaborator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmFlavor {
    /// Ollama `/api/generate`
    Ollama,
    /// OpenAI-compatible `/chat/completions` (Groq, vLLM, ...)
    ChatCompletions,
}

/// Runtime configuration assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub models_dir: PathBuf,
    pub database_path: PathBuf,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub llm_retries: u32,
    pub inference: InferenceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            models_dir: models_dir(),
            database_path: database_path(),
            llm_url: DEFAULT_LLM_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            llm_retries: DEFAULT_LLM_RETRIES,
            inference: InferenceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build configuration from `LUCIDCARE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (testable without
    /// touching the process environment).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("LUCIDCARE_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("LUCIDCARE_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        config.bind = parse_or_default(&lookup, "LUCIDCARE_BIND", config.bind);
        if let Some(url) = lookup("LUCIDCARE_LLM_URL") {
            config.llm_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LUCIDCARE_LLM_MODEL") {
            config.llm_model = model;
        }
        config.llm_api_key = lookup("LUCIDCARE_LLM_API_KEY").filter(|k| !k.trim().is_empty());
        config.llm_timeout_secs =
            parse_or_default(&lookup, "LUCIDCARE_LLM_TIMEOUT_SECS", config.llm_timeout_secs);
        config.llm_retries = parse_or_default(&lookup, "LUCIDCARE_LLM_RETRIES", config.llm_retries);
        config.inference.acceptance_threshold = parse_or_default(
            &lookup,
            "LUCIDCARE_DETECTOR_THRESHOLD",
            config.inference.acceptance_threshold,
        );

        config
    }

    /// An API key means a hosted OpenAI-compatible endpoint; otherwise Ollama.
    pub fn llm_flavor(&self) -> LlmFlavor {
        if self.llm_api_key.is_some() {
            LlmFlavor::ChatCompletions
        } else {
            LlmFlavor::Ollama
        }
    }

    /// Narrative endpoint, with the hosted default substituted when an
    /// API key is set but the URL was left at the Ollama default.
    pub fn effective_llm_url(&self) -> &str {
        match self.llm_flavor() {
            LlmFlavor::ChatCompletions if self.llm_url == DEFAULT_LLM_URL => DEFAULT_CHAT_URL,
            _ => &self.llm_url,
        }
    }

    pub fn effective_llm_model(&self) -> &str {
        match self.llm_flavor() {
            LlmFlavor::ChatCompletions if self.llm_model == DEFAULT_LLM_MODEL => {
                DEFAULT_CHAT_MODEL
            }
            _ => &self.llm_model,
        }
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Ignoring malformed config value");
            default
        }),
    }
}
