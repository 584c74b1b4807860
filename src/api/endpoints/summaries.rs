//! Summary history endpoint.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerContext};
use crate::models::{StoredSummary, TargetLanguage};

#[derive(Debug, Serialize)]
pub struct SummaryView {
    pub summary_id: Uuid,
    pub language: TargetLanguage,
    pub summary_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredSummary> for SummaryView {
    fn from(s: StoredSummary) -> Self {
        Self {
            summary_id: s.id,
            language: s.language,
            summary_text: s.summary_text,
            source_filename: s.source_filename,
            created_at: s.created_at,
        }
    }
}

/// `GET /summaries`: the caller's saved narratives, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
) -> Result<Json<Vec<SummaryView>>, ApiError> {
    let summaries = ctx.core.store().list(&owner.owner_id)?;
    tracing::debug!(count = summaries.len(), "Listing summaries");
    Ok(Json(summaries.into_iter().map(SummaryView::from).collect()))
}
