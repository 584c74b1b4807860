//! Comparison of stored summaries.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerContext};
use crate::models::ComparisonResult;
use crate::pipeline::comparison::compare_reports;

/// Either `{"ids": [...]}` or the history panel's
/// `{"summaries": [{"id": ...}, ...]}`. Both lists are merged.
#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    #[serde(default)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub summaries: Vec<SummaryRef>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryRef {
    pub id: Uuid,
}

impl CompareRequest {
    fn into_ids(self) -> Vec<Uuid> {
        let mut ids = self.ids;
        ids.extend(self.summaries.into_iter().map(|s| s.id));
        ids
    }
}

/// `POST /compare`: trend verdict across two or more of the caller's
/// summaries.
pub async fn compare(
    State(ctx): State<ApiContext>,
    Extension(owner): Extension<OwnerContext>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<ComparisonResult>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let ids = payload.into_ids();

    // The narrative client blocks on HTTP
    let result = tokio::task::spawn_blocking(move || {
        compare_reports(
            ctx.core.store(),
            ctx.core.narrator(),
            &ids,
            &owner.owner_id,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Comparison task failed: {e}")))??;

    tracing::info!(
        verdict = ?result.verdict,
        reports = result.compared_ids.len(),
        "Comparison complete"
    );
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_both_request_shapes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let body = format!(r#"{{"ids":["{a}"],"summaries":[{{"id":"{b}","fullText":"x"}}]}}"#);
        let request: CompareRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(request.into_ids(), vec![a, b]);
    }

    #[test]
    fn empty_body_object_has_no_ids() {
        let request: CompareRequest = serde_json::from_str("{}").unwrap();
        assert!(request.into_ids().is_empty());
    }
}
