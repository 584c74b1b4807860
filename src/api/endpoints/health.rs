//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::inference::RegistryStatus;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `"ok"` when an inference strategy is available, `"degraded"` when
    /// images can only produce Pending reports.
    pub status: &'static str,
    pub version: &'static str,
    pub models: RegistryStatus,
    pub narrative_model: String,
}

/// `GET /health`: model readiness and the active inference strategy.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let models = ctx.core.registry().status();
    let status = if models.strategy.is_some() { "ok" } else { "degraded" };

    Ok(Json(HealthResponse {
        status,
        version: crate::config::APP_VERSION,
        models,
        narrative_model: ctx.core.narrator().model().to_string(),
    }))
}
