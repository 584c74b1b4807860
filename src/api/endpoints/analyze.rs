//! Analysis endpoint: report PDF and/or radiograph in, findings and
//! narrative out.
//!
//! `POST /analyze` takes multipart fields `pdf`, `image` and `language`.
//! Uploads are streamed into temp files that the analysis reads from; the
//! files are removed when the request finishes, whatever the outcome.

use std::str::FromStr;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::owner::owner_from_headers;
use crate::api::types::ApiContext;
use crate::models::{DiagnosticReport, TargetLanguage};
use crate::pipeline::processor::{AnalysisOutcome, AnalysisRequest};
use crate::pipeline::staging::StagedUpload;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// The narrative; `None` when the narrative service failed.
    pub summary: Option<String>,
    pub report: Option<DiagnosticReport>,
    pub language: TargetLanguage,
    pub extracted_text_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_id: Option<Uuid>,
}

impl AnalyzeResponse {
    fn new(outcome: AnalysisOutcome, language: TargetLanguage) -> Self {
        Self {
            summary: outcome.narrative,
            report: outcome.report,
            language,
            extracted_text_chars: outcome.extracted_text_chars,
            narrative_error: outcome.narrative_error,
            summary_id: outcome.summary_id,
        }
    }
}

/// Uploads parsed out of the multipart body.
#[derive(Default)]
struct AnalyzeForm {
    pdf: Option<StagedUpload>,
    image: Option<StagedUpload>,
    language: TargetLanguage,
}

/// `POST /analyze`
pub async fn analyze(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let owner_id = owner_from_headers(&headers);
    let form = read_form(multipart).await?;

    if form.pdf.is_none() && form.image.is_none() {
        return Err(ApiError::BadRequest(
            "Upload a report PDF (`pdf`) or a radiograph (`image`)".into(),
        ));
    }

    let language = form.language;
    tracing::info!(
        pdf_bytes = form.pdf.as_ref().map(StagedUpload::size),
        image_bytes = form.image.as_ref().map(StagedUpload::size),
        %language,
        persist = owner_id.is_some(),
        "Analysis requested"
    );

    // Inference and the narrative client both block
    let outcome = tokio::task::spawn_blocking(move || -> Result<AnalysisOutcome, ApiError> {
        let request = build_request(&form, owner_id)?;
        let outcome = ctx.core.analyzer().analyze(request)?;
        // staged files are removed here
        drop(form);
        Ok(outcome)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Analysis task failed: {e}")))??;

    let has_report = outcome.report.as_ref().is_some_and(DiagnosticReport::is_complete);
    if outcome.narrative.is_none() && !has_report {
        return Err(ApiError::Upstream(
            outcome
                .narrative_error
                .unwrap_or_else(|| "no narrative produced".into()),
        ));
    }

    Ok(Json(AnalyzeResponse::new(outcome, language)))
}

async fn read_form(mut multipart: Multipart) -> Result<AnalyzeForm, ApiError> {
    let mut form = AnalyzeForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "language" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Unreadable language: {e}")))?;
                if !raw.trim().is_empty() {
                    form.language = TargetLanguage::from_str(&raw).map_err(|_| {
                        ApiError::BadRequest(format!("Unsupported language: {}", raw.trim()))
                    })?;
                }
            }
            "pdf" | "image" => {
                let suffix = if name == "pdf" { ".pdf" } else { ".img" };
                let mut staged = StagedUpload::create(field.file_name(), suffix)
                    .map_err(|e| ApiError::Internal(format!("Staging upload failed: {e}")))?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read `{name}`: {e}")))?
                {
                    staged
                        .append(&chunk)
                        .map_err(|e| ApiError::Internal(format!("Staging upload failed: {e}")))?;
                }
                if staged.is_empty() {
                    continue;
                }
                tracing::debug!(
                    field = %name,
                    path = %staged.path().display(),
                    size = staged.size(),
                    "Upload staged"
                );
                if name == "pdf" {
                    form.pdf = Some(staged);
                } else {
                    form.image = Some(staged);
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(form)
}

/// Load the staged uploads; runs on the blocking pool.
fn build_request(form: &AnalyzeForm, owner_id: Option<String>) -> Result<AnalysisRequest, ApiError> {
    let read = |staged: &StagedUpload| {
        staged
            .read()
            .map_err(|e| ApiError::Internal(format!("Reading staged upload failed: {e}")))
    };

    let source_filename = form
        .image
        .as_ref()
        .and_then(StagedUpload::original_name)
        .or_else(|| form.pdf.as_ref().and_then(StagedUpload::original_name))
        .map(str::to_string);

    Ok(AnalysisRequest {
        pdf: form.pdf.as_ref().map(read).transpose()?,
        image: form.image.as_ref().map(read).transpose()?,
        language: form.language,
        owner_id,
        source_filename,
    })
}
