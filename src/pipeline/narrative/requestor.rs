//! Narrative Requestor: report + extracted text → prompt → collaborator.
//!
//! Pass-through contract. The returned narrative is not inspected.

use super::{
    build_system_prompt, build_user_message, NarrativeClient, NarrativeError, NO_TEXT_SENTINEL,
    NO_XRAY_SENTINEL,
};
use crate::models::{DiagnosticReport, TargetLanguage};

/// Everything the collaborator sees, already serialized. Consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    /// Pretty JSON of the report, or the no-X-ray sentinel.
    pub report: String,
    /// Extracted text, or the no-text sentinel.
    pub extracted_text: String,
    pub target_language: TargetLanguage,
}

impl NarrativeRequest {
    pub fn new(
        report: Option<&DiagnosticReport>,
        extracted_text: Option<&str>,
        target_language: TargetLanguage,
    ) -> Result<Self, NarrativeError> {
        let report = match report {
            Some(r) => serde_json::to_string_pretty(r)?,
            None => NO_XRAY_SENTINEL.to_string(),
        };
        let extracted_text = extracted_text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_TEXT_SENTINEL)
            .to_string();
        Ok(Self {
            report,
            extracted_text,
            target_language,
        })
    }
}

/// Send the request and return the completion verbatim.
pub fn request_narrative(
    client: &dyn NarrativeClient,
    request: NarrativeRequest,
) -> Result<String, NarrativeError> {
    let system = build_system_prompt(request.target_language);
    let user = build_user_message(&request.report, &request.extracted_text, request.target_language);

    tracing::debug!(
        model = client.model(),
        language = %request.target_language,
        prompt_chars = system.len() + user.len(),
        "Requesting narrative"
    );

    client.complete(&system, &user).map_err(|e| {
        tracing::warn!(error = %e, "Narrative service failed");
        e
    })
}
