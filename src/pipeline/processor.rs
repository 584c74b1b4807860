//! Analysis orchestrator.
//!
//! Drives one request through the pipeline, strictly in order:
//! extract → infer → localize → assemble → narrate → persist.
//!
//! Every collaborator sits behind a trait (DocumentExtractor, model
//! backends, NarrativeClient, SummaryStore) so the whole chain runs in
//! tests with mock implementations.

use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;
use uuid::Uuid;

use crate::db::SummaryStore;
use crate::models::{DiagnosticReport, TargetLanguage};
use crate::pipeline::extraction::{decode_image, DocumentExtractor};
use crate::pipeline::findings::{assemble, pending};
use crate::pipeline::inference::{InferenceEngine, InferenceError, ModelRegistry};
use crate::pipeline::narrative::{request_narrative, NarrativeClient, NarrativeRequest};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Neither report text nor a completed image analysis came out of the
    /// request.
    #[error("No findings could be extracted from the submitted documents")]
    NoFindingsExtracted,
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub pdf: Option<Vec<u8>>,
    /// Direct radiograph upload. Takes priority over a PDF-embedded image.
    pub image: Option<Vec<u8>>,
    pub language: TargetLanguage,
    /// Persist the narrative for this owner when present.
    pub owner_id: Option<String>,
    pub source_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    /// `None` when no image was supplied or found.
    pub report: Option<DiagnosticReport>,
    pub extracted_text_chars: usize,
    pub narrative: Option<String>,
    /// Narrative service failure; the report is still returned.
    pub narrative_error: Option<String>,
    /// Id of the persisted narrative, when it was saved.
    pub summary_id: Option<Uuid>,
}

/// Where the analyzed image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageSource {
    Upload,
    PdfEmbedded { page: u32 },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct DocumentAnalyzer {
    extractor: Box<dyn DocumentExtractor>,
    registry: Arc<ModelRegistry>,
    narrator: Arc<dyn NarrativeClient>,
    store: Arc<dyn SummaryStore>,
}

impl DocumentAnalyzer {
    pub fn new(
        extractor: Box<dyn DocumentExtractor>,
        registry: Arc<ModelRegistry>,
        narrator: Arc<dyn NarrativeClient>,
        store: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            extractor,
            registry,
            narrator,
            store,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run the full chain for one request. Only a request with no usable
    /// data at all fails; model, narrative and storage problems degrade
    /// the outcome instead.
    pub fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, ProcessingError> {
        // Step 1: report text
        let text = request
            .pdf
            .as_deref()
            .and_then(|pdf| self.extractor.extract_text(pdf))
            .filter(|t| !t.trim().is_empty());

        // Step 2: image → report
        let report = self.select_image(&request).map(|(image, source)| {
            self.analyze_image(&image, source, request.source_filename.clone())
        });

        let has_report = report.as_ref().is_some_and(DiagnosticReport::is_complete);
        if text.is_none() && !has_report {
            tracing::warn!(
                pdf = request.pdf.is_some(),
                image = request.image.is_some(),
                "Nothing usable in request"
            );
            return Err(ProcessingError::NoFindingsExtracted);
        }

        // Step 3: narrative (a Pending report carries no analysis)
        let narrated_report = report.as_ref().filter(|r| r.is_complete());
        let narrative = NarrativeRequest::new(narrated_report, text.as_deref(), request.language)
            .and_then(|req| request_narrative(self.narrator.as_ref(), req));

        let (narrative, narrative_error) = match narrative {
            Ok(n) => (Some(n), None),
            Err(e) => (None, Some(e.to_string())),
        };

        // Step 4: persist (best-effort)
        let summary_id = match (&narrative, request.owner_id.as_deref()) {
            (Some(n), Some(owner)) => {
                self.persist(owner, request.language, n, request.source_filename.as_deref())
            }
            _ => None,
        };

        tracing::info!(
            status = ?report.as_ref().map(|r| r.overall_status),
            text_chars = text.as_ref().map_or(0, String::len),
            narrated = narrative.is_some(),
            saved = summary_id.is_some(),
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            report,
            extracted_text_chars: text.as_ref().map_or(0, |t| t.chars().count()),
            narrative,
            narrative_error,
            summary_id,
        })
    }

    /// Direct upload first; the PDF's largest embedded raster otherwise.
    fn select_image(&self, request: &AnalysisRequest) -> Option<(DynamicImage, ImageSource)> {
        if let Some(bytes) = request.image.as_deref() {
            match decode_image(bytes) {
                Ok(image) => return Some((image, ImageSource::Upload)),
                Err(e) => tracing::warn!(error = %e, "Uploaded image unreadable, trying PDF images"),
            }
        }

        let pdf = request.pdf.as_deref()?;
        self.extractor.extract_largest_image(pdf).map(|embedded| {
            (
                embedded.image,
                ImageSource::PdfEmbedded {
                    page: embedded.page_number,
                },
            )
        })
    }

    fn analyze_image(
        &self,
        image: &DynamicImage,
        source: ImageSource,
        source_filename: Option<String>,
    ) -> DiagnosticReport {
        tracing::debug!(?source, "Analyzing image");
        match InferenceEngine::new(&self.registry).analyze(image) {
            Ok(output) => assemble(&output, source_filename),
            Err(InferenceError::ModelUnavailable(reason)) => {
                tracing::warn!(%reason, "Image supplied but no vision model is ready");
                pending(
                    "Image analysis unavailable: no vision model is loaded.",
                    source_filename,
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "Image analysis failed");
                pending(format!("Image analysis failed: {e}"), source_filename)
            }
        }
    }

    fn persist(
        &self,
        owner_id: &str,
        language: TargetLanguage,
        narrative: &str,
        source_filename: Option<&str>,
    ) -> Option<Uuid> {
        match self.store.save(owner_id, language, narrative, source_filename) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist summary, returning it unsaved");
                None
            }
        }
    }
}
