//! Findings Assembler: engine output → `DiagnosticReport`.
//!
//! Every accepted detection or classification appears exactly once.

use crate::models::{
    to_percent, DiagnosticReport, Finding, OverallStatus, CHEST_AREA, NORMAL_CONDITION,
    NOT_APPLICABLE,
};
use crate::pipeline::inference::{
    Attention, ClassificationOutcome, EngineOutput, ImageAnalysis, RegionOutcome,
};
use crate::pipeline::localization::{resolve, resolve_box};

/// Attached to every abnormal whole-image finding.
pub const ATTENTION_NOTE: &str = "AI detected anomaly using Grad-CAM attention.";
/// Attached to every two-stage finding.
pub const DETECTION_NOTE: &str = "Region proposed by the lesion detector and classified from its crop.";
/// Attached when the crop classifier failed and the detector label stands in.
pub const UNCLASSIFIED_NOTE: &str =
    "Region proposed by the lesion detector; the crop could not be classified.";

/// Prefix of the placeholder note when every detected region was classified Normal.
pub const NORMAL_REGIONS_NOTE: &str = "Detected regions classified Normal:";

/// Whole-image results round to one decimal, two-stage results to two.
const CLASSIFIER_DECIMALS: u32 = 1;
const DETECTION_DECIMALS: u32 = 2;

pub fn assemble(output: &EngineOutput, source_filename: Option<String>) -> DiagnosticReport {
    let findings = match &output.analysis {
        ImageAnalysis::Classification(outcome) => {
            vec![classification_finding(outcome, output.width, output.height)]
        }
        ImageAnalysis::Detections(regions) => {
            let findings: Vec<Finding> = regions
                .iter()
                .enumerate()
                .map(|(i, region)| {
                    region_finding(i as u32 + 1, region, output.width, output.height)
                })
                .collect();
            if !findings.is_empty() && findings.iter().all(Finding::is_normal) {
                vec![normal_regions_finding(&findings)]
            } else {
                findings
            }
        }
    };

    DiagnosticReport {
        overall_status: overall_status_for(&findings),
        findings,
        source_filename,
        note: None,
    }
}

/// Report for an image that could not be analyzed.
pub fn pending(reason: impl Into<String>, source_filename: Option<String>) -> DiagnosticReport {
    DiagnosticReport {
        overall_status: OverallStatus::Pending,
        findings: Vec::new(),
        source_filename,
        note: Some(reason.into()),
    }
}

/// `Abnormal` if any finding is not "Normal"; an empty list is `Normal`.
pub fn overall_status_for(findings: &[Finding]) -> OverallStatus {
    if findings.iter().any(|f| !f.is_normal()) {
        OverallStatus::Abnormal
    } else {
        OverallStatus::Normal
    }
}

fn classification_finding(outcome: &ClassificationOutcome, width: u32, height: u32) -> Finding {
    let prediction = &outcome.prediction;
    let confidence = to_percent(prediction.probability, CLASSIFIER_DECIMALS);

    if prediction.label == NORMAL_CONDITION {
        return bare_finding(NORMAL_CONDITION, confidence, NOT_APPLICABLE, None);
    }

    let location = match outcome.attention {
        Attention::Hotspot { x, y } => resolve(x as f32, y as f32, width, height).to_string(),
        Attention::Unavailable | Attention::NotRequested => CHEST_AREA.to_string(),
    };
    bare_finding(&prediction.label, confidence, &location, Some(ATTENTION_NOTE))
}

fn region_finding(id: u32, region: &RegionOutcome, width: u32, height: u32) -> Finding {
    let detection = &region.detection;
    let detector_confidence = to_percent(detection.confidence, DETECTION_DECIMALS);
    let location = resolve_box(&detection.bbox, width, height).to_string();

    let (condition, confidence, classifier, note) = match &region.classification {
        Ok(prediction) => {
            let pct = to_percent(prediction.probability, DETECTION_DECIMALS);
            (
                prediction.label.clone(),
                pct,
                Some((prediction.label.clone(), pct)),
                DETECTION_NOTE,
            )
        }
        Err(_) => (
            detection.label.clone(),
            detector_confidence,
            None,
            UNCLASSIFIED_NOTE,
        ),
    };

    Finding {
        finding_id: Some(id),
        condition,
        confidence,
        location,
        bounding_box: Some(detection.bbox),
        note: Some(note.to_string()),
        detector_label: Some(detection.label.clone()),
        detector_confidence: Some(detector_confidence),
        classifier_prediction: classifier.as_ref().map(|(label, _)| label.clone()),
        classifier_confidence: classifier.map(|(_, pct)| pct),
    }
}

/// Every crop came back Normal: one placeholder, with the regions listed
/// in the note so each detection is still accounted for.
fn normal_regions_finding(findings: &[Finding]) -> Finding {
    let confidence = findings
        .iter()
        .map(|f| f.confidence)
        .fold(0.0_f32, f32::max);
    let regions: Vec<String> = findings
        .iter()
        .map(|f| match (f.finding_id, f.bounding_box) {
            (Some(id), Some(b)) => format!(
                "#{id} {} [{:.0}, {:.0}, {:.0}, {:.0}]",
                f.location, b.x1, b.y1, b.x2, b.y2
            ),
            _ => f.location.clone(),
        })
        .collect();
    let note = format!("{NORMAL_REGIONS_NOTE} {}", regions.join("; "));
    bare_finding(NORMAL_CONDITION, confidence, NOT_APPLICABLE, Some(&note))
}

fn bare_finding(condition: &str, confidence: f32, location: &str, note: Option<&str>) -> Finding {
    Finding {
        finding_id: None,
        condition: condition.to_string(),
        confidence,
        location: location.to_string(),
        bounding_box: None,
        note: note.map(str::to_string),
        detector_label: None,
        detector_confidence: None,
        classifier_prediction: None,
        classifier_confidence: None,
    }
}
