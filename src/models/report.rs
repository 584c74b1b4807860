use serde::{Deserialize, Serialize};

use super::enums::OverallStatus;

/// Condition label of the "no abnormality" class.
pub const NORMAL_CONDITION: &str = "Normal";

/// Location placeholder for findings without a meaningful anatomical site.
pub const NOT_APPLICABLE: &str = "N/A";

/// Location used when the attention map could not be computed.
pub const CHEST_AREA: &str = "Chest Area";

/// Label for a class index outside the registry's class list.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PixelBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Integer crop rectangle `(x, y, w, h)` clipped to an image of
    /// `width` x `height`. `None` when the clipped area is empty.
    pub fn crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp_x = |v: f32| v.max(0.0).min(width as f32).floor() as u32;
        let clamp_y = |v: f32| v.max(0.0).min(height as f32).floor() as u32;

        let (x1, x2) = (clamp_x(self.x1), clamp_x(self.x2));
        let (y1, y2) = (clamp_y(self.y1), clamp_y(self.y2));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// One region proposed by the detector. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub bbox: PixelBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub class_id: u32,
    pub label: String,
}

/// One abnormality, or the single "Normal" placeholder.
///
/// `confidence` is a percentage in [0, 100], already rounded.
/// The detector/classifier fields are only populated in two-stage mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finding_id: Option<u32>,
    pub condition: String,
    pub confidence: f32,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bounding_box: Option<PixelBox>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detector_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detector_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub classifier_prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub classifier_confidence: Option<f32>,
}

impl Finding {
    pub fn is_normal(&self) -> bool {
        self.condition == NORMAL_CONDITION
    }
}

/// Normalized findings record for one analyzed image. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub overall_status: OverallStatus,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_filename: Option<String>,
    /// Why the analysis is incomplete (only for `Pending`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
}

impl DiagnosticReport {
    /// True when the analysis completed (i.e. not `Pending`).
    pub fn is_complete(&self) -> bool {
        self.overall_status != OverallStatus::Pending
    }

    pub fn is_abnormal(&self) -> bool {
        self.overall_status == OverallStatus::Abnormal
    }
}

/// Round a [0, 1] probability to a percentage with `decimals` places.
pub fn to_percent(probability: f32, decimals: u32) -> f32 {
    let factor = 10f32.powi(decimals as i32);
    let pct = probability.clamp(0.0, 1.0) * 100.0;
    (pct * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_requested_places() {
        assert_eq!(to_percent(0.87, 1), 87.0);
        assert_eq!(to_percent(0.123456, 2), 12.35);
        assert_eq!(to_percent(0.98765, 1), 98.8);
    }

    #[test]
    fn percent_clamps_out_of_range_probabilities() {
        assert_eq!(to_percent(1.7, 1), 100.0);
        assert_eq!(to_percent(-0.2, 1), 0.0);
    }

    #[test]
    fn crop_rect_clips_to_image() {
        let b = PixelBox::new(-10.0, 20.0, 50.0, 500.0);
        assert_eq!(b.crop_rect(40, 100), Some((0, 20, 40, 80)));
    }

    #[test]
    fn crop_rect_empty_for_degenerate_box() {
        assert_eq!(PixelBox::new(10.0, 10.0, 10.0, 40.0).crop_rect(100, 100), None);
        assert_eq!(PixelBox::new(30.0, 10.0, 20.0, 40.0).crop_rect(100, 100), None);
        // Entirely outside the image
        assert_eq!(PixelBox::new(200.0, 200.0, 300.0, 300.0).crop_rect(100, 100), None);
    }

    #[test]
    fn center_is_midpoint() {
        assert_eq!(PixelBox::new(90.0, 90.0, 310.0, 310.0).center(), (200.0, 200.0));
    }

    #[test]
    fn finding_omits_absent_fields_in_json() {
        let finding = Finding {
            finding_id: None,
            condition: NORMAL_CONDITION.into(),
            confidence: 91.2,
            location: NOT_APPLICABLE.into(),
            bounding_box: None,
            note: None,
            detector_label: None,
            detector_confidence: None,
            classifier_prediction: None,
            classifier_confidence: None,
        };
        let json = serde_json::to_string(&finding).unwrap();
        assert!(!json.contains("bounding_box"));
        assert!(!json.contains("classifier_prediction"));
        assert!(json.contains("\"location\":\"N/A\""));
    }
}
