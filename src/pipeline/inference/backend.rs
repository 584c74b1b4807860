use image::RgbImage;
use ndarray::{Array3, Array4};

use super::InferenceError;
use crate::models::PixelBox;

/// Whole-image (or crop) classifier.
pub trait ImageClassifier: Send + Sync {
    /// Raw per-class scores for a batch-of-one tensor already shaped and
    /// normalized per the model's input spec. Probabilities or logits.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    /// Number of classes the model emits, when known from its metadata.
    fn num_classes(&self) -> Option<usize>;
}

/// A candidate region from a detector, in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: PixelBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// Object detector proposing lesion regions.
pub trait RegionDetector: Send + Sync {
    /// Candidates with confidence `>= min_confidence`, boxes mapped back to
    /// the dimensions of `image`.
    fn detect(&self, image: &RgbImage, min_confidence: f32)
        -> Result<Vec<RawDetection>, InferenceError>;
}

/// Activations of the attention layer and the gradient of one class score
/// with respect to them, both `(channels, height, width)`.
#[derive(Debug, Clone)]
pub struct FeatureGradients {
    pub activations: Array3<f32>,
    pub gradients: Array3<f32>,
}

/// Source of Grad-CAM inputs for the classifier.
pub trait GradientBackend: Send + Sync {
    fn activations_and_gradients(
        &self,
        input: &Array4<f32>,
        class_index: usize,
    ) -> Result<FeatureGradients, InferenceError>;
}

// ── Mock for testing ──────────────────────────────────────

/// Returns fixed scores regardless of input. `None` simulates a runtime
/// failure.
pub struct MockClassifier {
    scores: Option<Vec<f32>>,
}

impl MockClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores: Some(scores) }
    }

    pub fn failing() -> Self {
        Self { scores: None }
    }
}

impl ImageClassifier for MockClassifier {
    fn predict(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.scores
            .clone()
            .ok_or_else(|| InferenceError::Runtime("mock classifier failure".into()))
    }

    fn num_classes(&self) -> Option<usize> {
        self.scores.as_ref().map(Vec::len)
    }
}

/// Returns a fixed candidate list, honoring the confidence floor.
pub struct MockDetector {
    detections: Vec<RawDetection>,
}

impl MockDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl RegionDetector for MockDetector {
    fn detect(
        &self,
        _image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= min_confidence)
            .cloned()
            .collect())
    }
}

/// Returns fixed feature maps. `None` simulates an attention failure.
pub struct MockGradientBackend {
    maps: Option<FeatureGradients>,
}

impl MockGradientBackend {
    pub fn new(activations: Array3<f32>, gradients: Array3<f32>) -> Self {
        Self {
            maps: Some(FeatureGradients {
                activations,
                gradients,
            }),
        }
    }

    /// A single-channel map whose only hot cell is `(row, col)` on a
    /// `size` x `size` grid.
    pub fn hotspot(size: usize, row: usize, col: usize) -> Self {
        let mut activations = Array3::<f32>::zeros((1, size, size));
        activations[[0, row, col]] = 1.0;
        let gradients = Array3::<f32>::ones((1, size, size));
        Self::new(activations, gradients)
    }

    pub fn failing() -> Self {
        Self { maps: None }
    }
}

impl GradientBackend for MockGradientBackend {
    fn activations_and_gradients(
        &self,
        _input: &Array4<f32>,
        _class_index: usize,
    ) -> Result<FeatureGradients, InferenceError> {
        self.maps
            .clone()
            .ok_or_else(|| InferenceError::Attention("mock gradient failure".into()))
    }
}
