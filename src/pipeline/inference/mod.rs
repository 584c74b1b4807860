//! Vision inference: model registry, preprocessing, Grad-CAM attention and
//! the engine that dispatches on the strategy chosen at load time.

pub mod backend;
pub mod engine;
pub mod gradcam;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod registry;

pub use backend::*;
pub use engine::*;
pub use gradcam::*;
pub use preprocess::*;
pub use registry::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("No usable model loaded: {0}")]
    ModelUnavailable(String),

    #[error("Model load failed for {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Inference runtime error: {0}")]
    Runtime(String),

    #[error("Unexpected tensor shape: {0}")]
    Shape(String),

    #[error("Attention map unavailable: {0}")]
    Attention(String),
}

/// Tunables for both inference strategies.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub classifier_input: ModelInputSpec,
    pub detector_input: ModelInputSpec,
    /// Detector pre-filter: candidates below this never leave the detector.
    pub detection_threshold: f32,
    /// Candidates below this are discarded before crop classification.
    pub acceptance_threshold: f32,
    /// Layer whose activations/gradients feed Grad-CAM.
    pub attention_layer: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            classifier_input: ModelInputSpec::classifier_default(),
            detector_input: ModelInputSpec::detector_default(),
            detection_threshold: 0.1,
            acceptance_threshold: 0.25,
            attention_layer: "conv5_block16_2_conv".to_string(),
        }
    }
}
