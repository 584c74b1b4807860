//! Inference Engine: runs the strategy the registry selected against one
//! decoded image. Holds no state of its own; everything request-scoped
//! lives on the stack of `analyze`.

use image::{DynamicImage, RgbImage};

use super::{
    arg_max, image_to_tensor, locate, to_probabilities, to_rgb, InferenceError,
    InferenceStrategy, ModelRegistry,
};
use crate::models::{DetectionBox, NORMAL_CONDITION};

/// Where the classifier looked, for whole-image classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Attention {
    /// Grad-CAM hotspot in source-image pixels.
    Hotspot { x: u32, y: u32 },
    /// Attention could not be computed; location degrades to a fixed label.
    Unavailable,
    /// Normal prediction, nothing to localize.
    NotRequested,
}

/// Top class of one classifier pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub label: String,
    /// Probability in `[0, 1]`.
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub prediction: ClassPrediction,
    pub attention: Attention,
}

/// One accepted detector box and what the classifier said about its crop.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOutcome {
    pub detection: DetectionBox,
    /// `Err` carries the reason the crop could not be classified.
    pub classification: Result<ClassPrediction, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageAnalysis {
    Classification(ClassificationOutcome),
    /// Accepted regions in detector order; empty means nothing found.
    Detections(Vec<RegionOutcome>),
}

/// Source image plus what the engine concluded about it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub width: u32,
    pub height: u32,
    pub analysis: ImageAnalysis,
}

pub struct InferenceEngine<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<EngineOutput, InferenceError> {
        let strategy = self.registry.strategy().ok_or_else(|| {
            InferenceError::ModelUnavailable("no classifier is loaded".to_string())
        })?;

        let rgb = to_rgb(image);
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::Preprocess("image has zero size".into()));
        }

        let analysis = match strategy {
            InferenceStrategy::Classifier { .. } => {
                ImageAnalysis::Classification(self.classify_whole(&rgb)?)
            }
            InferenceStrategy::DetectorClassifier => {
                ImageAnalysis::Detections(self.detect_and_classify(&rgb)?)
            }
        };
        Ok(EngineOutput {
            width,
            height,
            analysis,
        })
    }

    fn classify_whole(&self, rgb: &RgbImage) -> Result<ClassificationOutcome, InferenceError> {
        let classifier = self
            .registry
            .classifier()
            .ok_or_else(|| InferenceError::ModelUnavailable("classifier".into()))?;
        let input = image_to_tensor(rgb, &self.registry.config().classifier_input);
        let prediction = self.top_class(&classifier.predict(&input)?)?;

        tracing::debug!(
            class = %prediction.label,
            probability = prediction.probability,
            "Whole-image classification"
        );

        let attention = if prediction.label == NORMAL_CONDITION {
            Attention::NotRequested
        } else {
            self.attend(&input, prediction.class_index, rgb.width(), rgb.height())
        };

        Ok(ClassificationOutcome {
            prediction,
            attention,
        })
    }

    /// Grad-CAM for the predicted class. Any failure degrades to
    /// `Unavailable` instead of failing the request.
    fn attend(
        &self,
        input: &ndarray::Array4<f32>,
        class_index: usize,
        width: u32,
        height: u32,
    ) -> Attention {
        let Some(backend) = self.registry.attention() else {
            tracing::debug!("No attention backend, using generic location");
            return Attention::Unavailable;
        };
        let result = backend
            .activations_and_gradients(input, class_index)
            .and_then(|maps| locate(&maps, width, height));
        match result {
            Ok((x, y)) => Attention::Hotspot { x, y },
            Err(e) => {
                tracing::warn!(error = %e, "Grad-CAM failed, falling back to generic location");
                Attention::Unavailable
            }
        }
    }

    fn detect_and_classify(&self, rgb: &RgbImage) -> Result<Vec<RegionOutcome>, InferenceError> {
        let config = self.registry.config();
        let (detector, classifier) = match (self.registry.detector(), self.registry.classifier()) {
            (Some(d), Some(c)) => (d, c),
            _ => return Err(InferenceError::ModelUnavailable("detector/classifier pair".into())),
        };

        let candidates = detector.detect(rgb, config.detection_threshold)?;
        let total = candidates.len();
        let accepted: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.confidence >= config.acceptance_threshold)
            .collect();
        tracing::debug!(candidates = total, accepted = accepted.len(), "Detector pass");

        let mut regions = Vec::with_capacity(accepted.len());
        for raw in accepted {
            let Some((x, y, w, h)) = raw.bbox.crop_rect(rgb.width(), rgb.height()) else {
                tracing::debug!(bbox = ?raw.bbox, "Skipping zero-area crop");
                continue;
            };

            let crop = image::imageops::crop_imm(rgb, x, y, w, h).to_image();
            let input = image_to_tensor(&crop, &config.classifier_input);
            let classification = classifier
                .predict(&input)
                .and_then(|scores| self.top_class(&scores))
                .map_err(|e| {
                    tracing::warn!(error = %e, "Crop classification failed");
                    e.to_string()
                });

            regions.push(RegionOutcome {
                detection: DetectionBox {
                    bbox: raw.bbox,
                    confidence: raw.confidence,
                    class_id: raw.class_id,
                    label: self.registry.detector_label(raw.class_id).to_string(),
                },
                classification,
            });
        }
        Ok(regions)
    }

    fn top_class(&self, scores: &[f32]) -> Result<ClassPrediction, InferenceError> {
        let probabilities = to_probabilities(scores);
        let (class_index, probability) = arg_max(&probabilities)
            .ok_or_else(|| InferenceError::Shape("classifier returned no scores".into()))?;
        Ok(ClassPrediction {
            class_index,
            label: self.registry.class_label(class_index).to_string(),
            probability,
        })
    }
}
