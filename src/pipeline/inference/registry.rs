//! Model Registry: loads the vision models once at startup and decides
//! which inference strategy the engine will run.
//!
//! Loading never fails as a whole. Each model is attempted independently;
//! a missing or broken artifact only marks that model unusable.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{
    GradientBackend, ImageClassifier, InferenceConfig, ModelInputSpec, RegionDetector,
};
use crate::models::UNKNOWN_LABEL;

/// Classifier artifact (whole image or crop).
pub const CLASSIFIER_FILE: &str = "classifier.onnx";
/// Region detector artifact (two-stage mode).
pub const DETECTOR_FILE: &str = "detector.onnx";
/// Companion graph exposing attention-layer activations and gradients.
pub const ATTENTION_FILE: &str = "classifier.gradcam.onnx";
/// Bundled training-data directory whose sub-directories name the classes.
pub const TRAIN_DIR: &str = "train";
/// One detector label per line, in class-id order.
pub const DETECTOR_LABELS_FILE: &str = "detector.labels";

/// Fallback class list when no training directory is bundled.
pub const DEFAULT_CLASS_NAMES: [&str; 4] = ["COVID-19", "Normal", "Pneumonia", "Tuberculosis"];
/// Fallback detector label (single-class lesion detector).
pub const DEFAULT_DETECTOR_LABEL: &str = "Lesion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classifier,
    Detector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ModelStatus {
    Loaded,
    Missing,
    LoadFailed(String),
}

/// What the registry knows about one model. Immutable after load.
#[derive(Debug, Clone, Serialize)]
pub struct ModelHandle {
    pub kind: ModelKind,
    pub architecture: String,
    pub input: ModelInputSpec,
    pub class_names: Vec<String>,
    pub status: ModelStatus,
}

impl ModelHandle {
    fn missing(kind: ModelKind, input: ModelInputSpec) -> Self {
        Self {
            kind,
            architecture: String::new(),
            input,
            class_names: Vec::new(),
            status: ModelStatus::Missing,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ModelStatus::Loaded
    }
}

/// Selected once at load time from the models that are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InferenceStrategy {
    /// Whole-image classification; `attention` says whether Grad-CAM can
    /// localize the result.
    Classifier { attention: bool },
    /// Detector proposes boxes, classifier labels each crop.
    DetectorClassifier,
}

/// Readiness snapshot for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub classifier: ModelHandle,
    pub detector: ModelHandle,
    pub attention: bool,
    pub strategy: Option<InferenceStrategy>,
}

pub struct ModelRegistry {
    config: InferenceConfig,
    classifier_handle: ModelHandle,
    classifier: Option<Box<dyn ImageClassifier>>,
    detector_handle: ModelHandle,
    detector: Option<Box<dyn RegionDetector>>,
    attention: Option<Box<dyn GradientBackend>>,
    strategy: Option<InferenceStrategy>,
}

impl ModelRegistry {
    /// Load every model found under `models_dir`.
    pub fn load(models_dir: &Path, config: &InferenceConfig) -> Self {
        let mut builder = ModelRegistryBuilder::new(config.clone());

        let class_names = resolve_class_names(&models_dir.join(TRAIN_DIR));
        match load_classifier(models_dir, config) {
            Ok(Some(model)) => {
                builder = builder.with_classifier(CLASSIFIER_FILE, model, class_names);
            }
            Ok(None) => tracing::info!(dir = %models_dir.display(), "No classifier artifact"),
            Err(reason) => {
                tracing::warn!(%reason, "Classifier failed to load");
                builder = builder.classifier_failed(reason);
            }
        }

        match load_detector(models_dir, config) {
            Ok(Some(model)) => {
                let labels = resolve_detector_labels(&models_dir.join(DETECTOR_LABELS_FILE));
                builder = builder.with_detector(DETECTOR_FILE, model, labels);
            }
            Ok(None) => tracing::debug!("No detector artifact, two-stage mode disabled"),
            Err(reason) => {
                tracing::warn!(%reason, "Detector failed to load");
                builder = builder.detector_failed(reason);
            }
        }

        match load_attention(models_dir, config) {
            Ok(Some(backend)) => builder = builder.with_attention(backend),
            Ok(None) => tracing::debug!("No Grad-CAM companion graph, localization limited"),
            Err(reason) => tracing::warn!(%reason, "Grad-CAM graph failed to load"),
        }

        builder.build()
    }

    pub fn builder(config: InferenceConfig) -> ModelRegistryBuilder {
        ModelRegistryBuilder::new(config)
    }

    /// A registry with nothing loaded.
    pub fn empty(config: InferenceConfig) -> Self {
        ModelRegistryBuilder::new(config).build()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn strategy(&self) -> Option<InferenceStrategy> {
        self.strategy
    }

    pub fn is_ready(&self, kind: ModelKind) -> bool {
        self.handle(kind).is_ready()
    }

    pub fn handle(&self, kind: ModelKind) -> &ModelHandle {
        match kind {
            ModelKind::Classifier => &self.classifier_handle,
            ModelKind::Detector => &self.detector_handle,
        }
    }

    pub fn classifier(&self) -> Option<&dyn ImageClassifier> {
        self.classifier.as_deref()
    }

    pub fn detector(&self) -> Option<&dyn RegionDetector> {
        self.detector.as_deref()
    }

    pub fn attention(&self) -> Option<&dyn GradientBackend> {
        self.attention.as_deref()
    }

    /// Classifier label for an output index; out-of-range is `"Unknown"`.
    pub fn class_label(&self, index: usize) -> &str {
        label_at(&self.classifier_handle.class_names, index)
    }

    /// Detector label for a class id; out-of-range is `"Unknown"`.
    pub fn detector_label(&self, class_id: u32) -> &str {
        label_at(&self.detector_handle.class_names, class_id as usize)
    }

    pub fn status(&self) -> RegistryStatus {
        RegistryStatus {
            classifier: self.classifier_handle.clone(),
            detector: self.detector_handle.clone(),
            attention: self.attention.is_some(),
            strategy: self.strategy,
        }
    }
}

fn label_at(names: &[String], index: usize) -> &str {
    names.get(index).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
}

/// Assembles a registry from already-constructed backends. `load` goes
/// through here; tests use it directly with stub models.
pub struct ModelRegistryBuilder {
    config: InferenceConfig,
    classifier_handle: ModelHandle,
    classifier: Option<Box<dyn ImageClassifier>>,
    detector_handle: ModelHandle,
    detector: Option<Box<dyn RegionDetector>>,
    attention: Option<Box<dyn GradientBackend>>,
}

impl ModelRegistryBuilder {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            classifier_handle: ModelHandle::missing(ModelKind::Classifier, config.classifier_input),
            detector_handle: ModelHandle::missing(ModelKind::Detector, config.detector_input),
            config,
            classifier: None,
            detector: None,
            attention: None,
        }
    }

    pub fn with_classifier(
        mut self,
        architecture: &str,
        model: Box<dyn ImageClassifier>,
        class_names: Vec<String>,
    ) -> Self {
        if let Some(outputs) = model.num_classes() {
            if outputs != class_names.len() {
                tracing::warn!(
                    outputs,
                    classes = class_names.len(),
                    "Classifier output size differs from class list; unmatched indices map to Unknown"
                );
            }
        }
        self.classifier_handle = ModelHandle {
            kind: ModelKind::Classifier,
            architecture: architecture.to_string(),
            input: self.config.classifier_input,
            class_names,
            status: ModelStatus::Loaded,
        };
        self.classifier = Some(model);
        self
    }

    pub fn classifier_failed(mut self, reason: String) -> Self {
        self.classifier_handle.status = ModelStatus::LoadFailed(reason);
        self.classifier = None;
        self
    }

    pub fn with_detector(
        mut self,
        architecture: &str,
        model: Box<dyn RegionDetector>,
        labels: Vec<String>,
    ) -> Self {
        self.detector_handle = ModelHandle {
            kind: ModelKind::Detector,
            architecture: architecture.to_string(),
            input: self.config.detector_input,
            class_names: labels,
            status: ModelStatus::Loaded,
        };
        self.detector = Some(model);
        self
    }

    pub fn detector_failed(mut self, reason: String) -> Self {
        self.detector_handle.status = ModelStatus::LoadFailed(reason);
        self.detector = None;
        self
    }

    pub fn with_attention(mut self, backend: Box<dyn GradientBackend>) -> Self {
        self.attention = Some(backend);
        self
    }

    pub fn build(self) -> ModelRegistry {
        let strategy = select_strategy(
            self.classifier.is_some(),
            self.detector.is_some(),
            self.attention.is_some(),
        );
        match strategy {
            Some(s) => tracing::info!(strategy = ?s, "Inference strategy selected"),
            None => tracing::warn!("No classifier available, image analysis disabled"),
        }
        ModelRegistry {
            config: self.config,
            classifier_handle: self.classifier_handle,
            classifier: self.classifier,
            detector_handle: self.detector_handle,
            detector: self.detector,
            attention: self.attention,
            strategy,
        }
    }
}

/// A detector alone cannot name a condition, so every strategy needs the
/// classifier.
pub fn select_strategy(
    classifier: bool,
    detector: bool,
    attention: bool,
) -> Option<InferenceStrategy> {
    match (classifier, detector) {
        (true, true) => Some(InferenceStrategy::DetectorClassifier),
        (true, false) => Some(InferenceStrategy::Classifier { attention }),
        (false, _) => None,
    }
}

/// Sorted sub-directory names of `train_dir`, or the default list when the
/// directory is absent or has no sub-directories.
pub fn resolve_class_names(train_dir: &Path) -> Vec<String> {
    let from_dir = std::fs::read_dir(train_dir).ok().map(|entries| {
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    });

    match from_dir {
        Some(names) if !names.is_empty() => {
            tracing::debug!(classes = names.len(), dir = %train_dir.display(), "Class names from training directory");
            names
        }
        _ => DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Non-empty trimmed lines of the labels file, or the single default label.
pub fn resolve_detector_labels(path: &Path) -> Vec<String> {
    let labels: Vec<String> = std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if labels.is_empty() {
        vec![DEFAULT_DETECTOR_LABEL.to_string()]
    } else {
        labels
    }
}

fn artifact(models_dir: &Path, file: &str) -> Option<PathBuf> {
    let path = models_dir.join(file);
    path.is_file().then_some(path)
}

// ═══════════════════════════════════════════════════════════
// Backend construction
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
fn load_classifier(
    models_dir: &Path,
    config: &InferenceConfig,
) -> Result<Option<Box<dyn ImageClassifier>>, String> {
    let Some(path) = artifact(models_dir, CLASSIFIER_FILE) else {
        return Ok(None);
    };
    super::onnx::OnnxClassifier::load(&path, config.classifier_input)
        .map(|m| Some(Box::new(m) as Box<dyn ImageClassifier>))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "onnx")]
fn load_detector(
    models_dir: &Path,
    config: &InferenceConfig,
) -> Result<Option<Box<dyn RegionDetector>>, String> {
    let Some(path) = artifact(models_dir, DETECTOR_FILE) else {
        return Ok(None);
    };
    super::onnx::OnnxDetector::load(&path, config.detector_input)
        .map(|m| Some(Box::new(m) as Box<dyn RegionDetector>))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "onnx")]
fn load_attention(
    models_dir: &Path,
    config: &InferenceConfig,
) -> Result<Option<Box<dyn GradientBackend>>, String> {
    let Some(path) = artifact(models_dir, ATTENTION_FILE) else {
        return Ok(None);
    };
    super::onnx::OnnxAttentionBackend::load(
        &path,
        &config.attention_layer,
        config.classifier_input.layout,
    )
    .map(|m| Some(Box::new(m) as Box<dyn GradientBackend>))
    .map_err(|e| e.to_string())
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(
    models_dir: &Path,
    _config: &InferenceConfig,
) -> Result<Option<Box<dyn ImageClassifier>>, String> {
    unsupported(models_dir, CLASSIFIER_FILE)
}

#[cfg(not(feature = "onnx"))]
fn load_detector(
    models_dir: &Path,
    _config: &InferenceConfig,
) -> Result<Option<Box<dyn RegionDetector>>, String> {
    unsupported(models_dir, DETECTOR_FILE)
}

#[cfg(not(feature = "onnx"))]
fn load_attention(
    models_dir: &Path,
    _config: &InferenceConfig,
) -> Result<Option<Box<dyn GradientBackend>>, String> {
    unsupported(models_dir, ATTENTION_FILE)
}

#[cfg(not(feature = "onnx"))]
fn unsupported<T>(models_dir: &Path, file: &str) -> Result<Option<T>, String> {
    match artifact(models_dir, file) {
        Some(path) => Err(format!(
            "{} present but this build has no ONNX runtime (enable feature `onnx`)",
            path.display()
        )),
        None => Ok(None),
    }
}
