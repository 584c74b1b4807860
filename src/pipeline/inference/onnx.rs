//! ONNX Runtime backends for the engine traits.
//!
//! Sessions sit behind a `Mutex` because `Session::run` takes `&mut self`
//! while the traits are shared `&self` across requests.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::{Array1, Array3, Array4, Axis};
use ort::session::Session;
use ort::value::TensorRef;

use super::{
    image_to_tensor, FeatureGradients, GradientBackend, ImageClassifier, InferenceError,
    ModelInputSpec, RawDetection, RegionDetector, TensorLayout,
};
use crate::models::PixelBox;

/// Values per detector row: `x1, y1, x2, y2, score, class`.
const DETECTION_ROW: usize = 6;

fn open_session(path: &Path) -> Result<Session, InferenceError> {
    let model = path.display().to_string();
    Session::builder()
        .map_err(|e: ort::Error| InferenceError::ModelLoad {
            model: model.clone(),
            reason: e.to_string(),
        })?
        .with_intra_threads(2)
        .map_err(|e: ort::Error| InferenceError::ModelLoad {
            model: model.clone(),
            reason: e.to_string(),
        })?
        .commit_from_file(path)
        .map_err(|e: ort::Error| InferenceError::ModelLoad {
            model,
            reason: format!("ONNX load failed: {e}"),
        })
}

fn lock(session: &Mutex<Session>) -> Result<std::sync::MutexGuard<'_, Session>, InferenceError> {
    session
        .lock()
        .map_err(|_| InferenceError::Runtime("Session lock poisoned".to_string()))
}

fn blank_input(spec: &ModelInputSpec) -> Array4<f32> {
    let s = spec.size as usize;
    match spec.layout {
        TensorLayout::Nchw => Array4::zeros((1, 3, s, s)),
        TensorLayout::Nhwc => Array4::zeros((1, s, s, 3)),
    }
}

// ═══════════════════════════════════════════════════════════
// Classifier
// ═══════════════════════════════════════════════════════════

pub struct OnnxClassifier {
    session: Mutex<Session>,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Load the graph and probe it once with a blank input to learn its
    /// output size.
    pub fn load(path: &Path, input: ModelInputSpec) -> Result<Self, InferenceError> {
        let session = Mutex::new(open_session(path)?);
        let num_classes = run_scores(&session, &blank_input(&input))?.len();
        if num_classes == 0 {
            return Err(InferenceError::Shape("classifier emits no scores".into()));
        }
        tracing::info!(model = %path.display(), classes = num_classes, "ONNX classifier loaded");
        Ok(Self {
            session,
            num_classes,
        })
    }
}

fn run_scores(session: &Mutex<Session>, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
    let tensor =
        TensorRef::from_array_view(input).map_err(|e| InferenceError::Preprocess(e.to_string()))?;
    let mut session = lock(session)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .map_err(|e| InferenceError::Runtime(format!("ONNX inference failed: {e}")))?;
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::Shape(format!("Output extraction: {e}")))?;

    // [1, classes] or [classes]
    if shape.len() > 2 || (shape.len() == 2 && shape[0] != 1) {
        return Err(InferenceError::Shape(format!(
            "classifier output {shape:?}, expected [1, classes]"
        )));
    }
    Ok(data.to_vec())
}

impl ImageClassifier for OnnxClassifier {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        run_scores(&self.session, input)
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }
}

// ═══════════════════════════════════════════════════════════
// Detector
// ═══════════════════════════════════════════════════════════

/// NMS-free detector export emitting `[1, N, 6]` rows in input pixels.
pub struct OnnxDetector {
    session: Mutex<Session>,
    input: ModelInputSpec,
}

impl OnnxDetector {
    pub fn load(path: &Path, input: ModelInputSpec) -> Result<Self, InferenceError> {
        let session = open_session(path)?;
        tracing::info!(model = %path.display(), input = input.size, "ONNX detector loaded");
        Ok(Self {
            session: Mutex::new(session),
            input,
        })
    }
}

impl RegionDetector for OnnxDetector {
    fn detect(
        &self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let input = image_to_tensor(image, &self.input);
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;

        let mut session = lock(&self.session)?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| InferenceError::Runtime(format!("ONNX inference failed: {e}")))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Shape(format!("Output extraction: {e}")))?;

        if shape.len() != 3 || shape[2] as usize != DETECTION_ROW {
            return Err(InferenceError::Shape(format!(
                "detector output {shape:?}, expected [1, N, {DETECTION_ROW}]"
            )));
        }

        let scale_x = image.width() as f32 / self.input.size as f32;
        let scale_y = image.height() as f32 / self.input.size as f32;
        Ok(parse_detection_rows(data, scale_x, scale_y, min_confidence))
    }
}

/// Decode `x1, y1, x2, y2, score, class` rows and rescale to source pixels.
/// Row order is preserved.
pub fn parse_detection_rows(
    data: &[f32],
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Vec<RawDetection> {
    data.chunks_exact(DETECTION_ROW)
        .filter(|row| row[4] >= min_confidence)
        .map(|row| RawDetection {
            bbox: PixelBox::new(
                row[0] * scale_x,
                row[1] * scale_y,
                row[2] * scale_x,
                row[3] * scale_y,
            ),
            confidence: row[4],
            class_id: row[5].max(0.0).round() as u32,
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Grad-CAM companion graph
// ═══════════════════════════════════════════════════════════

/// Inputs: image tensor, `int64[1]` class index.
/// Outputs: `[0]` layer activations, `[1]` d(class score)/d(activations),
/// both 4-D in the classifier's layout.
pub struct OnnxAttentionBackend {
    session: Mutex<Session>,
    layout: TensorLayout,
}

impl OnnxAttentionBackend {
    pub fn load(path: &Path, layer: &str, layout: TensorLayout) -> Result<Self, InferenceError> {
        let session = open_session(path)?;
        tracing::info!(model = %path.display(), layer, "Grad-CAM graph loaded");
        Ok(Self {
            session: Mutex::new(session),
            layout,
        })
    }
}

impl GradientBackend for OnnxAttentionBackend {
    fn activations_and_gradients(
        &self,
        input: &Array4<f32>,
        class_index: usize,
    ) -> Result<FeatureGradients, InferenceError> {
        let class = Array1::from_vec(vec![class_index as i64]);
        let image_tensor = TensorRef::from_array_view(input)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;
        let class_tensor = TensorRef::from_array_view(&class)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;

        let mut session = lock(&self.session)?;
        let outputs = session
            .run(ort::inputs![image_tensor, class_tensor])
            .map_err(|e| InferenceError::Attention(format!("gradient pass failed: {e}")))?;

        let mut maps = Vec::with_capacity(2);
        for index in 0..2 {
            let (shape, data) = outputs[index]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Attention(format!("Output extraction: {e}")))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            maps.push(to_chw(&dims, data, self.layout)?);
        }
        let gradients = maps.pop();
        let activations = maps.pop();
        match (activations, gradients) {
            (Some(activations), Some(gradients)) => Ok(FeatureGradients {
                activations,
                gradients,
            }),
            _ => Err(InferenceError::Attention("missing Grad-CAM outputs".into())),
        }
    }
}

/// Reshape a batch-of-one feature map into `(channels, height, width)`.
pub fn to_chw(
    dims: &[usize],
    data: &[f32],
    layout: TensorLayout,
) -> Result<Array3<f32>, InferenceError> {
    let [1, a, b, c] = dims else {
        return Err(InferenceError::Attention(format!(
            "feature map {dims:?}, expected batch-of-one 4-D"
        )));
    };
    let batch = Array4::from_shape_vec((1, *a, *b, *c), data.to_vec())
        .map_err(|e| InferenceError::Attention(e.to_string()))?;
    let single = batch.index_axis_move(Axis(0), 0);
    Ok(match layout {
        TensorLayout::Nchw => single,
        TensorLayout::Nhwc => single.permuted_axes([2, 0, 1]).as_standard_layout().to_owned(),
    })
}
