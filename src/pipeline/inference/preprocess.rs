//! Image → tensor conversion shared by every model.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use serde::Serialize;

/// ImageNet channel statistics (torchvision / timm exports).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Memory layout the model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, 3, H, W]` (PyTorch exports)
    Nchw,
    /// `[1, H, W, 3]` (Keras exports)
    Nhwc,
}

/// Pixel scaling applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `v / 255`
    UnitRange,
    /// `(v / 255 - mean) / std` per channel
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

/// What one model needs as input. Square inputs only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelInputSpec {
    pub size: u32,
    pub layout: TensorLayout,
    pub normalization: Normalization,
}

impl ModelInputSpec {
    /// DenseNet-121 chest classifier: 224x224x3, [0, 1] scaling, NHWC.
    pub fn classifier_default() -> Self {
        Self {
            size: 224,
            layout: TensorLayout::Nhwc,
            normalization: Normalization::UnitRange,
        }
    }

    /// YOLO-family detector: 640x640, [0, 1] scaling, NCHW.
    pub fn detector_default() -> Self {
        Self {
            size: 640,
            layout: TensorLayout::Nchw,
            normalization: Normalization::UnitRange,
        }
    }

    pub fn imagenet(size: u32, layout: TensorLayout) -> Self {
        Self {
            size,
            layout,
            normalization: Normalization::MeanStd {
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
        }
    }
}

/// Color-space conversion to 8-bit RGB (grayscale films are replicated
/// across the three channels).
pub fn to_rgb(image: &DynamicImage) -> RgbImage {
    image.to_rgb8()
}

/// Resize to the model's square input (bilinear) and normalize into a
/// batch-of-one tensor in the model's layout.
pub fn image_to_tensor(rgb: &RgbImage, spec: &ModelInputSpec) -> Array4<f32> {
    let size = spec.size.max(1);
    let resized = if rgb.width() == size && rgb.height() == size {
        rgb.clone()
    } else {
        image::imageops::resize(rgb, size, size, FilterType::Triangle)
    };

    let s = size as usize;
    let mut tensor = match spec.layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, s, s)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, s, s, 3)),
    };

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let v = normalize(pixel.0[c], c, &spec.normalization);
            match spec.layout {
                TensorLayout::Nchw => tensor[[0, c, y, x]] = v,
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = v,
            }
        }
    }
    tensor
}

fn normalize(value: u8, channel: usize, normalization: &Normalization) -> f32 {
    let v = value as f32 / 255.0;
    match normalization {
        Normalization::UnitRange => v,
        Normalization::MeanStd { mean, std } => (v - mean[channel]) / std[channel],
    }
}

/// Interpret raw model output as class probabilities.
///
/// Outputs that already form a distribution (softmax head) pass through;
/// anything else is treated as logits.
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let sum: f32 = scores.iter().sum();
    let in_unit = scores.iter().all(|s| (0.0..=1.0).contains(s));
    if in_unit && (sum - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }
    softmax(scores)
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Index and value of the largest probability. Ties go to the lowest index.
pub fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if v <= bv => best,
            _ if v.is_nan() => best,
            _ => Some((i, v)),
        })
}
