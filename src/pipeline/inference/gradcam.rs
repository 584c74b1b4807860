//! Grad-CAM attention: turns the attention layer's activations and class
//! gradients into a single hotspot in source-image pixels.
//!
//! Every step returns a new array; inputs are never modified.

use ndarray::{Array1, Array2, Array3, Axis};

use super::{FeatureGradients, InferenceError};

/// Per-channel weight: the mean gradient over the spatial grid.
pub fn pool_gradients(gradients: &Array3<f32>) -> Array1<f32> {
    let (channels, h, w) = gradients.dim();
    let cells = (h * w).max(1) as f32;
    Array1::from_shape_fn(channels, |c| {
        gradients.index_axis(Axis(0), c).sum() / cells
    })
}

/// Scale each activation channel by its pooled weight.
pub fn weight_activations(activations: &Array3<f32>, weights: &Array1<f32>) -> Array3<f32> {
    Array3::from_shape_fn(activations.dim(), |(c, y, x)| {
        activations[[c, y, x]] * weights[c]
    })
}

/// Class-discriminative heatmap in `[0, 1]`, `(height, width)` of the
/// attention layer.
///
/// A map with no positive signal (or a perfectly flat one) carries no
/// location and is reported as an attention failure.
pub fn heatmap(maps: &FeatureGradients) -> Result<Array2<f32>, InferenceError> {
    if maps.activations.dim() != maps.gradients.dim() {
        return Err(InferenceError::Attention(format!(
            "activation shape {:?} does not match gradient shape {:?}",
            maps.activations.dim(),
            maps.gradients.dim()
        )));
    }
    let (channels, h, w) = maps.activations.dim();
    if channels == 0 || h == 0 || w == 0 {
        return Err(InferenceError::Attention("empty feature map".into()));
    }

    let weights = pool_gradients(&maps.gradients);
    let weighted = weight_activations(&maps.activations, &weights);
    let summed = weighted.sum_axis(Axis(0)).mapv(|v| v.max(0.0));

    let max = summed.iter().copied().fold(f32::MIN, f32::max);
    let min = summed.iter().copied().fold(f32::MAX, f32::min);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Err(InferenceError::Attention("attention map is flat".into()));
    }
    Ok(summed.mapv(|v| (v - min) / range))
}

/// Bilinear resize with half-pixel centers and edge clamping.
pub fn upsample_bilinear(map: &Array2<f32>, out_width: u32, out_height: u32) -> Array2<f32> {
    let (in_h, in_w) = map.dim();
    let (out_w, out_h) = (out_width as usize, out_height as usize);
    if in_h == 0 || in_w == 0 {
        return Array2::zeros((out_h, out_w));
    }
    let scale_x = in_w as f32 / out_w.max(1) as f32;
    let scale_y = in_h as f32 / out_h.max(1) as f32;

    let xs: Vec<(usize, usize, f32)> = (0..out_w).map(|x| sample_axis(x, scale_x, in_w)).collect();
    let ys: Vec<(usize, usize, f32)> = (0..out_h).map(|y| sample_axis(y, scale_y, in_h)).collect();

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let (y0, y1, fy) = ys[y];
        let (x0, x1, fx) = xs[x];
        let top = map[[y0, x0]] * (1.0 - fx) + map[[y0, x1]] * fx;
        let bottom = map[[y1, x0]] * (1.0 - fx) + map[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

fn sample_axis(dst: usize, scale: f32, len: usize) -> (usize, usize, f32) {
    let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let lo = (src.floor() as usize).min(len - 1);
    let hi = (lo + 1).min(len - 1);
    (lo, hi, src - lo as f32)
}

/// `(x, y)` of the strongest cell. Ties resolve to the first in row-major
/// order.
pub fn hotspot(map: &Array2<f32>) -> Option<(u32, u32)> {
    let mut best: Option<((usize, usize), f32)> = None;
    for ((y, x), &v) in map.indexed_iter() {
        match best {
            Some((_, bv)) if v <= bv => {}
            _ => best = Some(((y, x), v)),
        }
    }
    best.map(|((y, x), _)| (x as u32, y as u32))
}

/// Full Grad-CAM: heatmap, upsample to the source resolution, hotspot.
pub fn locate(
    maps: &FeatureGradients,
    width: u32,
    height: u32,
) -> Result<(u32, u32), InferenceError> {
    let map = heatmap(maps)?;
    let full = upsample_bilinear(&map, width, height);
    hotspot(&full).ok_or_else(|| InferenceError::Attention("empty source image".into()))
}
