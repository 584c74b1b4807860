//! Localization Resolver: pixel coordinates → coarse anatomical descriptor.
//!
//! Radiographs are read facing the patient, so the image-left half is the
//! patient's right lung.

use std::fmt;

use crate::models::PixelBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LungSide {
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LungZone {
    Upper,
    Middle,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnatomicalLocation {
    pub side: LungSide,
    pub zone: LungZone,
}

impl fmt::Display for LungSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LungSide::Right => "Right Lung",
            LungSide::Left => "Left Lung",
        })
    }
}

impl fmt::Display for LungZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LungZone::Upper => "Upper Zone",
            LungZone::Middle => "Middle Zone",
            LungZone::Lower => "Lower Zone",
        })
    }
}

impl fmt::Display for AnatomicalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.side, self.zone)
    }
}

/// Resolve a point in an image of `width` x `height`.
///
/// `x < W/2` is the right lung, the exact midpoint belongs to the left.
/// Vertical thirds: `y < H/3` upper, `y < 2H/3` middle, else lower.
pub fn resolve(x: f32, y: f32, width: u32, height: u32) -> AnatomicalLocation {
    let (w, h) = (width as f32, height as f32);
    let side = if x < w / 2.0 {
        LungSide::Right
    } else {
        LungSide::Left
    };
    let zone = if y < h / 3.0 {
        LungZone::Upper
    } else if y < 2.0 * h / 3.0 {
        LungZone::Middle
    } else {
        LungZone::Lower
    };
    AnatomicalLocation { side, zone }
}

/// Resolve a detection box by its center.
pub fn resolve_box(bbox: &PixelBox, width: u32, height: u32) -> AnatomicalLocation {
    let (cx, cy) = bbox.center();
    resolve(cx, cy, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_side_and_zone() {
        assert_eq!(resolve(10.0, 10.0, 300, 300).to_string(), "Right Lung (Upper Zone)");
        assert_eq!(resolve(290.0, 150.0, 300, 300).to_string(), "Left Lung (Middle Zone)");
        assert_eq!(resolve(10.0, 299.0, 300, 300).to_string(), "Right Lung (Lower Zone)");
    }

    #[test]
    fn horizontal_midpoint_is_left() {
        assert_eq!(resolve(150.0, 0.0, 300, 300).side, LungSide::Left);
        assert_eq!(resolve(149.9, 0.0, 300, 300).side, LungSide::Right);
        // Odd width: midpoint is 50.5
        assert_eq!(resolve(50.0, 0.0, 101, 90).side, LungSide::Right);
        assert_eq!(resolve(51.0, 0.0, 101, 90).side, LungSide::Left);
    }

    #[test]
    fn third_boundaries_go_down() {
        assert_eq!(resolve(0.0, 99.9, 300, 300).zone, LungZone::Upper);
        assert_eq!(resolve(0.0, 100.0, 300, 300).zone, LungZone::Middle);
        assert_eq!(resolve(0.0, 199.9, 300, 300).zone, LungZone::Middle);
        assert_eq!(resolve(0.0, 200.0, 300, 300).zone, LungZone::Lower);
    }

    #[test]
    fn box_resolves_by_center() {
        let bbox = PixelBox::new(90.0, 90.0, 310.0, 310.0);
        assert_eq!(resolve_box(&bbox, 512, 512).to_string(), "Right Lung (Middle Zone)");
        let right_edge = PixelBox::new(400.0, 420.0, 500.0, 500.0);
        assert_eq!(resolve_box(&right_edge, 512, 512).to_string(), "Left Lung (Lower Zone)");
    }
}
