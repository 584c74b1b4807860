//! Raster decoding for direct uploads and PDF-embedded image streams.

use std::io::{Cursor, Read};

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::debug;

use super::ExtractionError;

/// Maximum input image size (in bytes) before rejecting.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Largest pixel count accepted for a PDF image XObject.
pub const MAX_EMBEDDED_PIXELS: u64 = 100_000_000;

/// `width * height` of a declared image, or `None` when a dimension is not
/// positive, the product overflows, or it exceeds [`MAX_EMBEDDED_PIXELS`].
pub fn checked_pixel_count(width: i64, height: i64) -> Option<u64> {
    if width <= 0 || height <= 0 {
        return None;
    }
    (width as u64)
        .checked_mul(height as u64)
        .filter(|&pixels| pixels <= MAX_EMBEDDED_PIXELS)
}

/// Decode an uploaded image file (PNG, JPEG, TIFF, BMP) into pixels,
/// applying EXIF orientation so phone photos of films come out upright.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    validate_image_bytes(bytes)?;
    let image = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageProcessing(format!("Decode failed: {e}")))?;
    let orientation = read_exif_orientation(bytes);
    if orientation != 1 {
        debug!(orientation, "Applying EXIF orientation");
    }
    Ok(apply_orientation(image, orientation))
}

/// Validate image bytes before decoding.
/// Rejects clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Stream metadata needed to rebuild a PDF image XObject.
#[derive(Debug, Clone, Copy)]
pub struct RawStreamInfo<'a> {
    pub width: u32,
    pub height: u32,
    pub color_space: Option<&'a str>,
    pub bits_per_component: Option<i64>,
    pub filters: &'a [String],
}

/// Decode a PDF image XObject stream.
///
/// `DCTDecode` (JPEG) streams are complete image files. Unfiltered or
/// `FlateDecode` streams are raw 8-bit samples; the channel count comes
/// from the color space, or from the sample count when the color space is
/// not a plain device space (ICC-based, calibrated).
pub fn decode_pdf_stream(
    content: &[u8],
    info: RawStreamInfo<'_>,
) -> Result<DynamicImage, ExtractionError> {
    match info.filters {
        [f] if f == "DCTDecode" => image::load_from_memory(content)
            .map_err(|e| ExtractionError::ImageProcessing(format!("JPEG stream: {e}"))),
        [] => rebuild_raw(content.to_vec(), info),
        [f] if f == "FlateDecode" => {
            let mut inflated = Vec::new();
            flate2::read::ZlibDecoder::new(content)
                .read_to_end(&mut inflated)
                .map_err(|e| ExtractionError::ImageProcessing(format!("Inflate failed: {e}")))?;
            rebuild_raw(inflated, info)
        }
        other => Err(ExtractionError::UnsupportedEncoding(other.join("+"))),
    }
}

fn rebuild_raw(samples: Vec<u8>, info: RawStreamInfo<'_>) -> Result<DynamicImage, ExtractionError> {
    if info.bits_per_component.unwrap_or(8) != 8 {
        return Err(ExtractionError::UnsupportedEncoding(format!(
            "{} bits per component",
            info.bits_per_component.unwrap_or_default()
        )));
    }

    let pixels = checked_pixel_count(i64::from(info.width), i64::from(info.height))
        .ok_or_else(|| {
            ExtractionError::ImageProcessing(format!(
                "Unsupported image dimensions {}x{}",
                info.width, info.height
            ))
        })? as usize;
    let channels = match info.color_space {
        Some("DeviceGray") | Some("CalGray") => 1,
        Some("DeviceRGB") | Some("CalRGB") => 3,
        _ if samples.len() == pixels => 1,
        _ if samples.len() == pixels * 3 => 3,
        other => {
            return Err(ExtractionError::UnsupportedEncoding(format!(
                "color space {}",
                other.unwrap_or("unknown")
            )))
        }
    };

    let expected = pixels * channels;
    if samples.len() < expected {
        return Err(ExtractionError::ImageProcessing(format!(
            "Stream holds {} samples, expected {expected}",
            samples.len()
        )));
    }
    let mut samples = samples;
    samples.truncate(expected);

    let image = if channels == 1 {
        GrayImage::from_raw(info.width, info.height, samples).map(DynamicImage::ImageLuma8)
    } else {
        RgbImage::from_raw(info.width, info.height, samples).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| ExtractionError::ImageProcessing("Raw buffer size mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageOutputFormat, Luma};
    use std::io::Write;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, _| Luma([(x * 10) as u8]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn info<'a>(w: u32, h: u32, cs: Option<&'a str>, filters: &'a [String]) -> RawStreamInfo<'a> {
        RawStreamInfo {
            width: w,
            height: h,
            color_space: cs,
            bits_per_component: Some(8),
            filters,
        }
    }

    #[test]
    fn decode_png_upload() {
        let img = decode_image(&png_bytes(20, 10)).unwrap();
        assert_eq!(img.dimensions(), (20, 10));
    }

    #[test]
    fn garbage_bytes_fail_decode() {
        assert!(decode_image(&[0u8; 200]).is_err());
    }

    #[test]
    fn tiny_input_rejected_before_decode() {
        let err = decode_image(&[0x89, 0x50]).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageProcessing(_)));
    }

    #[test]
    fn no_exif_means_upright() {
        assert_eq!(read_exif_orientation(&png_bytes(4, 4)), 1);
    }

    #[test]
    fn orientation_six_rotates_dimensions() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(30, 10));
        assert_eq!(apply_orientation(img, 6).dimensions(), (10, 30));
    }

    #[test]
    fn raw_gray_stream_rebuilds() {
        let img = decode_pdf_stream(&[128u8; 12], info(4, 3, Some("DeviceGray"), &[])).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
    }

    #[test]
    fn flate_rgb_stream_rebuilds() {
        let raw = vec![200u8; 2 * 2 * 3];
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&raw).unwrap();
        let compressed = enc.finish().unwrap();

        let filters = vec!["FlateDecode".to_string()];
        let img = decode_pdf_stream(&compressed, info(2, 2, Some("DeviceRGB"), &filters)).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.to_rgb8().get_pixel(1, 1).0, [200, 200, 200]);
    }

    #[test]
    fn channel_count_inferred_without_device_space() {
        let img = decode_pdf_stream(&[7u8; 27], info(3, 3, Some("ICCBased"), &[])).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(2, 2).0, [7, 7, 7]);
    }

    #[test]
    fn short_stream_is_an_error() {
        assert!(decode_pdf_stream(&[1u8; 5], info(4, 4, Some("DeviceGray"), &[])).is_err());
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let err = decode_pdf_stream(&[0u8; 16], info(u32::MAX, u32::MAX, None, &[])).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageProcessing(_)));
        assert!(decode_pdf_stream(&[0u8; 16], info(0, 4, Some("DeviceGray"), &[])).is_err());
    }

    #[test]
    fn pixel_count_guards() {
        assert_eq!(checked_pixel_count(40, 30), Some(1200));
        assert_eq!(checked_pixel_count(0, 30), None);
        assert_eq!(checked_pixel_count(-5, 30), None);
        assert_eq!(checked_pixel_count(i64::MAX, 2), None);
        assert_eq!(checked_pixel_count(4_294_967_295, 4_294_967_295), None);
        assert_eq!(checked_pixel_count(10_000, 10_000), Some(MAX_EMBEDDED_PIXELS));
        assert_eq!(checked_pixel_count(10_001, 10_000), None);
    }

    #[test]
    fn unknown_filter_is_unsupported() {
        let filters = vec!["CCITTFaxDecode".to_string()];
        let err = decode_pdf_stream(&[0u8; 16], info(4, 4, None, &filters)).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedEncoding(_)));
    }
}
