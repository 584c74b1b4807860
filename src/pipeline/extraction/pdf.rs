use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, info, warn};

use super::raster::{checked_pixel_count, decode_pdf_stream, RawStreamInfo};
use super::types::{DocumentExtractor, EmbeddedImage};
use super::ExtractionError;

/// PDF extractor: text layer via `pdf-extract`, embedded rasters via `lopdf`.
pub struct PdfDocumentExtractor;

impl PdfDocumentExtractor {
    /// Per-page text, in page order.
    pub fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        // pdf-extract panics on some malformed content streams instead of
        // returning an error.
        catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }))
        .map_err(|_| ExtractionError::PdfParsing("text extractor panicked".into()))?
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
    }

    /// Scan every page's image XObjects and decode the one with the largest
    /// declared area. Iteration is page order, then the resource dictionary's
    /// order, and only a strictly larger area replaces the current pick, so
    /// ties go to the first image seen. Entries whose declared size is not
    /// positive, overflows or is implausibly large are skipped.
    pub fn largest_image(&self, pdf_bytes: &[u8]) -> Result<Option<EmbeddedImage>, ExtractionError> {
        let doc = lopdf::Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let mut best: Option<(u32, u64, _)> = None;
        let mut seen = 0usize;

        for (page_number, page_id) in doc.get_pages() {
            let images = match doc.get_page_images(page_id) {
                Ok(images) => images,
                Err(e) => {
                    debug!(page = page_number, error = %e, "No readable image resources on page");
                    continue;
                }
            };

            for img in images {
                seen += 1;
                let Some(area) = checked_pixel_count(img.width, img.height) else {
                    debug!(
                        page = page_number,
                        width = img.width,
                        height = img.height,
                        "Skipping image with unusable declared size"
                    );
                    continue;
                };
                if best.as_ref().map_or(true, |(_, a, _)| area > *a) {
                    best = Some((page_number, area, img));
                }
            }
        }

        let Some((page_number, _, img)) = best else {
            debug!("PDF contains no embedded images");
            return Ok(None);
        };

        let width = u32::try_from(img.width)
            .map_err(|_| ExtractionError::ImageProcessing(format!("Bad width {}", img.width)))?;
        let height = u32::try_from(img.height)
            .map_err(|_| ExtractionError::ImageProcessing(format!("Bad height {}", img.height)))?;
        let filters = img.filters.clone().unwrap_or_default();

        let image = decode_pdf_stream(
            img.content,
            RawStreamInfo {
                width,
                height,
                color_space: img.color_space.as_deref(),
                bits_per_component: img.bits_per_component,
                filters: &filters,
            },
        )?;

        info!(
            page = page_number,
            width,
            height,
            candidates = seen,
            "Selected largest embedded image"
        );

        Ok(Some(EmbeddedImage {
            page_number,
            width,
            height,
            image,
        }))
    }
}

impl DocumentExtractor for PdfDocumentExtractor {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Option<String> {
        match self.page_texts(pdf_bytes) {
            Ok(pages) => {
                let text = pages.concat();
                if text.trim().is_empty() {
                    debug!(pages = pages.len(), "PDF has no text layer");
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!(error = %e, "PDF text extraction failed, continuing without report text");
                None
            }
        }
    }

    fn extract_largest_image(&self, pdf_bytes: &[u8]) -> Option<EmbeddedImage> {
        match self.largest_image(pdf_bytes) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "PDF image extraction failed, continuing without embedded image");
                None
            }
        }
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Canned extractor results, independent of the input bytes.
pub struct MockDocumentExtractor {
    pub text: Option<String>,
    pub image: Option<EmbeddedImage>,
}

impl DocumentExtractor for MockDocumentExtractor {
    fn extract_text(&self, _pdf_bytes: &[u8]) -> Option<String> {
        self.text.clone()
    }

    fn extract_largest_image(&self, _pdf_bytes: &[u8]) -> Option<EmbeddedImage> {
        self.image.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::dictionary;
    use lopdf::{Document, Object, ObjectId, Stream};

    /// One page of a generated test PDF.
    pub struct TestPage<'a> {
        pub text: Option<&'a str>,
        /// Gray images as (width, height, fill value).
        pub images: Vec<(u32, u32, u8)>,
    }

    /// Image XObject as declared in the PDF, with its raw gray samples.
    struct RawImage {
        width: i64,
        height: i64,
        samples: Vec<u8>,
    }

    /// Build a PDF with lopdf (the library pdf-extract uses internally).
    pub fn build(pages: &[TestPage<'_>]) -> Vec<u8> {
        let pages: Vec<_> = pages
            .iter()
            .map(|page| {
                let images = page
                    .images
                    .iter()
                    .map(|&(w, h, fill)| RawImage {
                        width: w as i64,
                        height: h as i64,
                        samples: vec![fill; (w * h) as usize],
                    })
                    .collect();
                (page.text, images)
            })
            .collect();
        build_raw(&pages)
    }

    /// One page holding a small image whose dictionary declares
    /// `width` x `height`, followed by a genuine `real` gray image.
    pub fn build_with_declared_size(
        width: i64,
        height: i64,
        real: Option<(u32, u32, u8)>,
    ) -> Vec<u8> {
        let mut images = vec![RawImage { width, height, samples: vec![0u8; 64] }];
        if let Some((w, h, fill)) = real {
            images.push(RawImage {
                width: w as i64,
                height: h as i64,
                samples: vec![fill; (w * h) as usize],
            });
        }
        build_raw(&[(None, images)])
    }

    fn build_raw(pages: &[(Option<&str>, Vec<RawImage>)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for (text, images) in pages {
            let mut content = String::new();
            let mut xobjects = lopdf::Dictionary::new();

            for (i, img) in images.iter().enumerate() {
                let name = format!("Im{}", i + 1);
                let image_id: ObjectId = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => img.width,
                        "Height" => img.height,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    img.samples.clone(),
                ));
                xobjects.set(name.as_bytes().to_vec(), image_id);
                content.push_str(&format!("q 100 0 0 100 0 0 cm /{name} Do Q\n"));
            }

            if let Some(text) = text {
                content.push_str(&format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET\n"));
            }

            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let resources = dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            };
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::test_pdf::{build, build_with_declared_size, TestPage};
    use super::*;

    #[test]
    fn extract_text_from_digital_pdf() {
        let pdf = build(&[TestPage {
            text: Some("Hemoglobin 13.2 g/dL"),
            images: vec![],
        }]);
        let text = PdfDocumentExtractor.extract_text(&pdf).unwrap();
        assert!(text.contains("Hemoglobin"), "got: {text}");
    }

    #[test]
    fn text_from_every_page_is_concatenated() {
        let pdf = build(&[
            TestPage { text: Some("Glucose 110"), images: vec![] },
            TestPage { text: Some("Creatinine 0.9"), images: vec![] },
        ]);
        let text = PdfDocumentExtractor.extract_text(&pdf).unwrap();
        let glucose = text.find("Glucose").unwrap();
        let creatinine = text.find("Creatinine").unwrap();
        assert!(glucose < creatinine);
    }

    #[test]
    fn invalid_pdf_fails_soft() {
        assert!(PdfDocumentExtractor.extract_text(b"not a pdf").is_none());
        assert!(PdfDocumentExtractor.extract_largest_image(b"not a pdf").is_none());
    }

    #[test]
    fn image_only_pdf_has_no_text() {
        let pdf = build(&[TestPage { text: None, images: vec![(16, 16, 90)] }]);
        assert!(PdfDocumentExtractor.extract_text(&pdf).is_none());
    }

    #[test]
    fn no_images_returns_none() {
        let pdf = build(&[TestPage { text: Some("Lab values only"), images: vec![] }]);
        assert!(PdfDocumentExtractor.extract_largest_image(&pdf).is_none());
    }

    #[test]
    fn largest_image_across_pages_wins() {
        let pdf = build(&[
            TestPage { text: None, images: vec![(10, 10, 20)] },
            TestPage { text: None, images: vec![(40, 30, 200), (12, 12, 50)] },
        ]);
        let found = PdfDocumentExtractor.extract_largest_image(&pdf).unwrap();
        assert_eq!(found.page_number, 2);
        assert_eq!((found.width, found.height), (40, 30));
        assert_eq!(found.image.to_luma8().get_pixel(0, 0).0, [200]);
    }

    #[test]
    fn equal_area_tie_goes_to_first_seen() {
        let pdf = build(&[
            TestPage { text: None, images: vec![(8, 6, 11)] },
            TestPage { text: None, images: vec![(6, 8, 22)] },
        ]);
        let found = PdfDocumentExtractor.extract_largest_image(&pdf).unwrap();
        assert_eq!(found.page_number, 1);
        assert_eq!(found.image.to_luma8().get_pixel(0, 0).0, [11]);
    }

    #[test]
    fn huge_declared_dimensions_fail_soft() {
        let pdf = build_with_declared_size(4_294_967_295, 4_294_967_295, None);
        assert!(PdfDocumentExtractor.extract_largest_image(&pdf).is_none());

        let pdf = build_with_declared_size(0, 64, None);
        assert!(PdfDocumentExtractor.extract_largest_image(&pdf).is_none());
    }

    #[test]
    fn huge_declared_image_is_skipped_for_real_one() {
        let pdf = build_with_declared_size(i64::MAX, 2, Some((20, 10, 77)));
        let found = PdfDocumentExtractor.extract_largest_image(&pdf).unwrap();
        assert_eq!((found.width, found.height), (20, 10));
        assert_eq!(found.image.to_luma8().get_pixel(0, 0).0, [77]);
    }

    #[test]
    fn mock_returns_canned_values() {
        let mock = MockDocumentExtractor { text: Some("x".into()), image: None };
        assert_eq!(mock.extract_text(&[]).as_deref(), Some("x"));
        assert!(mock.extract_largest_image(&[]).is_none());
    }
}
