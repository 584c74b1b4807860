use image::DynamicImage;

/// The largest raster found in a PDF, already decoded.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// 1-based page the image was found on.
    pub page_number: u32,
    /// Declared pixel dimensions from the image dictionary.
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

/// Document Extractor abstraction (allows mocking for tests).
///
/// Both operations fail soft: `None` means "no data from this source".
pub trait DocumentExtractor: Send + Sync {
    /// Concatenated per-page text, or `None` when the PDF cannot be parsed
    /// or carries no text layer.
    fn extract_text(&self, pdf_bytes: &[u8]) -> Option<String>;

    /// The embedded raster with the largest `width * height`.
    ///
    /// Heuristic: on a page scan the biggest image is assumed to be the
    /// radiograph. A logo or letterhead larger than the film would be
    /// picked instead; nothing here validates the choice.
    fn extract_largest_image(&self, pdf_bytes: &[u8]) -> Option<EmbeddedImage>;
}
