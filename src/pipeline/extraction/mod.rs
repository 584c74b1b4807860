//! Document Extractor: report text and the radiograph raster from an
//! uploaded PDF, plus decoding of direct image uploads.
//!
//! Every public entry point fails soft. Parse or decode failures are
//! logged and surface as `None` so that one unreadable source never
//! aborts an analysis the other source could still complete.

pub mod types;
pub mod pdf;
pub mod raster;

pub use types::*;
pub use pdf::*;
pub use raster::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Unsupported embedded image encoding: {0}")]
    UnsupportedEncoding(String),
}
