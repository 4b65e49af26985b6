//! PDF merge and compression primitives for the pdfpress service.
//!
//! This crate holds everything below the HTTP surface:
//! - `merge`: page concatenation via lopdf
//! - `preset`: quality/level to compression-parameter resolution
//! - `compress`: the multi-attempt external-tool pipeline
//! - `tool`: the Ghostscript runner behind an injectable trait
//! - `workspace`: the shared scratch directory and its reaper

pub mod compress;
pub mod error;
pub mod merge;
pub mod preset;
pub mod tool;
pub mod workspace;

pub use compress::{compress_file, CompressOptions, CompressionOutcome};
pub use error::PdfPressError;
pub use merge::{is_pdf_filename, merge_documents, NamedDocument};
pub use preset::{resolve_level, resolve_quality, CompressionPreset, DeviceTier};
pub use tool::{Ghostscript, ToolOutput, ToolRunner};
pub use workspace::Workspace;

/// Parse PDF bytes and return the page count.
pub fn page_count(bytes: &[u8]) -> Result<u32, PdfPressError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| PdfPressError::InvalidInput(format!("Failed to parse PDF: {}", e)))?;
    Ok(doc.get_pages().len() as u32)
}
