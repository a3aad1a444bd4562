//! Instruction text sent alongside each page image.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::instruction`];
//! the constant here is used only when no override is provided.

/// Default instruction: extract all text, keeping table and layout structure.
pub const DEFAULT_INSTRUCTION: &str = "Extract all the text off the Base64 encoding of the image in a structured way if it is present. Pay attention to any elements (tables for example) that have layouts and extract them as they are.";

/// Header placed before each page's text in multi-page output.
pub fn page_header(page_num: usize, total_pages: usize) -> String {
    format!("Page {} of {}:", page_num, total_pages)
}
