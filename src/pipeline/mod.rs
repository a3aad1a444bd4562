//! Pipeline stages for structured-text extraction.
//!
//! Each submodule implements one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! load ──▶ render ──▶ encode ──▶ llm
//! (bytes)  (pdfium)   (base64)   (model)
//! ```
//!
//! 1. [`load`]    classify by extension, decode images by content
//! 2. [`render`]  rasterise every PDF page at the configured DPI; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]  PNG-encode and base64-wrap each raster as a data URI
//! 4. [`llm`]     one chat completion request per page; the only stage with
//!    network I/O

pub mod encode;
pub mod llm;
pub mod load;
pub mod render;
