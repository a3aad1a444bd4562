//! # structext
//!
//! Extract structured text (tables, columns, forms) from images and PDFs by
//! sending each page to a hosted vision model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + extension)
//!  │
//!  ├─ 1. Load    png/jpg/jpeg/bmp/gif decoded by content; pdf rendered per page
//!  ├─ 2. Encode  raster → PNG → base64 → data:image/png;base64,…
//!  ├─ 3. Extract one chat completion per page, temperature 0
//!  └─ 4. Output  image: the answer; pdf: "Page i of N:" blocks
//! ```
//!
//! Pages run one after another with a single request in flight. A failed page
//! is recorded on its [`PageResult`]; [`FailurePolicy`] decides whether the run
//! continues past it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use structext::{extract_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from OPENAI_API_KEY unless set on the builder
//!     let config = ExtractionConfig::default();
//!     let output = extract_file("invoice.pdf", &config).await?;
//!     println!("{}", output.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `structext` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! PDF input needs the pdfium shared library at runtime, either installed
//! system-wide or pointed to by [`ExtractionConfig::pdfium_lib_path`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, FailurePolicy};
pub use error::{ExtractError, PageError};
pub use extract::{
    dump_file_pages, dump_pages, encode_file, encode_only, extract_bytes, extract_file,
    extract_sync, extract_to_file,
};
pub use output::{DocumentKind, ExtractionOutput, ExtractionStats, PageResult, TokenUsage};
pub use pipeline::encode::{decode_data_uri, EncodedPage};
pub use pipeline::llm::{ExtractionProvider, ExtractionRequest, ExtractionResult, OpenAiProvider};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
