//! Error types for the structext library.
//!
//! Two error types reflect two failure modes:
//!
//! * [`ExtractError`] is **fatal**: the run cannot proceed (unreadable file,
//!   unsupported extension, corrupt bytes, missing credential). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] is **non-fatal**: one page could not be extracted (network
//!   failure, provider error, unexpected response shape). Stored inside
//!   [`crate::output::PageResult`] so the remaining pages still run.
//!
//! Whether a page failure ends the run is decided by
//! [`crate::config::FailurePolicy`], never implicitly.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the structext library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The extension is outside the accepted set.
    #[error("Unsupported file type '{extension}'. Accepted: png, jpg, jpeg, bmp, gif, pdf")]
    UnsupportedFormat { extension: String },

    /// The bytes are not a valid image or PDF.
    #[error("Could not decode input: {detail}")]
    Decode { detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Rendering PDF pages requires the pdfium shared library.\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or containing directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// No provider was injected and no API key is available.
    #[error("Extraction provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A page failed and the failure policy is `Abort`.
    #[error("Extraction stopped at page {page} of {total}: {source}")]
    PageFailed {
        page: usize,
        total: usize,
        #[source]
        source: PageError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The raster could not be PNG-encoded.
    #[error("Page {page}: PNG encoding failed: {detail}")]
    Encode { page: usize, detail: String },

    /// The request never produced an HTTP response.
    #[error("Transport error: {detail}")]
    Transport { detail: String },

    /// The provider answered with a non-success status.
    #[error("Provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// The response did not have the expected completion shape.
    #[error("Malformed provider response: {detail}")]
    MalformedResponse { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_lists_accepted_types() {
        let e = ExtractError::UnsupportedFormat {
            extension: "tiff".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("tiff"), "got: {msg}");
        assert!(msg.contains("pdf"), "got: {msg}");
    }

    #[test]
    fn page_failed_display_includes_position_and_cause() {
        let e = ExtractError::PageFailed {
            page: 2,
            total: 3,
            source: PageError::Provider {
                status: 500,
                body: "overloaded".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("page 2 of 3"), "got: {msg}");
        assert!(msg.contains("overloaded"), "got: {msg}");
    }

    #[test]
    fn provider_error_display() {
        let e = PageError::Provider {
            status: 401,
            body: "invalid key".into(),
        };
        assert!(e.to_string().contains("401"));
        assert!(e.to_string().contains("invalid key"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Transport {
            detail: "connection refused".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Transport"));
    }
}
