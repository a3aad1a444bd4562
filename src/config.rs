//! Configuration types for structured-text extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The credential is an injected value: it is
//! set by the caller (CLI flag, environment, secret store) and never lives in
//! source.

use crate::error::ExtractError;
use crate::pipeline::llm::ExtractionProvider;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_INSTRUCTION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model identifier sent in every request.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default base URL of the OpenAI-compatible chat completions API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default PDF rendering resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Environment variable consulted for the API key when none is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use structext::{ExtractionConfig, FailurePolicy};
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .model("gpt-4o")
///     .failure_policy(FailurePolicy::Abort)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// Pages are rendered at `dpi / 72` times their size in points. No pixel
    /// cap is applied, so very large pages or long documents are rendered in
    /// full before extraction starts.
    pub dpi: u32,

    /// Model identifier sent in the request body. Default: `gpt-4o-mini`.
    pub model: String,

    /// Instruction text placed before the image in the user turn.
    pub instruction: String,

    /// API key for the HTTP provider. If `None`, `OPENAI_API_KEY` is read
    /// when the provider is resolved.
    pub api_key: Option<String>,

    /// Base URL of the chat completions API (without `/chat/completions`).
    pub base_url: String,

    /// What to do when a page fails. Default: [`FailurePolicy::Continue`].
    pub failure_policy: FailurePolicy,

    /// Pre-constructed provider. Takes precedence over `api_key`/`base_url`.
    pub provider: Option<Arc<dyn ExtractionProvider>>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Path to the pdfium library (file or directory). If `None`,
    /// the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// User password for encrypted PDFs.
    pub pdf_password: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            model: DEFAULT_MODEL.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            failure_policy: FailurePolicy::default(),
            provider: None,
            progress_callback: None,
            pdfium_lib_path: None,
            pdf_password: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("model", &self.model)
            .field("instruction_len", &self.instruction.len())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("failure_policy", &self.failure_policy)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = instruction.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        if c.instruction.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "instruction must not be empty".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExtractError::InvalidConfig(format!(
                "base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

/// What the orchestrator does when one page cannot be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the error on the page, leave it out of the assembled text and
    /// move on to the next page. (default)
    #[default]
    Continue,
    /// Stop at the first failed page and return
    /// [`ExtractError::PageFailed`].
    Abort,
}
