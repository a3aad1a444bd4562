//! Result types produced by an extraction run.

use crate::error::PageError;
use crate::pipeline::llm::render_pretty;
use crate::prompts::page_header;
use serde::{Deserialize, Serialize};

/// Token counts reported by the provider for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Whether the input was a single image or a paged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
}

/// Outcome of extracting one page (or the single image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Number of pages in the document.
    pub total_pages: usize,
    /// Extracted text; empty when the page failed.
    pub text: String,
    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
    /// Full provider response, kept for inspection.
    pub raw_response: Option<serde_json::Value>,
    /// Wall-clock time of the model call.
    pub duration_ms: u64,
    /// Set when the page could not be extracted.
    pub error: Option<PageError>,
}

impl PageResult {
    /// A page that produced no text because of `error`.
    pub fn failed(page_num: usize, total_pages: usize, error: PageError) -> Self {
        Self {
            page_num,
            total_pages,
            text: String::new(),
            usage: None,
            raw_response: None,
            duration_ms: 0,
            error: Some(error),
        }
    }

    /// True when the page produced non-empty text.
    pub fn has_text(&self) -> bool {
        self.error.is_none() && !self.text.is_empty()
    }

    /// Full provider response as pretty JSON, when one was received.
    pub fn raw_pretty(&self) -> Option<String> {
        self.raw_response.as_ref().map(render_pretty)
    }

    /// The `"Page i of N:\n<text>\n"` block used in multi-page output.
    pub fn block(&self) -> String {
        format!("{}\n{}\n", page_header(self.page_num, self.total_pages), self.text)
    }
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    /// DPI the pages were rendered at; `None` for an image upload.
    pub render_dpi: Option<u32>,
    pub render_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an extraction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Final text: the raw answer for an image, or the concatenated page
    /// blocks for a PDF.
    pub text: String,
    pub kind: DocumentKind,
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

/// Assemble the final text from page results.
///
/// A single image yields its answer verbatim. A PDF yields one
/// `"Page i of N:\n<text>\n"` block per page with text, joined by `"\n"`.
/// Pages without text leave a gap rather than a placeholder.
pub fn assemble_text(kind: DocumentKind, pages: &[PageResult]) -> String {
    match kind {
        DocumentKind::Image => pages
            .iter()
            .find(|p| p.has_text())
            .map(|p| p.text.clone())
            .unwrap_or_default(),
        DocumentKind::Pdf => pages
            .iter()
            .filter(|p| p.has_text())
            .map(PageResult::block)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, total: usize, text: &str) -> PageResult {
        PageResult {
            page_num: n,
            total_pages: total,
            text: text.to_string(),
            usage: None,
            raw_response: None,
            duration_ms: 0,
            error: None,
        }
    }

    #[test]
    fn pdf_blocks_are_separated_by_blank_line() {
        let pages = vec![page(1, 2, "alpha"), page(2, 2, "beta")];
        assert_eq!(
            assemble_text(DocumentKind::Pdf, &pages),
            "Page 1 of 2:\nalpha\n\nPage 2 of 2:\nbeta\n"
        );
    }

    #[test]
    fn failed_and_empty_pages_are_skipped() {
        let mut failed = page(2, 3, "");
        failed.error = Some(PageError::Transport {
            detail: "reset".into(),
        });
        let pages = vec![page(1, 3, "one"), failed, page(3, 3, "")];
        assert_eq!(assemble_text(DocumentKind::Pdf, &pages), "Page 1 of 3:\none\n");
    }

    #[test]
    fn image_output_has_no_header() {
        let pages = vec![page(1, 1, "| a | b |")];
        assert_eq!(assemble_text(DocumentKind::Image, &pages), "| a | b |");
    }

    #[test]
    fn raw_pretty_is_indented_json() {
        let mut p = page(1, 1, "x");
        assert!(p.raw_pretty().is_none());
        p.raw_response = Some(serde_json::json!({"id": "chatcmpl-7"}));
        assert_eq!(p.raw_pretty().unwrap(), "{\n  \"id\": \"chatcmpl-7\"\n}");
    }

    #[test]
    fn usage_tolerates_missing_fields() {
        let u: TokenUsage = serde_json::from_str(r#"{"prompt_tokens": 12}"#).unwrap();
        assert_eq!(u.prompt_tokens, 12);
        assert_eq!(u.completion_tokens, 0);
    }
}
