//! Pipeline entry points: load → encode → extract → assemble.
//!
//! Pages are processed strictly in order with one model request in flight at
//! a time. A PDF is rendered completely before the first request is sent.

use crate::config::{ExtractionConfig, FailurePolicy, API_KEY_ENV};
use crate::error::{ExtractError, PageError};
use crate::output::{assemble_text, ExtractionOutput, ExtractionStats, PageResult};
use crate::pipeline::encode::{self, EncodedPage};
use crate::pipeline::llm::{self, ExtractionProvider, OpenAiProvider};
use crate::pipeline::load::{self, SourceDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Extract structured text from an in-memory upload.
///
/// `extension` is the upload's file extension (`"pdf"`, `"png"`, …); it picks
/// the loader, while image bytes are decoded by content.
///
/// # Returns
/// `Ok(ExtractionOutput)` even when pages failed under
/// [`FailurePolicy::Continue`]; check `output.stats.failed_pages`.
///
/// # Errors
/// - unsupported extension, unreadable or corrupt bytes
/// - no provider configured
/// - a page failed under [`FailurePolicy::Abort`]
pub async fn extract_bytes(
    bytes: &[u8],
    extension: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();

    // ── Step 1: Classify ─────────────────────────────────────────────────
    let kind = load::classify(extension)?;

    // ── Step 2: Resolve provider ─────────────────────────────────────────
    let provider = resolve_provider(config)?;

    // ── Step 3: Load (render every PDF page) ─────────────────────────────
    let render_start = Instant::now();
    let document = load::load_document(bytes, kind, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let total_pages = document.page_count();
    info!(
        "Loaded {:?} with {} page(s) in {}ms",
        document.kind(),
        total_pages,
        render_duration_ms
    );

    // ── Step 4: Encode + extract, page by page ───────────────────────────
    let extract_start = Instant::now();
    let pages = process_pages(&provider, &document, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    let text = assemble_text(document.kind(), &pages);
    let succeeded = pages.iter().filter(|p| p.error.is_none()).count();
    let failed = pages.len() - succeeded;

    let stats = ExtractionStats {
        total_pages,
        succeeded_pages: succeeded,
        failed_pages: failed,
        total_prompt_tokens: pages.iter().filter_map(|p| p.usage).map(|u| u.prompt_tokens).sum(),
        total_completion_tokens: pages
            .iter()
            .filter_map(|p| p.usage)
            .map(|u| u.completion_tokens)
            .sum(),
        render_dpi: document.dpi(),
        render_duration_ms,
        extract_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} pages, {}ms total",
        succeeded, total_pages, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        text,
        kind: document.kind(),
        pages,
        stats,
    })
}

/// Extract structured text from a local file.
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let path = path.as_ref();
    info!("Starting extraction: {}", path.display());
    let (bytes, extension) = read_classified(path).await?;
    extract_bytes(&bytes, &extension, config).await
}

/// Extract and write the final text to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. The full
/// output is returned so callers can still inspect per-page responses.
pub async fn extract_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let output = extract_file(input, config).await?;
    write_atomic(output_path.as_ref(), output.text.as_bytes()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(path, config))
}

/// Load and encode without calling the model.
///
/// Does not require a provider or API key.
pub async fn encode_only(
    bytes: &[u8],
    extension: &str,
    config: &ExtractionConfig,
) -> Result<Vec<EncodedPage>, ExtractError> {
    let kind = load::classify(extension)?;
    let document = load::load_document(bytes, kind, config).await?;
    encode_all(&document)
}

/// Write every page of the upload to `out_dir/page_{i}.png`.
///
/// Does not require a provider or API key. Returns the written paths in page
/// order.
pub async fn dump_pages(
    bytes: &[u8],
    extension: &str,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>, ExtractError> {
    let out_dir = out_dir.as_ref();
    let pages = encode_only(bytes, extension, config).await?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(pages.len());
    for page in &pages {
        let path = out_dir.join(format!("page_{}.png", page.page_num));
        tokio::fs::write(&path, &page.png)
            .await
            .map_err(|e| ExtractError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }
    info!("Wrote {} page image(s) to {}", written.len(), out_dir.display());
    Ok(written)
}

/// [`encode_only`] for a local file. The extension is checked before the file
/// is read.
pub async fn encode_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Vec<EncodedPage>, ExtractError> {
    let (bytes, extension) = read_classified(path.as_ref()).await?;
    encode_only(&bytes, &extension, config).await
}

/// [`dump_pages`] for a local file. The extension is checked before the file
/// is read.
pub async fn dump_file_pages(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>, ExtractError> {
    let (bytes, extension) = read_classified(path.as_ref()).await?;
    dump_pages(&bytes, &extension, out_dir, config).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Reject by extension before touching the file, then read it.
async fn read_classified(path: &Path) -> Result<(Vec<u8>, String), ExtractError> {
    let extension = load::extension_of(path);
    load::classify(&extension)?;
    let bytes = load::read_input(path).await?;
    Ok((bytes, extension))
}

/// Resolve the provider: injected first, then the HTTP provider from the
/// configured or environment API key.
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()));

    match key {
        Some(key) => Ok(Arc::new(OpenAiProvider::new(key, &config.base_url)?)),
        None => Err(ExtractError::ProviderNotConfigured {
            provider: "openai".to_string(),
            hint: format!("Set {API_KEY_ENV} or pass --api-key."),
        }),
    }
}

/// Encode and extract each page in order, applying the failure policy.
async fn process_pages(
    provider: &Arc<dyn ExtractionProvider>,
    document: &SourceDocument,
    config: &ExtractionConfig,
) -> Result<Vec<PageResult>, ExtractError> {
    let total_pages = document.page_count();
    let mut results = Vec::with_capacity(total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total_pages);
    }

    for (idx, raster) in document.pages().iter().enumerate() {
        let page_num = idx + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_num, total_pages);
        }

        let result = match encode::encode_page(page_num, raster) {
            Ok(encoded) => llm::extract_page(provider, &encoded, total_pages, config).await,
            Err(e) => PageResult::failed(
                page_num,
                total_pages,
                PageError::Encode {
                    page: page_num,
                    detail: e.to_string(),
                },
            ),
        };

        if let Some(ref cb) = config.progress_callback {
            match &result.error {
                None => cb.on_page_complete(page_num, total_pages, result.text.len()),
                Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
            }
        }

        if let (Some(err), FailurePolicy::Abort) = (&result.error, config.failure_policy) {
            if let Some(ref cb) = config.progress_callback {
                cb.on_run_complete(total_pages, results.len());
            }
            return Err(ExtractError::PageFailed {
                page: page_num,
                total: total_pages,
                source: err.clone(),
            });
        }

        results.push(result);
    }

    if let Some(ref cb) = config.progress_callback {
        let succeeded = results.iter().filter(|r| r.error.is_none()).count();
        cb.on_run_complete(total_pages, succeeded);
    }

    Ok(results)
}

fn encode_all(document: &SourceDocument) -> Result<Vec<EncodedPage>, ExtractError> {
    document
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, raster)| {
            encode::encode_page(idx + 1, raster).map_err(|e| {
                ExtractError::Internal(format!("PNG encoding failed for page {}: {}", idx + 1, e))
            })
        })
        .collect()
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ExtractError> {
    let write_err = |e| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
