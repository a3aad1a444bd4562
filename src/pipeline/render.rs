//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Threading
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps global state and
//! is CPU-bound. Rendering runs on tokio's blocking pool so async worker
//! threads never stall, and a process-wide lock keeps at most one pdfium
//! instance initialised at a time.
//!
//! Pages are rendered at `dpi / 72` times their size in points (PDF user
//! space is 72 units per inch). There is no pixel cap: a large page at high
//! DPI produces a correspondingly large raster.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Rasterise every page of an in-memory PDF, in page order.
pub async fn render_pdf(
    bytes: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<Vec<DynamicImage>, ExtractError> {
    let dpi = config.dpi;
    let password = config.pdf_password.clone();
    let lib_path = config.pdfium_lib_path.clone();

    tokio::task::spawn_blocking(move || {
        render_pdf_blocking(&bytes, dpi, password.as_deref(), lib_path.as_deref())
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to pdfium: an explicit library file or directory, else the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => {
            let file: PathBuf = Pdfium::pdfium_platform_library_name_at_path(path).into();
            Pdfium::bind_to_library(file)
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Scale factor from PDF points to pixels at `dpi`.
pub fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / 72.0
}

/// Pixel dimensions of a page of `width_pt` × `height_pt` points at `scale`.
pub fn pixel_size(width_pt: f32, height_pt: f32, scale: f32) -> (i32, i32) {
    (
        ((width_pt * scale).round() as i32).max(1),
        ((height_pt * scale).round() as i32).max(1),
    )
}

fn render_pdf_blocking(
    bytes: &[u8],
    dpi: u32,
    password: Option<&str>,
    lib_path: Option<&Path>,
) -> Result<Vec<DynamicImage>, ExtractError> {
    let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let pdfium = bind_pdfium(lib_path)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ExtractError::WrongPassword
                } else {
                    ExtractError::PasswordRequired
                }
            } else {
                ExtractError::Decode {
                    detail: format!("corrupt PDF: {}", err_str),
                }
            }
        })?;

    let scale = scale_for_dpi(dpi);
    let pages = document.pages();
    let mut results = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let (width, height) = pixel_size(page.width().value, page.height().value, scale);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractError::Decode {
                detail: format!("page {} could not be rendered: {:?}", idx + 1, e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(image);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_matches_points_per_inch() {
        assert_eq!(scale_for_dpi(72), 1.0);
        assert_eq!(scale_for_dpi(144), 2.0);
        assert!((scale_for_dpi(300) - 4.1666).abs() < 0.001);
    }

    #[test]
    fn pixel_size_at_common_dpis() {
        assert_eq!(pixel_size(72.0, 144.0, scale_for_dpi(144)), (144, 288));
        // A4 at 300 DPI
        assert_eq!(pixel_size(595.0, 842.0, scale_for_dpi(300)), (2479, 3508));
        assert_eq!(pixel_size(0.1, 0.1, 1.0), (1, 1));
    }

    #[test]
    fn missing_library_file_fails_to_bind() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so")))
            .err()
            .expect("binding a missing file must fail");
        assert!(matches!(err, ExtractError::PdfiumBindingFailed(_)));
    }
}
