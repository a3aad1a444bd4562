//! Document loading: classify the upload and turn it into rasters.
//!
//! Classification is by extension against a fixed accept list; decoding is by
//! content. A `.jpg` that actually holds PNG bytes still decodes, while a
//! `.tiff` is rejected before any bytes are inspected.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::DocumentKind;
use crate::pipeline::render;
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, info};

/// Extensions accepted for upload, lowercase.
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "pdf"];

/// How an upload will be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Pdf,
}

/// Classify an upload by its extension (with or without the leading dot).
pub fn classify(extension: &str) -> Result<SourceKind, ExtractError> {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Ok(SourceKind::Pdf),
        e if ACCEPTED_EXTENSIONS.contains(&e) => Ok(SourceKind::Image),
        _ => Err(ExtractError::UnsupportedFormat { extension: ext }),
    }
}

/// Lowercased extension of `path`, or an empty string when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// A loaded upload: the single image, or every page of a PDF in order.
#[derive(Debug, Clone)]
pub enum SourceDocument {
    Image(DynamicImage),
    Pdf { pages: Vec<DynamicImage>, dpi: u32 },
}

impl SourceDocument {
    /// Rasters in page order; page `i` (1-indexed) is `pages()[i - 1]`.
    pub fn pages(&self) -> &[DynamicImage] {
        match self {
            SourceDocument::Image(img) => std::slice::from_ref(img),
            SourceDocument::Pdf { pages, .. } => pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages().len()
    }

    /// Rendering DPI of a PDF; `None` for an image, which keeps its pixels.
    pub fn dpi(&self) -> Option<u32> {
        match self {
            SourceDocument::Image(_) => None,
            SourceDocument::Pdf { dpi, .. } => Some(*dpi),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            SourceDocument::Image(_) => DocumentKind::Image,
            SourceDocument::Pdf { .. } => DocumentKind::Pdf,
        }
    }
}

/// Read a local file, mapping the common failures to typed errors.
pub async fn read_input(path: &Path) -> Result<Vec<u8>, ExtractError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Load an upload into rasters.
///
/// PDFs are rendered eagerly, every page, at `config.dpi` before this returns.
pub async fn load_document(
    bytes: &[u8],
    kind: SourceKind,
    config: &ExtractionConfig,
) -> Result<SourceDocument, ExtractError> {
    match kind {
        SourceKind::Image => {
            let img = decode_image(bytes)?;
            info!("Loaded image {}x{}", img.width(), img.height());
            Ok(SourceDocument::Image(img))
        }
        SourceKind::Pdf => {
            check_pdf_header(bytes)?;
            let pages = render::render_pdf(bytes.to_vec(), config).await?;
            if pages.is_empty() {
                return Err(ExtractError::Decode {
                    detail: "PDF has no pages".into(),
                });
            }
            info!("Loaded PDF: {} pages at {} DPI", pages.len(), config.dpi);
            Ok(SourceDocument::Pdf {
                pages,
                dpi: config.dpi,
            })
        }
    }
}

/// Decode image bytes, sniffing the format from content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
    image::load_from_memory(bytes).map_err(|e| ExtractError::Decode {
        detail: format!("not a readable image: {e}"),
    })
}

/// PDF readers accept the `%PDF` marker anywhere in the first 1024 bytes.
fn check_pdf_header(bytes: &[u8]) -> Result<(), ExtractError> {
    let head = &bytes[..bytes.len().min(1024)];
    if head.windows(4).any(|w| w == b"%PDF") {
        Ok(())
    } else {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        Err(ExtractError::Decode {
            detail: format!("not a PDF (first bytes: {magic:?})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn classify_accepts_known_extensions() {
        for ext in ["png", "JPG", ".jpeg", "bmp", "gif"] {
            assert_eq!(classify(ext).unwrap(), SourceKind::Image, "{ext}");
        }
        assert_eq!(classify("PDF").unwrap(), SourceKind::Pdf);
    }

    #[test]
    fn classify_rejects_unknown_extension() {
        let err = classify("tiff").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { ref extension } if extension == "tiff"));
        assert!(classify("").is_err());
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("/tmp/Scan.JPEG")), "jpeg");
        assert_eq!(extension_of(Path::new("README")), "");
    }

    #[test]
    fn decode_sniffs_content_not_extension() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        // Classified as a JPEG upload, decoded as the PNG it really is.
        assert_eq!(classify("jpg").unwrap(), SourceKind::Image);
        let decoded = decode_image(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn document_reports_pages_and_dpi() {
        let raster = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let image = SourceDocument::Image(raster.clone());
        assert_eq!((image.page_count(), image.dpi()), (1, None));

        let pdf = SourceDocument::Pdf {
            pages: vec![raster; 3],
            dpi: 150,
        };
        assert_eq!((pdf.page_count(), pdf.dpi()), (3, Some(150)));
        assert_eq!(pdf.kind(), DocumentKind::Pdf);
    }

    #[test]
    fn corrupt_image_is_decode_error() {
        let err = decode_image(b"\x89PNG\r\n\x1a\nnot really").unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }

    #[test]
    fn pdf_header_check() {
        assert!(check_pdf_header(b"%PDF-1.7\n...").is_ok());
        assert!(check_pdf_header(b"\n\n%PDF-1.4").is_ok());
        assert!(matches!(
            check_pdf_header(b"GIF89a"),
            Err(ExtractError::Decode { .. })
        ));
        assert!(check_pdf_header(b"").is_err());
    }

    #[tokio::test]
    async fn read_missing_file() {
        let err = read_input(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }
}
