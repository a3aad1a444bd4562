//! Image encoding: `DynamicImage` → PNG → base64 → `data:` URI.
//!
//! Every raster is re-encoded as PNG regardless of the upload's format, so
//! the model always receives lossless pixels and a single MIME type. Encoding
//! uses the `image` crate's default PNG settings and is deterministic.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Prefix of every data URI produced by [`encode_page`].
pub const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// One page re-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Lossless PNG bytes.
    pub png: Vec<u8>,
    /// Standard (padded) base64 of `png`.
    pub base64: String,
}

impl EncodedPage {
    /// `data:image/png;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("{}{}", DATA_URI_PREFIX, self.base64)
    }
}

/// Encode a raster as PNG and base64.
pub fn encode_page(page_num: usize, img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

    let base64 = STANDARD.encode(&png);
    debug!(
        "Encoded page {} → {} PNG bytes, {} base64 chars",
        page_num,
        png.len(),
        base64.len()
    );

    Ok(EncodedPage {
        page_num,
        png,
        base64,
    })
}

/// Decode a `data:image/png;base64,` URI back into a raster.
pub fn decode_data_uri(uri: &str) -> Result<DynamicImage, ExtractError> {
    let payload = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| ExtractError::Decode {
            detail: "not a data:image/png;base64 URI".into(),
        })?;
    let png = STANDARD.decode(payload).map_err(|e| ExtractError::Decode {
        detail: format!("invalid base64: {e}"),
    })?;
    image::load_from_memory_with_format(&png, image::ImageFormat::Png).map_err(|e| {
        ExtractError::Decode {
            detail: format!("invalid PNG payload: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let page = encode_page(1, &img).expect("encode should succeed");
        assert_eq!(page.page_num, 1);
        assert!(page.png.starts_with(b"\x89PNG"));
        assert_eq!(STANDARD.decode(&page.base64).unwrap(), page.png);
        assert!(page.data_uri().starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn round_trip_is_pixel_identical() {
        let mut img = RgbaImage::new(7, 5);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 30) as u8, (y * 50) as u8, 7, (255 - x * 10) as u8]);
        }
        let img = DynamicImage::ImageRgba8(img);
        let page = encode_page(1, &img).unwrap();
        let back = decode_data_uri(&page.data_uri()).unwrap();
        assert_eq!(back.to_rgba8(), img.to_rgba8());
    }

    #[test]
    fn grayscale_round_trip_keeps_values() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(3, 3, |x, y| Luma([(x + 3 * y) as u8 * 20])));
        let page = encode_page(2, &img).unwrap();
        let back = decode_data_uri(&page.data_uri()).unwrap();
        assert_eq!(back.to_luma8(), img.to_luma8());
    }

    #[test]
    fn encoding_is_deterministic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 128, 255, 255])));
        assert_eq!(encode_page(1, &img).unwrap(), encode_page(1, &img).unwrap());
    }

    #[test]
    fn decode_rejects_other_mime_types() {
        let err = decode_data_uri("data:image/jpeg;base64,AAAA").unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let err = decode_data_uri("data:image/png;base64,@@@").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }
}
