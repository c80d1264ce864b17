//! Image encoding: `DynamicImage` → base64 [`PageImage`].
//!
//! The same encoded preview serves two consumers: the user looking at the
//! page and the model reading it as an inline image part. Both want a data
//! payload they can embed directly, so previews are stored base64-encoded.

use crate::config::PreviewFormat;
use crate::document::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Size of the fallback preview (US-letter aspect ratio).
const PLACEHOLDER_WIDTH: u32 = 170;
const PLACEHOLDER_HEIGHT: u32 = 220;

/// Encode a rendered page as a base64 preview.
pub fn encode_page(
    img: &DynamicImage,
    format: PreviewFormat,
    jpeg_quality: u8,
) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PreviewFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        PreviewFormat::Jpeg => {
            // JPEG has no alpha channel; pdfium bitmaps are RGBA.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, jpeg_quality).encode_image(&rgb)?;
        }
    }

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} preview → {} bytes base64",
        img.width(),
        img.height(),
        data.len()
    );

    Ok(PageImage {
        data,
        mime_type: format.mime_type().to_string(),
        width: img.width(),
        height: img.height(),
        placeholder: false,
    })
}

/// A plain light-grey page with a darker frame, used when rendering fails.
pub fn placeholder_image() -> PageImage {
    let frame = Rgb([200u8, 200, 200]);
    let fill = Rgb([238u8, 238, 238]);
    let img = RgbImage::from_fn(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, |x, y| {
        let edge = x < 2 || y < 2 || x >= PLACEHOLDER_WIDTH - 2 || y >= PLACEHOLDER_HEIGHT - 2;
        if edge {
            frame
        } else {
            fill
        }
    });

    let mut buf = Vec::new();
    let data = match DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
    {
        Ok(()) => STANDARD.encode(&buf),
        // In-memory PNG encoding of a fixed-size RGB image does not fail in
        // practice; an empty payload still marks the page as a placeholder.
        Err(_) => String::new(),
    };

    PageImage {
        data,
        mime_type: "image/png".to_string(),
        width: PLACEHOLDER_WIDTH,
        height: PLACEHOLDER_HEIGHT,
        placeholder: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png() {
        let data =
            encode_page(&red_square(), PreviewFormat::Png, 85).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!((data.width, data.height), (10, 10));
        assert!(!data.placeholder);
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_jpeg_drops_alpha() {
        let data =
            encode_page(&red_square(), PreviewFormat::Jpeg, 80).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn placeholder_is_marked_and_decodable() {
        let p = placeholder_image();
        assert!(p.placeholder);
        assert_eq!(p.mime_type, "image/png");
        let bytes = p.decode().unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), PLACEHOLDER_WIDTH);
        assert_eq!(img.height(), PLACEHOLDER_HEIGHT);
    }
}
