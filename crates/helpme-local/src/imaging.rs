//! Image preparation before a vision call. Everything here is CPU-bound; async callers run it
//! under `spawn_blocking`.

use base64::Engine as _;
use helpme_core::{Error, Result};
use std::io::Cursor;

/// Screenshots wider than this are scaled down (aspect preserved) before upload.
pub const DEFAULT_MAX_WIDTH: u32 = 1920;

#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub base64: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode `bytes`, downscale to `max_width` if needed, re-encode as PNG and base64 it.
pub fn prepare_image(bytes: &[u8], max_width: u32) -> Result<PreparedImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::Parse(format!("image decode: {e}")))?;
    let img = if max_width > 0 && img.width() > max_width {
        let h = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
        img.resize(max_width, h, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| Error::Parse(format!("image encode: {e}")))?;
    Ok(PreparedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(buf.into_inner()),
        mime_type: "image/png",
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn wide_images_are_downscaled_keeping_aspect() {
        let out = prepare_image(&png(400, 100), 200).unwrap();
        assert_eq!((out.width, out.height), (200, 50));
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&out.base64)
            .unwrap();
        assert!(raw.starts_with(b"\x89PNG"));
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let out = prepare_image(&png(64, 300), 200).unwrap();
        assert_eq!((out.width, out.height), (64, 300));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            prepare_image(b"not an image", 100),
            Err(Error::Parse(_))
        ));
    }
}
