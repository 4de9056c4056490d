use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};

use super::ImageLoadError;

pub const SVG_MIME: &str = "image/svg+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressOptions {
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Vector images are recognised by content type or by sniffing the markup.
pub fn is_vector(bytes: &[u8], content_type: Option<&str>) -> bool {
    if content_type
        .map(|ct| ct.to_ascii_lowercase().starts_with(SVG_MIME))
        .unwrap_or(false)
    {
        return true;
    }
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Best-effort MIME type for raw bytes, used when compression is disabled.
pub fn sniff_mime(bytes: &[u8], content_type: Option<&str>) -> String {
    if is_vector(bytes, content_type) {
        return SVG_MIME.to_string();
    }
    match image::guess_format(bytes).ok().and_then(raster_mime) {
        Some(mime) => mime.to_string(),
        None => content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

/// Downscale into the bounding box and re-encode. Images with transparency
/// stay PNG; everything else becomes JPEG at `quality`.
pub fn compress(
    bytes: &[u8],
    content_type: Option<&str>,
    opts: CompressOptions,
) -> Result<CompressedImage, ImageLoadError> {
    if is_vector(bytes, content_type) {
        return Ok(CompressedImage {
            bytes: bytes.to_vec(),
            mime: SVG_MIME.to_string(),
            width: None,
            height: None,
        });
    }

    let img = image::load_from_memory(bytes)?;
    let img = fit_within(img, opts.max_width, opts.max_height);
    let (width, height) = img.dimensions();

    let mut out = Vec::new();
    let mime = if img.color().has_alpha() {
        img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;
        "image/png"
    } else {
        let rgb = img.to_rgb8();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, opts.quality.clamp(1, 100));
        encoder.encode(rgb.as_raw(), width, height, image::ColorType::Rgb8)?;
        "image/jpeg"
    };

    Ok(CompressedImage {
        bytes: out,
        mime: mime.to_string(),
        width: Some(width),
        height: Some(height),
    })
}

fn raster_mime(format: ImageFormat) -> Option<&'static str> {
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

/// Aspect-preserving shrink; images already inside the box are untouched.
pub fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= max_width && h <= max_height {
        return img;
    }
    let scale = (max_width as f64 / w as f64).min(max_height as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}
