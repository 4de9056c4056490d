use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use super::ImageLoadError;

/// Where an image reference points, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:` URI carried in the record itself.
    Inline { mime: String, bytes: Vec<u8> },
    /// Absolute `http(s)` URL.
    Remote(Url),
    /// Path relative to the storage root (or absolute on disk).
    Local(String),
}

/// Classify a raw reference string.
pub fn classify(reference: &str) -> Result<ImageSource, ImageLoadError> {
    let value = reference.trim();
    if value.is_empty() {
        return Err(ImageLoadError::InvalidReference("empty reference".into()));
    }

    if let Some(rest) = strip_prefix_ignore_case(value, "data:") {
        return parse_data_uri(rest);
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        let url = Url::parse(value).map_err(|e| {
            ImageLoadError::InvalidReference(format!("invalid URL '{value}': {e}"))
        })?;
        return Ok(ImageSource::Remote(url));
    }

    if value.contains("://") {
        return Err(ImageLoadError::InvalidReference(format!(
            "unsupported scheme in '{value}'"
        )));
    }

    Ok(ImageSource::Local(value.to_string()))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn parse_data_uri(rest: &str) -> Result<ImageSource, ImageLoadError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageLoadError::InvalidReference("data URI without payload".into()))?;

    let mut parts = header.split(';');
    let mime = parts
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("text/plain")
        .to_ascii_lowercase();
    let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(cleaned)
            .map_err(|e| ImageLoadError::InvalidReference(format!("bad base64 payload: {e}")))?
    } else {
        percent_decode(payload)
    };

    if bytes.is_empty() {
        return Err(ImageLoadError::InvalidReference("empty data URI".into()));
    }

    Ok(ImageSource::Inline { mime, bytes })
}

fn percent_decode(raw: &str) -> Vec<u8> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Encode bytes as a base64 `data:` URI.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
