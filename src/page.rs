use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MM_PER_INCH: f64 = 25.4;
const POINTS_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => f.write_str("portrait"),
            Orientation::Landscape => f.write_str("landscape"),
        }
    }
}

/// Paper size in millimetres, always stored portrait (width <= height).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSize {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom { width_mm: f64, height_mm: f64 },
}

#[derive(Debug, Error)]
pub enum PageSizeParseError {
    #[error("Invalid page size: expected a named size (A3, A4, A5, Letter, Legal, Tabloid) or WIDTHxHEIGHTmm")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Page dimensions must be positive")]
    NonPositive,
}

impl PageSize {
    /// Portrait dimensions in millimetres.
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match *self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Legal => (215.9, 355.6),
            PageSize::Tabloid => (279.4, 431.8),
            PageSize::Custom {
                width_mm,
                height_mm,
            } => (width_mm.min(height_mm), width_mm.max(height_mm)),
        }
    }

    /// Page dimensions in inches for the given orientation, as the print
    /// protocol expects them.
    pub fn inches(&self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.dimensions_mm();
        let (w, h) = match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        };
        (w / MM_PER_INCH, h / MM_PER_INCH)
    }

    /// Page dimensions in PDF points for the given orientation.
    pub fn points(&self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.inches(orientation);
        (w * POINTS_PER_INCH, h * POINTS_PER_INCH)
    }
}

impl FromStr for PageSize {
    type Err = PageSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "a3" => return Ok(PageSize::A3),
            "a4" => return Ok(PageSize::A4),
            "a5" => return Ok(PageSize::A5),
            "letter" => return Ok(PageSize::Letter),
            "legal" => return Ok(PageSize::Legal),
            "tabloid" => return Ok(PageSize::Tabloid),
            _ => {}
        }

        let body = trimmed
            .strip_suffix("mm")
            .ok_or(PageSizeParseError::InvalidFormat)?;
        let parts: Vec<&str> = body.split('x').collect();
        if parts.len() != 2 {
            return Err(PageSizeParseError::InvalidFormat);
        }

        let width_mm: f64 = parts[0]
            .trim()
            .parse()
            .map_err(|_| PageSizeParseError::InvalidWidth(parts[0].to_string()))?;
        let height_mm: f64 = parts[1]
            .trim()
            .parse()
            .map_err(|_| PageSizeParseError::InvalidHeight(parts[1].to_string()))?;

        if width_mm <= 0.0 || height_mm <= 0.0 {
            return Err(PageSizeParseError::NonPositive);
        }

        Ok(PageSize::Custom {
            width_mm,
            height_mm,
        })
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::A3 => f.write_str("A3"),
            PageSize::A4 => f.write_str("A4"),
            PageSize::A5 => f.write_str("A5"),
            PageSize::Letter => f.write_str("Letter"),
            PageSize::Legal => f.write_str("Legal"),
            PageSize::Tabloid => f.write_str("Tabloid"),
            PageSize::Custom {
                width_mm,
                height_mm,
            } => write!(f, "{width_mm}x{height_mm}mm"),
        }
    }
}

impl Serialize for PageSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 18.0,
            right: 12.0,
            bottom: 18.0,
            left: 12.0,
        }
    }
}

impl Margins {
    pub fn uniform(mm: f64) -> Self {
        Self {
            top: mm,
            right: mm,
            bottom: mm,
            left: mm,
        }
    }

    pub fn inches(&self) -> (f64, f64, f64, f64) {
        (
            self.top / MM_PER_INCH,
            self.right / MM_PER_INCH,
            self.bottom / MM_PER_INCH,
            self.left / MM_PER_INCH,
        )
    }
}

/// Everything the PDF print step needs for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub size: PageSize,
    pub orientation: Orientation,
    pub margins: Margins,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub print_background: bool,
}

impl PageLayout {
    pub fn new(size: PageSize, orientation: Orientation, margins: Margins) -> Self {
        Self {
            size,
            orientation,
            margins,
            header_template: None,
            footer_template: None,
            print_background: true,
        }
    }

    /// Header shows the document code and version; footer shows page numbers.
    /// The `pageNumber`/`totalPages` classes are filled in by the browser.
    pub fn with_running_header(mut self, code: &str, version: &str) -> Self {
        let code = escape_html(code);
        let version = escape_html(version);
        self.header_template = Some(format!(
            "<div style=\"font-size:8px;width:100%;padding:0 12mm;display:flex;justify-content:space-between;color:#555\">\
             <span>{code}</span><span>v{version}</span></div>"
        ));
        self.footer_template = Some(
            "<div style=\"font-size:8px;width:100%;text-align:center;color:#555\">\
             <span class=\"pageNumber\"></span> / <span class=\"totalPages\"></span></div>"
                .to_string(),
        );
        self
    }

    pub fn has_header_footer(&self) -> bool {
        self.header_template.is_some() || self.footer_template.is_some()
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_sizes() {
        assert_eq!("A4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!(" letter ".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!("TABLOID".parse::<PageSize>().unwrap(), PageSize::Tabloid);
    }

    #[test]
    fn test_parse_custom() {
        let size: PageSize = "100x150mm".parse().unwrap();
        assert_eq!(size.dimensions_mm(), (100.0, 150.0));

        // stored portrait even when given landscape
        let size: PageSize = "150x100mm".parse().unwrap();
        assert_eq!(size.dimensions_mm(), (100.0, 150.0));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("A9".parse::<PageSize>().is_err());
        assert!("100x150".parse::<PageSize>().is_err());
        assert!("axbmm".parse::<PageSize>().is_err());
        assert!("0x100mm".parse::<PageSize>().is_err());
        assert!("10x20x30mm".parse::<PageSize>().is_err());
    }

    #[test]
    fn test_display_roundtrip_for_custom() {
        let size = PageSize::Custom {
            width_mm: 120.0,
            height_mm: 80.5,
        };
        assert_eq!(size.to_string(), "120x80.5mm");
        assert_eq!(size.to_string().parse::<PageSize>().unwrap().dimensions_mm(), (80.5, 120.0));
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let (pw, ph) = PageSize::A4.points(Orientation::Portrait);
        let (lw, lh) = PageSize::A4.points(Orientation::Landscape);
        assert!(pw < ph);
        assert!((lw - ph).abs() < 1e-9);
        assert!((lh - pw).abs() < 1e-9);
        assert!((pw - 595.2756).abs() < 0.01);
    }

    #[test]
    fn running_header_escapes_code() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, Margins::default())
            .with_running_header("TP<1>", "3");
        let header = layout.header_template.unwrap();
        assert!(header.contains("TP&lt;1&gt;"));
        assert!(header.contains("v3"));
        assert!(layout.footer_template.unwrap().contains("totalPages"));
    }

    #[test]
    fn page_size_deserializes_from_string() {
        #[derive(Deserialize)]
        struct Holder {
            size: PageSize,
        }
        let holder: Holder = serde_json::from_str(r#"{"size":"Legal"}"#).unwrap();
        assert_eq!(holder.size, PageSize::Legal);
    }
}
