use palette::{convert::FromColorUnclamped, Lab, Srgb};

const DARK_TEXT: &str = "#1a1a1a";
const LIGHT_TEXT: &str = "#ffffff";

/// Parse `#RRGGBB`, `RRGGBB` or `#RGB`.
pub fn parse_hex(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

pub fn normalize_hex(raw: &str) -> Option<String> {
    parse_hex(raw).map(|(r, g, b)| format!("#{r:02X}{g:02X}{b:02X}"))
}

/// Dark text on light swatches, light text on dark ones, split on CIE L*.
pub fn label_color(rgb: (u8, u8, u8)) -> &'static str {
    let srgb = Srgb::new(
        rgb.0 as f32 / 255.0,
        rgb.1 as f32 / 255.0,
        rgb.2 as f32 / 255.0,
    );
    let lab: Lab = Lab::from_color_unclamped(srgb);
    if lab.l > 55.0 {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}
