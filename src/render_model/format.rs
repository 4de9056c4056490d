//! Fixed-locale formatting. Output never depends on the host locale.

use chrono::{DateTime, NaiveDate, Utc};

pub const EMPTY: &str = "-";

pub fn date(value: NaiveDate) -> String {
    value.format("%d %b %Y").to_string()
}

pub fn datetime(value: DateTime<Utc>) -> String {
    value.format("%d %b %Y %H:%M UTC").to_string()
}

/// Trim a decimal to at most `max_decimals`, dropping trailing zeros.
pub fn number(value: f64, max_decimals: usize) -> String {
    let mut out = format!("{value:.max_decimals$}");
    if out.contains('.') {
        while out.ends_with('0') {
            out.pop();
        }
        if out.ends_with('.') {
            out.pop();
        }
    }
    if out == "-0" {
        out = "0".to_string();
    }
    out
}

/// `+0.5`, `-1.25`, `0`.
pub fn signed(value: f64, max_decimals: usize) -> String {
    let text = number(value, max_decimals);
    if text != "0" && value > 0.0 {
        format!("+{text}")
    } else {
        text
    }
}

pub fn tolerance(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(t) => format!("± {} {unit}", number(t.abs(), 2)),
        None => EMPTY.to_string(),
    }
}

pub fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return EMPTY.to_string();
    }
    format!("{:.0}%", part as f64 * 100.0 / total as f64)
}

pub fn money(amount: f64, currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    let (prefix, decimals) = match code.as_str() {
        "USD" => ("$".to_string(), 2),
        "EUR" => ("€".to_string(), 2),
        "GBP" => ("£".to_string(), 2),
        "JPY" => ("¥".to_string(), 0),
        "" => ("$".to_string(), 2),
        other => (format!("{other} "), 2),
    };

    let rounded = format!("{:.*}", decimals, amount.abs());
    let (whole, frac) = match rounded.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (rounded, None),
    };
    let grouped = group_thousands(&whole);
    let sign = if amount < 0.0 && rounded_is_nonzero(&grouped, frac.as_deref()) {
        "-"
    } else {
        ""
    };

    match frac {
        Some(f) => format!("{sign}{prefix}{grouped}.{f}"),
        None => format!("{sign}{prefix}{grouped}"),
    }
}

fn rounded_is_nonzero(whole: &str, frac: Option<&str>) -> bool {
    whole.chars().any(|c| c.is_ascii_digit() && c != '0')
        || frac.map_or(false, |f| f.chars().any(|c| c != '0'))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
