use crate::types::FitClass;

/// Differences smaller than this count as an exact fit.
pub const EXACT_EPSILON: f64 = 0.001;

/// `measured − requested`, unless the record already carries a diff.
pub fn diff(requested: f64, measured: Option<f64>, recorded: Option<f64>) -> Option<f64> {
    recorded.or_else(|| measured.map(|m| m - requested))
}

pub fn classify(diff: f64) -> FitClass {
    if diff < -EXACT_EPSILON {
        FitClass::Under
    } else if diff > EXACT_EPSILON {
        FitClass::Over
    } else {
        FitClass::Exact
    }
}

/// Without a tolerance only an exact fit counts as within tolerance.
pub fn within_tolerance(diff: f64, tolerance: Option<f64>) -> bool {
    match tolerance {
        Some(t) => diff.abs() <= t.abs() + EXACT_EPSILON,
        None => classify(diff) == FitClass::Exact,
    }
}
