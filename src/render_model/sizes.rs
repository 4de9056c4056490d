use std::cmp::Ordering;

/// Known garment sizes, smallest first.
const CANONICAL: &[&str] = &[
    "XXXS", "XXS", "XS", "S", "M", "L", "XL", "XXL", "2XL", "XXXL", "3XL", "4XL", "5XL",
];

fn canonical_rank(size: &str) -> Option<usize> {
    let upper = size.trim().to_ascii_uppercase();
    CANONICAL.iter().position(|s| *s == upper)
}

fn compare(a: &str, b: &str) -> Ordering {
    match (canonical_rank(a), canonical_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Deduplicate (case-insensitively, first spelling wins) and sort: known
/// sizes in canonical order, then unknown sizes lexicographically.
pub fn order_sizes<I, S>(sizes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for size in sizes {
        let size = size.as_ref().trim();
        if size.is_empty() || out.iter().any(|s| s.eq_ignore_ascii_case(size)) {
            continue;
        }
        out.push(size.to_string());
    }
    out.sort_by(|a, b| compare(a, b));
    out
}

/// `"XS – XL"`, a single size, or `-` when empty.
pub fn size_range(ordered: &[String]) -> String {
    match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) if first == last => first.clone(),
        (Some(first), Some(last)) => format!("{first} – {last}"),
        _ => super::format::EMPTY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_sizes_sort_by_rank() {
        let sizes = order_sizes(["XL", "s", "M", "XS", "2XL"]);
        assert_eq!(sizes, vec!["XS", "s", "M", "XL", "2XL"]);
    }

    #[test]
    fn unknown_sizes_append_lexicographically() {
        let sizes = order_sizes(["M", "38", "Tall", "36", "S"]);
        assert_eq!(sizes, vec!["S", "M", "36", "38", "Tall"]);
    }

    #[test]
    fn duplicates_are_case_insensitive() {
        let sizes = order_sizes(["m", "M", " m "]);
        assert_eq!(sizes, vec!["m"]);
    }

    #[test]
    fn range_formats() {
        assert_eq!(size_range(&order_sizes(["L", "XS", "M"])), "XS – L");
        assert_eq!(size_range(&order_sizes(["M"])), "M");
        assert_eq!(size_range(&[]), "-");
    }
}
