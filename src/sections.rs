use crate::error::{ExportError, Result};
use crate::page::Orientation;
use crate::types::RenderModel;

pub type InclusionPredicate = fn(&RenderModel) -> bool;

/// Static description of one page group of the exported document.
#[derive(Clone, Copy)]
pub struct SectionDescriptor {
    pub name: &'static str,
    /// Name handed to the template renderer.
    pub template: &'static str,
    pub orientation: Orientation,
    pub include: InclusionPredicate,
}

impl SectionDescriptor {
    pub const fn new(
        name: &'static str,
        template: &'static str,
        orientation: Orientation,
        include: InclusionPredicate,
    ) -> Self {
        Self {
            name,
            template,
            orientation,
            include,
        }
    }
}

impl std::fmt::Debug for SectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionDescriptor")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("orientation", &self.orientation)
            .finish_non_exhaustive()
    }
}

/// Template used when the whole document is rendered in one pass.
pub const DOCUMENT_TEMPLATE: &str = "document";

fn always(_: &RenderModel) -> bool {
    true
}

fn has_materials(model: &RenderModel) -> bool {
    !model.bom.is_empty()
}

fn has_measurements(model: &RenderModel) -> bool {
    !model.size_table.rows.is_empty()
}

fn has_fit_rounds(model: &RenderModel) -> bool {
    !model.fit_rounds.is_empty()
}

fn has_colorways(model: &RenderModel) -> bool {
    !model.colorways.is_empty()
}

fn has_construction(model: &RenderModel) -> bool {
    !model.construction.is_empty()
}

fn has_care(model: &RenderModel) -> bool {
    !model.care.is_empty()
}

pub static DEFAULT_SECTIONS: [SectionDescriptor; 7] = [
    SectionDescriptor::new("cover", "cover", Orientation::Portrait, always),
    SectionDescriptor::new("bom", "bom", Orientation::Landscape, has_materials),
    SectionDescriptor::new(
        "measurements",
        "measurements",
        Orientation::Landscape,
        has_measurements,
    ),
    SectionDescriptor::new("fit", "fit", Orientation::Landscape, has_fit_rounds),
    SectionDescriptor::new("colorways", "colorways", Orientation::Portrait, has_colorways),
    SectionDescriptor::new(
        "construction",
        "construction",
        Orientation::Portrait,
        has_construction,
    ),
    SectionDescriptor::new("care", "care", Orientation::Portrait, has_care),
];

/// Normalize an explicit section filter against the configured descriptors.
/// `None` selects every descriptor. Result keeps descriptor order.
pub fn resolve_filter(
    descriptors: &[SectionDescriptor],
    filter: Option<&[String]>,
) -> Result<Vec<String>> {
    let Some(filter) = filter else {
        return Ok(descriptors.iter().map(|d| d.name.to_string()).collect());
    };

    let requested: Vec<String> = filter
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(unknown) = requested
        .iter()
        .find(|r| !descriptors.iter().any(|d| d.name == r.as_str()))
    {
        return Err(ExportError::Config(format!("unknown section '{unknown}'")));
    }

    Ok(descriptors
        .iter()
        .filter(|d| requested.iter().any(|r| r.as_str() == d.name))
        .map(|d| d.name.to_string())
        .collect())
}

/// Descriptors to render for `model`, in configured order: requested by the
/// job and accepted by their own predicate.
pub fn select<'a>(
    descriptors: &'a [SectionDescriptor],
    model: &RenderModel,
) -> Result<Vec<&'a SectionDescriptor>> {
    let selected: Vec<&SectionDescriptor> = descriptors
        .iter()
        .filter(|d| model.includes(d.name) && (d.include)(model))
        .collect();
    if selected.is_empty() {
        return Err(ExportError::template(format!(
            "no section of record {} has content to render",
            model.record_id
        )));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_filter_keeps_descriptor_order() {
        let filter = vec!["care".to_string(), " BOM ".to_string()];
        let names = resolve_filter(&DEFAULT_SECTIONS, Some(&filter)).unwrap();
        assert_eq!(names, vec!["bom", "care"]);
    }

    #[test]
    fn resolve_filter_without_filter_selects_all() {
        let names = resolve_filter(&DEFAULT_SECTIONS, None).unwrap();
        assert_eq!(names.len(), DEFAULT_SECTIONS.len());
        assert_eq!(names[0], "cover");
    }

    #[test]
    fn resolve_filter_rejects_unknown_names() {
        let filter = vec!["trims".to_string()];
        let err = resolve_filter(&DEFAULT_SECTIONS, Some(&filter)).unwrap_err();
        assert!(matches!(err, ExportError::Config(ref m) if m.contains("trims")));
    }

    #[test]
    fn orientation_of_defaults() {
        let landscape: Vec<&str> = DEFAULT_SECTIONS
            .iter()
            .filter(|d| d.orientation == Orientation::Landscape)
            .map(|d| d.name)
            .collect();
        assert_eq!(landscape, vec!["bom", "measurements", "fit"]);
    }
}
