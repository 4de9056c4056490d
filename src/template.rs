use askama::Template;

use crate::error::{ExportError, Result};
use crate::types::RenderModel;

/// Turns a render model into markup for a named template.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, model: &RenderModel, template: &str) -> Result<String>;
}

#[derive(Template)]
#[template(path = "sections/cover.html")]
struct CoverPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/bom.html")]
struct BomPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/measurements.html")]
struct MeasurementsPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/fit.html")]
struct FitPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/colorways.html")]
struct ColorwaysPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/construction.html")]
struct ConstructionPage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "sections/care.html")]
struct CarePage<'a> {
    model: &'a RenderModel,
}

#[derive(Template)]
#[template(path = "document.html")]
struct DocumentPage<'a> {
    model: &'a RenderModel,
}

/// Compiled-in HTML templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTemplates;

impl HtmlTemplates {
    pub const NAMES: [&'static str; 8] = [
        "cover",
        "bom",
        "measurements",
        "fit",
        "colorways",
        "construction",
        "care",
        "document",
    ];
}

impl TemplateRenderer for HtmlTemplates {
    fn render(&self, model: &RenderModel, template: &str) -> Result<String> {
        let markup = match template {
            "cover" => CoverPage { model }.render()?,
            "bom" => BomPage { model }.render()?,
            "measurements" => MeasurementsPage { model }.render()?,
            "fit" => FitPage { model }.render()?,
            "colorways" => ColorwaysPage { model }.render()?,
            "construction" => ConstructionPage { model }.render()?,
            "care" => CarePage { model }.render()?,
            "document" => DocumentPage { model }.render()?,
            other => {
                return Err(ExportError::template(format!(
                    "unknown template '{other}'"
                )))
            }
        };
        Ok(markup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::EncodedImage;
    use crate::types::{
        CareView, ColorwayView, FitClass, FitRoundView, FitRow, MaterialGroup, MaterialRow,
        ProductView, SizeRow, SizeTable, StepView, SummaryStats,
    };

    fn model() -> RenderModel {
        RenderModel {
            record_id: "R1".into(),
            code: "TP-001".into(),
            version: "3".into(),
            modified_at: "01 Mar 2026 10:00 UTC".into(),
            generated_at: "02 Mar 2026 09:00 UTC".into(),
            printed_by: "qa".into(),
            currency: "USD".into(),
            product: ProductView {
                name: "Jacket <Pro>".into(),
                season: Some("FW26".into()),
                brand: None,
                category: None,
                description: None,
                designer: None,
                status: None,
                target_price: Some("$129.00".into()),
                image: Some(EncodedImage::placeholder()),
            },
            stats: SummaryStats::default(),
            bom: vec![MaterialGroup {
                category: "Fabric".into(),
                items: vec![MaterialRow {
                    position: 1,
                    name: "Shell".into(),
                    supplier: "Acme".into(),
                    composition: "100% nylon".into(),
                    color: "Navy".into(),
                    placement: "Body".into(),
                    quantity: "1.5 m".into(),
                    unit_price: "$8.00".into(),
                    line_total: "$12.00".into(),
                    lead_time: "10 days".into(),
                    approved: true,
                    image: None,
                }],
                unique_suppliers: 1,
                approved_count: 1,
                average_lead_time: "10 days".into(),
                subtotal: "$12.00".into(),
            }],
            size_table: SizeTable {
                sizes: vec!["S".into(), "M".into()],
                base_size: Some("M".into()),
                unit: "cm".into(),
                rows: vec![SizeRow {
                    code: "A".into(),
                    name: "Chest".into(),
                    tolerance: "± 0.5 cm".into(),
                    values: vec!["50".into(), "52".into()],
                }],
            },
            fit_rounds: vec![FitRoundView {
                round: 1,
                date: "-".into(),
                size: "M".into(),
                comments: None,
                rows: vec![FitRow {
                    code: "A".into(),
                    name: "Chest".into(),
                    requested: "52".into(),
                    measured: "51".into(),
                    diff: "-1".into(),
                    class: Some(FitClass::Under),
                    within_tolerance: false,
                }],
            }],
            colorways: vec![ColorwayView {
                name: "Navy".into(),
                code: "NV".into(),
                hex: "#1B2A4A".into(),
                pantone: "-".into(),
                label_color: "#ffffff".into(),
                notes: None,
                image: None,
            }],
            construction: vec![StepView {
                number: 1,
                title: "Attach collar".into(),
                description: "Topstitch 1/4\"".into(),
                image: None,
            }],
            care: CareView::default(),
            sections: vec!["cover".into(), "bom".into(), "fit".into()],
        }
    }

    #[test]
    fn every_named_template_renders() {
        let model = model();
        for name in HtmlTemplates::NAMES {
            let html = HtmlTemplates
                .render(&model, name)
                .unwrap_or_else(|e| panic!("template {name} failed: {e}"));
            assert!(html.contains("TP-001"), "template {name} missing code");
        }
    }

    #[test]
    fn values_are_html_escaped() {
        let html = HtmlTemplates.render(&model(), "cover").unwrap();
        assert!(html.contains("Jacket &lt;Pro&gt;") || html.contains("Jacket &#60;Pro&#62;"));
        assert!(!html.contains("Jacket <Pro>"));
    }

    #[test]
    fn images_are_inlined_as_data_uris() {
        let html = HtmlTemplates.render(&model(), "cover").unwrap();
        assert!(html.contains("src=\"data:image/svg+xml;base64,"));
    }

    #[test]
    fn landscape_sections_mark_body() {
        let html = HtmlTemplates.render(&model(), "bom").unwrap();
        assert!(html.contains("class=\"landscape\""));
        let html = HtmlTemplates.render(&model(), "fit").unwrap();
        assert!(html.contains("fit-under"));
        assert!(html.contains("out-of-tolerance"));
    }

    #[test]
    fn document_only_includes_requested_sections() {
        let html = HtmlTemplates.render(&model(), "document").unwrap();
        assert!(html.contains("Bill of materials"));
        assert!(html.contains("Fit rounds"));
        assert!(!html.contains("Construction"));
    }

    #[test]
    fn unknown_template_is_template_error() {
        let err = HtmlTemplates.render(&model(), "invoice").unwrap_err();
        assert!(matches!(err, ExportError::Template(_)));
    }
}
