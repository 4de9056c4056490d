use serde::Serialize;

use crate::image_loader::EncodedImage;

/// Display-ready projection of a [`DocumentRecord`](super::DocumentRecord).
///
/// Every field is owned and already formatted, so a model can outlive the
/// record it was built from and be handed to templates as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModel {
    pub record_id: String,
    pub code: String,
    pub version: String,
    pub modified_at: String,
    pub generated_at: String,
    pub printed_by: String,
    pub currency: String,
    pub product: ProductView,
    pub stats: SummaryStats,
    pub bom: Vec<MaterialGroup>,
    pub size_table: SizeTable,
    pub fit_rounds: Vec<FitRoundView>,
    pub colorways: Vec<ColorwayView>,
    pub construction: Vec<StepView>,
    pub care: CareView,
    /// Names of the sections this model was built for.
    pub sections: Vec<String>,
}

impl RenderModel {
    pub fn includes(&self, section: &str) -> bool {
        self.sections.iter().any(|s| s == section)
    }

    /// All image slots of the model, in document order.
    pub fn images(&self) -> Vec<&EncodedImage> {
        let mut out = Vec::new();
        out.extend(self.product.image.iter());
        for group in &self.bom {
            out.extend(group.items.iter().filter_map(|m| m.image.as_ref()));
        }
        out.extend(self.colorways.iter().filter_map(|c| c.image.as_ref()));
        out.extend(self.construction.iter().filter_map(|s| s.image.as_ref()));
        out
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub name: String,
    pub season: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub designer: Option<String>,
    pub status: Option<String>,
    pub target_price: Option<String>,
    pub image: Option<EncodedImage>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub material_count: usize,
    pub unique_suppliers: usize,
    pub approved_count: usize,
    pub approved_share: String,
    pub average_lead_time: String,
    pub total_cost: String,
    pub measurement_points: usize,
    pub size_range: String,
    pub colorway_count: usize,
    pub step_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialGroup {
    pub category: String,
    pub items: Vec<MaterialRow>,
    pub unique_suppliers: usize,
    pub approved_count: usize,
    pub average_lead_time: String,
    pub subtotal: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRow {
    /// 1-based running position across the whole bill of materials.
    pub position: usize,
    pub name: String,
    pub supplier: String,
    pub composition: String,
    pub color: String,
    pub placement: String,
    pub quantity: String,
    pub unit_price: String,
    pub line_total: String,
    pub lead_time: String,
    pub approved: bool,
    pub image: Option<EncodedImage>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeTable {
    pub sizes: Vec<String>,
    pub base_size: Option<String>,
    pub unit: String,
    pub rows: Vec<SizeRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeRow {
    pub code: String,
    pub name: String,
    pub tolerance: String,
    /// One cell per entry of [`SizeTable::sizes`]; empty when not measured.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FitClass {
    Under,
    Exact,
    Over,
}

impl FitClass {
    pub fn css_class(&self) -> &'static str {
        match self {
            FitClass::Under => "fit-under",
            FitClass::Exact => "fit-exact",
            FitClass::Over => "fit-over",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRoundView {
    pub round: u32,
    pub date: String,
    pub size: String,
    pub comments: Option<String>,
    pub rows: Vec<FitRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRow {
    pub code: String,
    pub name: String,
    pub requested: String,
    pub measured: String,
    pub diff: String,
    /// `None` until the point has been measured.
    pub class: Option<FitClass>,
    pub within_tolerance: bool,
}

impl FitRow {
    pub fn css_class(&self) -> &'static str {
        self.class.map_or("fit-pending", |c| c.css_class())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorwayView {
    pub name: String,
    pub code: String,
    pub hex: String,
    pub pantone: String,
    /// Text color that stays readable on top of the swatch.
    pub label_color: String,
    pub notes: Option<String>,
    pub image: Option<EncodedImage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub number: u32,
    pub title: String,
    pub description: String,
    pub image: Option<EncodedImage>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CareView {
    pub washing: Vec<String>,
    pub symbols: Vec<String>,
    pub notes: Option<String>,
}

impl CareView {
    pub fn is_empty(&self) -> bool {
        self.washing.is_empty() && self.symbols.is_empty() && self.notes.is_none()
    }
}
