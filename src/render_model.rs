//! Record → render model transformation.

mod bom;
pub mod fit;
pub mod format;
pub mod sizes;
pub mod swatch;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::image_loader::{EncodedImage, ImageLoader, ImageOptions};
use crate::sections::DEFAULT_SECTIONS;
use crate::types::{
    CareView, ColorwayView, DocumentRecord, FitRoundView, FitRow, ProductView, RenderModel,
    SizeRow, SizeTable, StepView, SummaryStats,
};

pub use bom::{group_materials, BomSummary};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub printed_by: String,
    pub generated_at: DateTime<Utc>,
    /// Sections the model is built for; `None` means every default section.
    pub include_sections: Option<Vec<String>>,
}

impl BuildOptions {
    pub fn new(printed_by: impl Into<String>) -> Self {
        Self {
            printed_by: printed_by.into(),
            generated_at: Utc::now(),
            include_sections: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Product,
    Material(usize),
    Colorway(usize),
    Step(usize),
}

pub struct ModelBuilder {
    images: Arc<ImageLoader>,
    image_options: ImageOptions,
    max_parallel: usize,
}

impl ModelBuilder {
    pub fn new(images: Arc<ImageLoader>, image_options: ImageOptions, max_parallel: usize) -> Self {
        Self {
            images,
            image_options,
            max_parallel: max_parallel.max(1),
        }
    }

    pub async fn build(&self, record: &DocumentRecord, options: &BuildOptions) -> RenderModel {
        let sections: Vec<String> = match &options.include_sections {
            Some(list) => list.clone(),
            None => DEFAULT_SECTIONS.iter().map(|d| d.name.to_string()).collect(),
        };
        let mut images = self.resolve_images(record, &sections).await;
        let currency = record
            .product
            .currency
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "USD".to_string());

        let material_images: Vec<Option<EncodedImage>> = (0..record.materials.len())
            .map(|i| images.remove(&Slot::Material(i)))
            .collect();
        let bom = group_materials(&record.materials, &material_images, &currency);
        let size_table = size_table(record);
        let fit_rounds = fit_rounds(record);

        let colorways: Vec<ColorwayView> = record
            .colorways
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let rgb = c.hex.as_deref().and_then(swatch::parse_hex);
                ColorwayView {
                    name: c.name.trim().to_string(),
                    code: text(c.code.as_deref()),
                    hex: c
                        .hex
                        .as_deref()
                        .and_then(swatch::normalize_hex)
                        .unwrap_or_default(),
                    pantone: text(c.pantone.as_deref()),
                    label_color: rgb
                        .map(swatch::label_color)
                        .unwrap_or("#1a1a1a")
                        .to_string(),
                    notes: non_blank(c.notes.as_deref()),
                    image: images.remove(&Slot::Colorway(i)),
                }
            })
            .collect();

        let construction: Vec<StepView> = record
            .construction_steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepView {
                number: s.step.unwrap_or(i as u32 + 1),
                title: s.title.trim().to_string(),
                description: s.description.as_deref().unwrap_or("").trim().to_string(),
                image: images.remove(&Slot::Step(i)),
            })
            .collect();

        let care = CareView {
            washing: clean_lines(&record.care.washing),
            symbols: clean_lines(&record.care.symbols),
            notes: non_blank(record.care.notes.as_deref()),
        };

        let stats = SummaryStats {
            material_count: bom.material_count,
            unique_suppliers: bom.unique_suppliers,
            approved_count: bom.approved_count,
            approved_share: format::percent(bom.approved_count, bom.material_count),
            average_lead_time: bom.average_lead_time.clone(),
            total_cost: bom.total_cost.clone(),
            measurement_points: size_table.rows.len(),
            size_range: sizes::size_range(&size_table.sizes),
            colorway_count: colorways.len(),
            step_count: construction.len(),
        };

        let product = &record.product;
        let product_view = ProductView {
            name: product.name.trim().to_string(),
            season: non_blank(product.season.as_deref()),
            brand: non_blank(product.brand.as_deref()),
            category: non_blank(product.category.as_deref()),
            description: non_blank(product.description.as_deref()),
            designer: non_blank(product.designer.as_deref()),
            status: non_blank(product.status.as_deref()),
            target_price: product.target_price.map(|p| format::money(p, &currency)),
            image: images.remove(&Slot::Product),
        };

        RenderModel {
            record_id: record.id.clone(),
            code: record.code.clone(),
            version: record.version.clone(),
            modified_at: format::datetime(record.modified_at),
            generated_at: format::datetime(options.generated_at),
            printed_by: options.printed_by.clone(),
            currency,
            product: product_view,
            stats,
            bom: bom.groups,
            size_table,
            fit_rounds,
            colorways,
            construction,
            care,
            sections,
        }
    }

    /// Resolve every image of the requested sections in one bounded batch.
    async fn resolve_images(
        &self,
        record: &DocumentRecord,
        sections: &[String],
    ) -> HashMap<Slot, EncodedImage> {
        let wants = |name: &str| sections.iter().any(|s| s == name);
        let mut slots: Vec<(Slot, String)> = Vec::new();
        if wants("cover") {
            if let Some(r) = non_blank(record.product.image.as_deref()) {
                slots.push((Slot::Product, r));
            }
        }
        if wants("bom") {
            for (i, m) in record.materials.iter().enumerate() {
                if let Some(r) = non_blank(m.image.as_deref()) {
                    slots.push((Slot::Material(i), r));
                }
            }
        }
        if wants("colorways") {
            for (i, c) in record.colorways.iter().enumerate() {
                if let Some(r) = non_blank(c.image.as_deref()) {
                    slots.push((Slot::Colorway(i), r));
                }
            }
        }
        if wants("construction") {
            for (i, s) in record.construction_steps.iter().enumerate() {
                if let Some(r) = non_blank(s.image.as_deref()) {
                    slots.push((Slot::Step(i), r));
                }
            }
        }
        if slots.is_empty() {
            return HashMap::new();
        }

        let references: Vec<String> = slots.iter().map(|(_, r)| r.clone()).collect();
        let resolved = self
            .images
            .resolve_many(&references, self.image_options, self.max_parallel)
            .await;
        let degraded = resolved.iter().filter(|i| i.placeholder).count();
        debug!(
            record_id = %record.id,
            images = resolved.len(),
            degraded,
            "resolved record images"
        );

        slots
            .into_iter()
            .map(|(slot, _)| slot)
            .zip(resolved)
            .collect()
    }
}

fn size_table(record: &DocumentRecord) -> SizeTable {
    let table = &record.measurements;
    let declared = table.sizes.iter().map(String::as_str);
    let measured = table
        .points
        .iter()
        .flat_map(|p| p.values.keys().map(String::as_str));
    let sizes = sizes::order_sizes(declared.chain(measured));
    let unit = table
        .unit
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("cm")
        .to_string();

    let rows = table
        .points
        .iter()
        .map(|point| SizeRow {
            code: point.code.trim().to_string(),
            name: point.name.trim().to_string(),
            tolerance: format::tolerance(point.tolerance, &unit),
            values: sizes
                .iter()
                .map(|size| {
                    point
                        .values
                        .iter()
                        .find(|(k, _)| k.trim().eq_ignore_ascii_case(size))
                        .map(|(_, v)| format::number(*v, 2))
                        .unwrap_or_default()
                })
                .collect(),
        })
        .collect();

    SizeTable {
        sizes,
        base_size: non_blank(table.base_size.as_deref()),
        unit,
        rows,
    }
}

fn fit_rounds(record: &DocumentRecord) -> Vec<FitRoundView> {
    let points = &record.measurements.points;
    let mut rounds: Vec<&crate::types::FitRound> = record.fit_rounds.iter().collect();
    rounds.sort_by_key(|r| r.round);

    rounds
        .into_iter()
        .map(|round| {
            let rows = round
                .entries
                .iter()
                .map(|entry| {
                    let point = points
                        .iter()
                        .find(|p| p.code.trim().eq_ignore_ascii_case(entry.point.trim()));
                    let diff = fit::diff(entry.requested, entry.measured, entry.diff);
                    let tolerance = point.and_then(|p| p.tolerance);
                    FitRow {
                        code: entry.point.trim().to_string(),
                        name: point
                            .map(|p| p.name.trim().to_string())
                            .unwrap_or_else(|| entry.point.trim().to_string()),
                        requested: format::number(entry.requested, 2),
                        measured: entry
                            .measured
                            .map(|m| format::number(m, 2))
                            .unwrap_or_else(|| format::EMPTY.to_string()),
                        diff: diff
                            .map(|d| format::signed(d, 2))
                            .unwrap_or_else(|| format::EMPTY.to_string()),
                        class: diff.map(fit::classify),
                        within_tolerance: diff.map_or(false, |d| fit::within_tolerance(d, tolerance)),
                    }
                })
                .collect();

            FitRoundView {
                round: round.round,
                date: round
                    .date
                    .map(format::date)
                    .unwrap_or_else(|| format::EMPTY.to_string()),
                size: non_blank(round.size.as_deref())
                    .or_else(|| non_blank(record.measurements.base_size.as_deref()))
                    .unwrap_or_else(|| format::EMPTY.to_string()),
                comments: non_blank(round.comments.as_deref()),
                rows,
            }
        })
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn text(value: Option<&str>) -> String {
    non_blank(value).unwrap_or_else(|| format::EMPTY.to_string())
}

fn clean_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
