use std::collections::HashSet;

use super::format;
use crate::image_loader::EncodedImage;
use crate::types::{Material, MaterialGroup, MaterialRow};

const UNCATEGORIZED: &str = "Other";

#[derive(Debug, Clone)]
pub struct BomSummary {
    pub groups: Vec<MaterialGroup>,
    pub material_count: usize,
    pub unique_suppliers: usize,
    pub approved_count: usize,
    pub average_lead_time: String,
    pub total_cost: String,
}

/// Running aggregates for one slice of materials.
#[derive(Default)]
struct Tally {
    suppliers: HashSet<String>,
    approved: usize,
    lead_time_sum: u64,
    lead_time_n: u64,
    cost: f64,
    priced: usize,
}

impl Tally {
    fn add(&mut self, material: &Material) {
        if let Some(supplier) = material.supplier.as_deref().map(str::trim) {
            if !supplier.is_empty() {
                self.suppliers.insert(supplier.to_lowercase());
            }
        }
        if material.approved {
            self.approved += 1;
        }
        if let Some(days) = material.lead_time_days {
            self.lead_time_sum += u64::from(days);
            self.lead_time_n += 1;
        }
        if let Some(price) = material.unit_price {
            self.cost += price * material.quantity;
            self.priced += 1;
        }
    }

    fn average_lead_time(&self) -> String {
        if self.lead_time_n == 0 {
            return format::EMPTY.to_string();
        }
        let avg = self.lead_time_sum as f64 / self.lead_time_n as f64;
        format!("{} days", format::number(avg, 1))
    }

    fn cost(&self, currency: &str) -> String {
        if self.priced == 0 {
            return format::EMPTY.to_string();
        }
        format::money(self.cost, currency)
    }
}

fn category_of(material: &Material) -> String {
    material
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(UNCATEGORIZED)
        .to_string()
}

fn text(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(format::EMPTY)
        .to_string()
}

/// Group materials by category in order of first appearance. `images` is
/// aligned with `materials`.
pub fn group_materials(
    materials: &[Material],
    images: &[Option<EncodedImage>],
    currency: &str,
) -> BomSummary {
    let mut order: Vec<String> = Vec::new();
    for material in materials {
        let category = category_of(material);
        if !order.iter().any(|c| c.eq_ignore_ascii_case(&category)) {
            order.push(category);
        }
    }

    let mut overall = Tally::default();
    let mut position = 0;
    let mut groups = Vec::with_capacity(order.len());

    for category in order {
        let mut tally = Tally::default();
        let mut items = Vec::new();

        for (idx, material) in materials.iter().enumerate() {
            if !category_of(material).eq_ignore_ascii_case(&category) {
                continue;
            }
            tally.add(material);
            overall.add(material);
            position += 1;

            let unit = material.unit.as_deref().unwrap_or("").trim();
            let quantity = if unit.is_empty() {
                format::number(material.quantity, 3)
            } else {
                format!("{} {unit}", format::number(material.quantity, 3))
            };

            items.push(MaterialRow {
                position,
                name: material.name.trim().to_string(),
                supplier: text(material.supplier.as_deref()),
                composition: text(material.composition.as_deref()),
                color: text(material.color.as_deref()),
                placement: text(material.placement.as_deref()),
                quantity,
                unit_price: material
                    .unit_price
                    .map(|p| format::money(p, currency))
                    .unwrap_or_else(|| format::EMPTY.to_string()),
                line_total: material
                    .unit_price
                    .map(|p| format::money(p * material.quantity, currency))
                    .unwrap_or_else(|| format::EMPTY.to_string()),
                lead_time: material
                    .lead_time_days
                    .map(|d| format!("{d} days"))
                    .unwrap_or_else(|| format::EMPTY.to_string()),
                approved: material.approved,
                image: images.get(idx).cloned().flatten(),
            });
        }

        groups.push(MaterialGroup {
            category,
            unique_suppliers: tally.suppliers.len(),
            approved_count: tally.approved,
            average_lead_time: tally.average_lead_time(),
            subtotal: tally.cost(currency),
            items,
        });
    }

    BomSummary {
        groups,
        material_count: materials.len(),
        unique_suppliers: overall.suppliers.len(),
        approved_count: overall.approved,
        average_lead_time: overall.average_lead_time(),
        total_cost: overall.cost(currency),
    }
}
