use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ExportError, Result};

/// A product specification record as handed over by the storage layer.
///
/// The export pipeline only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub code: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    pub modified_at: DateTime<Utc>,
    pub product: Product,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub measurements: MeasurementTable,
    #[serde(default)]
    pub fit_rounds: Vec<FitRound>,
    #[serde(default)]
    pub colorways: Vec<Colorway>,
    #[serde(default)]
    pub construction_steps: Vec<ConstructionStep>,
    #[serde(default)]
    pub care: CareInstructions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub name: String,
    pub season: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub designer: Option<String>,
    pub status: Option<String>,
    /// ISO 4217 code; amounts without it are shown in USD.
    pub currency: Option<String>,
    pub target_price: Option<f64>,
    /// Main sketch or flat drawing.
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Material {
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub composition: Option<String>,
    pub color: Option<String>,
    pub placement: Option<String>,
    pub quantity: f64,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub lead_time_days: Option<u32>,
    pub approved: bool,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeasurementTable {
    pub base_size: Option<String>,
    pub unit: Option<String>,
    /// Declared size columns; sizes only present in point values are added.
    pub sizes: Vec<String>,
    pub points: Vec<MeasurementPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeasurementPoint {
    pub code: String,
    pub name: String,
    pub tolerance: Option<f64>,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitRound {
    pub round: u32,
    pub date: Option<NaiveDate>,
    pub size: Option<String>,
    pub comments: Option<String>,
    pub entries: Vec<FitEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitEntry {
    /// Measurement point code this entry refers to.
    pub point: String,
    pub requested: f64,
    pub measured: Option<f64>,
    pub diff: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Colorway {
    pub name: String,
    pub code: Option<String>,
    pub hex: Option<String>,
    pub pantone: Option<String>,
    pub image: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConstructionStep {
    pub step: Option<u32>,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CareInstructions {
    pub washing: Vec<String>,
    pub symbols: Vec<String>,
    pub notes: Option<String>,
}

impl CareInstructions {
    pub fn is_empty(&self) -> bool {
        self.washing.is_empty()
            && self.symbols.is_empty()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

impl DocumentRecord {
    /// Load a record from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Record(format!("failed to read {}: {e}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let record: DocumentRecord = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        record.check()?;
        Ok(record)
    }

    pub fn check(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ExportError::Record("record id must not be empty".into()));
        }
        if self.code.trim().is_empty() {
            return Err(ExportError::Record(format!(
                "record {} has an empty code",
                self.id
            )));
        }
        Ok(())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}
