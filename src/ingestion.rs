use crate::schema::{RawMonthValue, RawPlanRow};
use crate::utils::normalize_label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One cell of an exported plan sheet, one line per causale and month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPlanRecord {
    pub macro_category: String,
    pub detail: String,
    /// "Gennaio 2025" style label.
    pub month: String,
    #[serde(default)]
    pub preventivo: Option<f64>,
    #[serde(default)]
    pub consuntivo: Option<f64>,
}

/// Groups flat records into plan rows, one per macro category and causale.
/// Causali are compared as written; only the macro category is normalized.
///
/// Rows keep the order in which each causale first appears; months keep
/// their input order so the builder's last-write-wins rule still applies.
pub fn convert_records_to_rows(records: &[FlatPlanRecord]) -> Vec<RawPlanRow> {
    let mut rows: Vec<RawPlanRow> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for record in records {
        let key = (normalize_label(&record.macro_category), record.detail.clone());
        let idx = *positions.entry(key).or_insert_with(|| {
            rows.push(RawPlanRow {
                macro_category: record.macro_category.trim().to_string(),
                detail: record.detail.clone(),
                months: Vec::new(),
            });
            rows.len() - 1
        });

        rows[idx].months.push(RawMonthValue {
            month: record.month.clone(),
            preventivo: record.preventivo,
            consuntivo: record.consuntivo,
        });
    }

    rows
}
