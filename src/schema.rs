use crate::catalog::CausaleGroup;
use crate::overrides::PlanOverrides;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the two parallel value tracks carried by every plan cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    #[schemars(description = "Planned / budgeted value")]
    Preventivo,

    #[schemars(description = "Actual / realized value")]
    Consuntivo,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Preventivo, Track::Consuntivo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Preventivo => "preventivo",
            Track::Consuntivo => "consuntivo",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawMonthValue {
    #[schemars(description = "Free-text month label, e.g. 'GENNAIO 2025'")]
    pub month: String,

    #[serde(default)]
    pub preventivo: Option<f64>,

    #[serde(default)]
    pub consuntivo: Option<f64>,
}

/// A source row as produced by the spreadsheet export: one causale with its
/// monthly values, tagged with the macro category of the sheet it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawPlanRow {
    pub macro_category: String,
    pub detail: String,
    #[serde(default)]
    pub months: Vec<RawMonthValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    #[schemars(description = "Month label as written in the statistics sheet, e.g. 'Gen. 24'")]
    pub month: String,
    #[serde(default)]
    pub fatturato_imponibile: Option<f64>,
    #[serde(default)]
    pub fatturato_totale: Option<f64>,
    #[serde(default)]
    pub fatturato_previsionale: Option<f64>,
    #[serde(default)]
    pub utile_cassa: Option<f64>,
    #[serde(default)]
    pub utile_previsionale: Option<f64>,
    #[serde(default)]
    pub incassato: Option<f64>,
    #[serde(default)]
    pub incassato_previsionale: Option<f64>,
    #[serde(default)]
    pub saldo_conto: Option<f64>,
    #[serde(default)]
    pub saldo_secondo_conto: Option<f64>,
    #[serde(default)]
    pub saldo_totale: Option<f64>,
    #[serde(default)]
    pub crediti_pendenti: Option<f64>,
    #[serde(default)]
    pub crediti_scaduti: Option<f64>,
    #[serde(default)]
    pub debiti_fornitore: Option<f64>,
    #[serde(default)]
    pub debiti_bancari: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverride {
    #[serde(default)]
    pub fatturato_previsionale: Option<f64>,
    #[serde(default)]
    pub incassato_previsionale: Option<f64>,
    #[serde(default)]
    pub utile_previsionale: Option<f64>,
}

/// Forecast overrides for the statistics view, keyed by `"YYYY-MM"`.
pub type StatsOverrides = BTreeMap<String, StatsOverride>;

/// One overridden cell of the selected year, written to the manual log on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub year: i32,
    #[schemars(description = "Calendar month, 1 = January")]
    pub month: u32,
    pub macro_category: String,
    pub category: String,
    pub causale: String,
    pub value: f64,
}

/// State returned by the store on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatePayload {
    #[serde(default)]
    pub preventivo_overrides: PlanOverrides,
    #[serde(default)]
    pub consuntivo_overrides: PlanOverrides,
    #[serde(default)]
    pub stats_overrides: StatsOverrides,
    #[serde(default)]
    pub causali_catalog: Vec<CausaleGroup>,
    #[serde(default)]
    pub causali_version: Option<String>,
}

/// State handed to the store on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    #[serde(default)]
    pub preventivo_overrides: PlanOverrides,
    #[serde(default)]
    pub consuntivo_overrides: PlanOverrides,
    #[schemars(description = "Audit entries for every overridden cell of the saved year")]
    #[serde(default)]
    pub manual_log: Vec<AuditEntry>,
    #[serde(default)]
    pub monthly_metrics: Vec<serde_json::Value>,
    #[serde(default)]
    pub stats_overrides: StatsOverrides,
    #[serde(default)]
    pub causali_catalog: Vec<CausaleGroup>,
    #[serde(default)]
    pub causali_version: Option<String>,
}

impl From<SavePayload> for PlanStatePayload {
    fn from(saved: SavePayload) -> Self {
        Self {
            preventivo_overrides: saved.preventivo_overrides,
            consuntivo_overrides: saved.consuntivo_overrides,
            stats_overrides: saved.stats_overrides,
            causali_catalog: saved.causali_catalog,
            causali_version: saved.causali_version,
        }
    }
}

impl PlanStatePayload {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PlanStatePayload)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

impl SavePayload {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SavePayload)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = SavePayload::schema_as_json().unwrap();
        assert!(schema_json.contains("preventivoOverrides"));
        assert!(schema_json.contains("manualLog"));
        assert!(schema_json.contains("causaliVersion"));

        let load_schema = PlanStatePayload::schema_as_json().unwrap();
        assert!(load_schema.contains("consuntivoOverrides"));
        assert!(!load_schema.contains("manualLog"));
    }

    #[test]
    fn test_raw_row_deserialization_with_nulls() {
        let json = r#"{
            "macroCategory": "INCASSATO",
            "detail": "INCASSATO",
            "months": [
                { "month": "OTTOBRE 2025", "preventivo": null, "consuntivo": 1500.0 },
                { "month": "NOVEMBRE 2025" }
            ]
        }"#;

        let row: RawPlanRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.macro_category, "INCASSATO");
        assert_eq!(row.months.len(), 2);
        assert_eq!(row.months[0].preventivo, None);
        assert_eq!(row.months[0].consuntivo, Some(1500.0));
        assert_eq!(row.months[1].consuntivo, None);
    }

    #[test]
    fn test_load_payload_tolerates_missing_fields() {
        let payload: PlanStatePayload =
            serde_json::from_str(r#"{"causaliVersion": "v3"}"#).unwrap();
        assert!(payload.preventivo_overrides.is_empty());
        assert!(payload.causali_catalog.is_empty());
        assert_eq!(payload.causali_version.as_deref(), Some("v3"));
    }

    #[test]
    fn test_track_serialization() {
        assert_eq!(serde_json::to_string(&Track::Preventivo).unwrap(), "\"preventivo\"");
        assert_eq!(Track::Consuntivo.to_string(), "consuntivo");
    }
}
