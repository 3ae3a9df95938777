use crate::rollup::YearMetrics;
use crate::utils::{percent_of, round2, safe_ratio, MONTHS_PER_YEAR};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A projected plan for `target_year`, seeded from the actuals of `base_year`.
/// Amounts are rounded to cents, percentages to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPlanDraft {
    pub base_year: i32,
    pub target_year: i32,
    #[schemars(description = "Percentage growth applied to the base year's fatturato")]
    pub fatturato_increment: f64,
    pub fatturato_previsionale: f64,
    #[schemars(description = "Incassato as a percentage of fatturato")]
    pub incassato_percent: f64,
    pub incassato_previsionale: f64,
    #[schemars(description = "Fixed costs as a percentage of incassato")]
    pub costi_fissi_percent: f64,
    pub costi_fissi_previsionale: f64,
    #[schemars(description = "Variable costs as a percentage of incassato")]
    pub costi_variabili_percent: f64,
    pub costi_variabili_previsionale: f64,
}

/// Drafts keyed by target year.
pub type BusinessPlanDrafts = BTreeMap<String, BusinessPlanDraft>;

impl BusinessPlanDraft {
    pub fn from_metrics(metrics: Option<&YearMetrics>, base_year: i32, target_year: i32) -> Self {
        let Some(metrics) = metrics else {
            return Self {
                base_year,
                target_year,
                fatturato_increment: 0.0,
                fatturato_previsionale: 0.0,
                incassato_percent: 0.0,
                incassato_previsionale: 0.0,
                costi_fissi_percent: 0.0,
                costi_fissi_previsionale: 0.0,
                costi_variabili_percent: 0.0,
                costi_variabili_previsionale: 0.0,
            };
        };

        Self {
            base_year,
            target_year,
            fatturato_increment: 0.0,
            fatturato_previsionale: round2(metrics.fatturato_totale),
            incassato_percent: round2(metrics.incassato_percent()),
            incassato_previsionale: round2(metrics.incassato),
            costi_fissi_percent: round2(metrics.costi_fissi_percent()),
            costi_fissi_previsionale: round2(metrics.costi_fissi),
            costi_variabili_percent: round2(metrics.costi_variabili_percent()),
            costi_variabili_previsionale: round2(metrics.costi_variabili),
        }
    }

    /// Grows the base fatturato by `increment_percent` and re-derives the
    /// dependent amounts from the draft's percentages.
    #[must_use]
    pub fn with_increment(mut self, base_fatturato: f64, increment_percent: f64) -> Self {
        self.fatturato_increment = round2(increment_percent);
        self.fatturato_previsionale = round2(base_fatturato * (1.0 + increment_percent / 100.0));
        self.incassato_previsionale =
            round2(self.fatturato_previsionale * self.incassato_percent / 100.0);
        self.costi_fissi_previsionale =
            round2(self.incassato_previsionale * self.costi_fissi_percent / 100.0);
        self.costi_variabili_previsionale =
            round2(self.incassato_previsionale * self.costi_variabili_percent / 100.0);
        self
    }

    pub fn utile_previsionale(&self) -> f64 {
        round2(
            self.incassato_previsionale
                - self.costi_fissi_previsionale
                - self.costi_variabili_previsionale,
        )
    }

    pub fn utile_percent(&self) -> f64 {
        round2(percent_of(self.utile_previsionale(), self.incassato_previsionale))
    }
}

/// Each value's share of the total; an all-zero input is split evenly.
pub fn calc_ratios(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let total: f64 = values.iter().sum();
    if total == 0.0 {
        return vec![1.0 / values.len() as f64; values.len()];
    }
    values.iter().map(|v| safe_ratio(*v, total)).collect()
}

/// Spreads `annual` over the months following the shape of `base_monthly`.
pub fn monthly_projection(
    annual: f64,
    base_monthly: &[f64; MONTHS_PER_YEAR],
) -> [f64; MONTHS_PER_YEAR] {
    let ratios = calc_ratios(base_monthly);
    std::array::from_fn(|m| round2(annual * ratios[m]))
}
