//! Category, macro and year roll-ups.
//!
//! Base roll-ups read the totals stored on [`PlanYearData`]; the `effective_*`
//! family reads every cell through a [`CellSource`] so overrides are always
//! reflected. Nothing here is cached.

use crate::hierarchy::{PlanHierarchy, PlanYearData};
use crate::overrides::CellSource;
use crate::schema::{StatsRow, Track};
use crate::utils::{parse_stats_month_label, percent_of, sum_months, MONTHS_PER_YEAR, MONTH_SHORT};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INCASSATO: &str = "INCASSATO";
pub const COSTI_FISSI: &str = "COSTI FISSI";
pub const COSTI_VARIABILI: &str = "COSTI VARIABILI";

type Monthly = [f64; MONTHS_PER_YEAR];

pub fn macro_totals(year_data: &PlanYearData, macro_category: &str, track: Track) -> Monthly {
    year_data
        .totals_for(macro_category)
        .map(|t| *t.track(track))
        .unwrap_or([0.0; MONTHS_PER_YEAR])
}

pub fn year_total(year_data: &PlanYearData, macro_category: &str, track: Track) -> f64 {
    sum_months(&macro_totals(year_data, macro_category, track))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub monthly: Monthly,
    pub annual: f64,
}

impl ProfitSummary {
    fn from_components(
        incassato: &Monthly,
        costi_fissi: &Monthly,
        costi_variabili: &Monthly,
    ) -> Self {
        let monthly: Monthly =
            std::array::from_fn(|m| incassato[m] - costi_fissi[m] - costi_variabili[m]);
        Self {
            monthly,
            annual: sum_months(&monthly),
        }
    }
}

/// Cash profit on the consuntivo track: incassato − costi fissi − costi variabili.
pub fn derive_profit(year_data: &PlanYearData) -> ProfitSummary {
    ProfitSummary::from_components(
        &macro_totals(year_data, INCASSATO, Track::Consuntivo),
        &macro_totals(year_data, COSTI_FISSI, Track::Consuntivo),
        &macro_totals(year_data, COSTI_VARIABILI, Track::Consuntivo),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearMetrics {
    pub fatturato_totale: f64,
    pub monthly_fatturato: Monthly,
    pub incassato: f64,
    pub monthly_incassato: Monthly,
    pub costi_fissi: f64,
    pub monthly_costi_fissi: Monthly,
    pub costi_variabili: f64,
    pub monthly_costi_variabili: Monthly,
}

impl YearMetrics {
    fn empty() -> Self {
        Self {
            fatturato_totale: 0.0,
            monthly_fatturato: [0.0; MONTHS_PER_YEAR],
            incassato: 0.0,
            monthly_incassato: [0.0; MONTHS_PER_YEAR],
            costi_fissi: 0.0,
            monthly_costi_fissi: [0.0; MONTHS_PER_YEAR],
            costi_variabili: 0.0,
            monthly_costi_variabili: [0.0; MONTHS_PER_YEAR],
        }
    }

    fn from_year(year_data: &PlanYearData) -> Self {
        let incassato = macro_totals(year_data, INCASSATO, Track::Consuntivo);
        let costi_fissi = macro_totals(year_data, COSTI_FISSI, Track::Consuntivo);
        let costi_variabili = macro_totals(year_data, COSTI_VARIABILI, Track::Consuntivo);

        Self {
            incassato: sum_months(&incassato),
            monthly_incassato: incassato,
            costi_fissi: sum_months(&costi_fissi),
            monthly_costi_fissi: costi_fissi,
            costi_variabili: sum_months(&costi_variabili),
            monthly_costi_variabili: costi_variabili,
            ..Self::empty()
        }
    }

    pub fn utile(&self) -> f64 {
        self.incassato - self.costi_fissi - self.costi_variabili
    }

    pub fn monthly_utile(&self) -> Monthly {
        ProfitSummary::from_components(
            &self.monthly_incassato,
            &self.monthly_costi_fissi,
            &self.monthly_costi_variabili,
        )
        .monthly
    }

    pub fn incassato_percent(&self) -> f64 {
        percent_of(self.incassato, self.fatturato_totale)
    }

    pub fn costi_fissi_percent(&self) -> f64 {
        percent_of(self.costi_fissi, self.incassato)
    }

    pub fn costi_variabili_percent(&self) -> f64 {
        percent_of(self.costi_variabili, self.incassato)
    }

    pub fn utile_percent(&self) -> f64 {
        percent_of(self.utile(), self.incassato)
    }
}

/// Per-year metrics from the base hierarchy, with fatturato taken from the
/// statistics rows. Years that only appear in the statistics still get an entry.
pub fn compute_year_metrics(
    hierarchy: &PlanHierarchy,
    stats_rows: &[StatsRow],
) -> BTreeMap<i32, YearMetrics> {
    let mut metrics: BTreeMap<i32, YearMetrics> = hierarchy
        .iter()
        .map(|(year, data)| (*year, YearMetrics::from_year(data)))
        .collect();

    for row in stats_rows {
        let Some((year, month_index)) = parse_stats_month_label(&row.month) else {
            debug!("Ignoring statistics row with unparseable month '{}'", row.month);
            continue;
        };
        let fatturato = row.fatturato_totale.unwrap_or(0.0);
        let entry = metrics.entry(year).or_insert_with(YearMetrics::empty);
        entry.fatturato_totale += fatturato;
        entry.monthly_fatturato[month_index] += fatturato;
    }

    metrics
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    pub incassato: f64,
    pub costi_fissi: f64,
    pub costi_variabili: f64,
    pub utile: f64,
}

pub fn overview_totals(year_data: Option<&PlanYearData>) -> OverviewTotals {
    let Some(year_data) = year_data else {
        return OverviewTotals::default();
    };
    let incassato = year_total(year_data, INCASSATO, Track::Consuntivo);
    let costi_fissi = year_total(year_data, COSTI_FISSI, Track::Consuntivo);
    let costi_variabili = year_total(year_data, COSTI_VARIABILI, Track::Consuntivo);
    OverviewTotals {
        incassato,
        costi_fissi,
        costi_variabili,
        utile: incassato - costi_fissi - costi_variabili,
    }
}

/// One month of the overview chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewPoint {
    pub month_index: usize,
    pub label: String,
    pub incassato: f64,
    pub costi_fissi: f64,
    pub costi_variabili: f64,
    pub utile: f64,
}

pub fn overview_series(year_data: &PlanYearData) -> Vec<OverviewPoint> {
    let incassato = macro_totals(year_data, INCASSATO, Track::Consuntivo);
    let costi_fissi = macro_totals(year_data, COSTI_FISSI, Track::Consuntivo);
    let costi_variabili = macro_totals(year_data, COSTI_VARIABILI, Track::Consuntivo);
    let short_year = year_data.year.rem_euclid(100);

    MONTH_SHORT
        .iter()
        .enumerate()
        .map(|(idx, name)| OverviewPoint {
            month_index: idx,
            label: format!("{} {:02}", name, short_year),
            incassato: incassato[idx],
            costi_fissi: costi_fissi[idx],
            costi_variabili: costi_variabili[idx],
            utile: incassato[idx] - costi_fissi[idx] - costi_variabili[idx],
        })
        .collect()
}

/// Sum of every causale the base lists under `category`, read through `source`.
pub fn category_subtotal<S: CellSource>(
    source: &S,
    year_data: &PlanYearData,
    macro_category: &str,
    category: &str,
    track: Track,
) -> Monthly {
    let mut totals = [0.0; MONTHS_PER_YEAR];
    let Some(block) = year_data.macro_block(macro_category) else {
        return totals;
    };
    for detail in block.details_in_category(category) {
        for (month_index, total) in totals.iter_mut().enumerate() {
            *total += source.cell(
                track,
                &block.macro_category,
                &detail.category,
                &detail.detail,
                year_data.year,
                month_index,
            );
        }
    }
    totals
}

pub fn effective_macro_totals<S: CellSource>(
    source: &S,
    year_data: &PlanYearData,
    macro_category: &str,
    track: Track,
) -> Monthly {
    let mut totals = [0.0; MONTHS_PER_YEAR];
    let Some(block) = year_data.macro_block(macro_category) else {
        return totals;
    };
    for detail in &block.details {
        for (month_index, total) in totals.iter_mut().enumerate() {
            *total += source.cell(
                track,
                &block.macro_category,
                &detail.category,
                &detail.detail,
                year_data.year,
                month_index,
            );
        }
    }
    totals
}

pub fn effective_profit<S: CellSource>(source: &S, year_data: &PlanYearData) -> ProfitSummary {
    ProfitSummary::from_components(
        &effective_macro_totals(source, year_data, INCASSATO, Track::Consuntivo),
        &effective_macro_totals(source, year_data, COSTI_FISSI, Track::Consuntivo),
        &effective_macro_totals(source, year_data, COSTI_VARIABILI, Track::Consuntivo),
    )
}

/// Whether any month of the row holds a non-zero value on either track.
pub fn row_has_any_value<S: CellSource>(
    source: &S,
    macro_category: &str,
    category: &str,
    detail: &str,
    year: i32,
) -> bool {
    (0..MONTHS_PER_YEAR).any(|month_index| {
        Track::ALL.iter().any(|track| {
            source.cell(*track, macro_category, category, detail, year, month_index) != 0.0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CausaliCatalog;
    use crate::hierarchy::build_hierarchy;
    use crate::overrides::{OverrideOverlay, PlanView};
    use crate::schema::{RawMonthValue, RawPlanRow};

    const CAT_FISSI: &str = "Rete vendita, Amministratori, Immobili";

    fn row(macro_category: &str, detail: &str, months: &[(&str, f64)]) -> RawPlanRow {
        RawPlanRow {
            macro_category: macro_category.to_string(),
            detail: detail.to_string(),
            months: months
                .iter()
                .map(|(label, value)| RawMonthValue {
                    month: label.to_string(),
                    preventivo: None,
                    consuntivo: Some(*value),
                })
                .collect(),
        }
    }

    fn sample() -> PlanHierarchy {
        let rows = vec![
            row("INCASSATO", "Incassato", &[("Gennaio 2025", 5000.0), ("Febbraio 2025", 4000.0)]),
            row("COSTI FISSI", "Affitto", &[("Gennaio 2025", 1000.0), ("Febbraio 2025", 1000.0)]),
            row("COSTI FISSI", "Enasarco", &[("Gennaio 2025", 200.0)]),
            row("COSTI VARIABILI", "Freelance", &[("Febbraio 2025", 500.0)]),
        ];
        build_hierarchy(&rows, &CausaliCatalog::builtin(), None)
    }

    #[test]
    fn test_totals_equal_sum_of_details() {
        let hierarchy = sample();
        for (_, year_data) in hierarchy.iter() {
            for block in &year_data.macros {
                for track in Track::ALL {
                    let totals = macro_totals(year_data, &block.macro_category, track);
                    for month in 0..MONTHS_PER_YEAR {
                        let expected: f64 = block
                            .details
                            .iter()
                            .map(|d| d.months[month].value(track))
                            .sum();
                        assert!((totals[month] - expected).abs() < 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_year_total_and_profit() {
        let hierarchy = sample();
        let year = hierarchy.get(2025).unwrap();

        assert_eq!(year_total(year, COSTI_FISSI, Track::Consuntivo), 2200.0);
        assert_eq!(year_total(year, "NON ESISTE", Track::Consuntivo), 0.0);

        let profit = derive_profit(year);
        assert_eq!(profit.monthly[0], 5000.0 - 1200.0);
        assert_eq!(profit.monthly[1], 4000.0 - 1000.0 - 500.0);
        assert_eq!(profit.annual, 9000.0 - 2200.0 - 500.0);

        let totals = overview_totals(Some(year));
        assert_eq!(totals.utile, profit.annual);
        assert_eq!(overview_totals(None), OverviewTotals::default());
    }

    #[test]
    fn test_percentages_guard_zero_incassato() {
        let rows = vec![row("COSTI FISSI", "Affitto", &[("Gennaio 2025", 1000.0)])];
        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let metrics = compute_year_metrics(&hierarchy, &[]);
        let m = metrics.get(&2025).unwrap();

        assert_eq!(m.incassato, 0.0);
        assert_eq!(m.costi_fissi_percent(), 0.0);
        assert_eq!(m.utile_percent(), 0.0);
        assert_eq!(m.incassato_percent(), 0.0);
        assert!(!m.costi_fissi_percent().is_nan());
    }

    #[test]
    fn test_year_metrics_with_stats() {
        let hierarchy = sample();
        let stats = vec![
            StatsRow {
                month: "Gen. 25".to_string(),
                fatturato_totale: Some(6000.0),
                ..Default::default()
            },
            StatsRow {
                month: "Feb. 25".to_string(),
                fatturato_totale: Some(4000.0),
                ..Default::default()
            },
            StatsRow {
                month: "Gen. 24".to_string(),
                fatturato_totale: Some(100.0),
                ..Default::default()
            },
            StatsRow {
                month: "garbage".to_string(),
                fatturato_totale: Some(1.0),
                ..Default::default()
            },
        ];

        let metrics = compute_year_metrics(&hierarchy, &stats);
        let m = metrics.get(&2025).unwrap();
        assert_eq!(m.fatturato_totale, 10000.0);
        assert_eq!(m.monthly_fatturato[1], 4000.0);
        assert_eq!(m.incassato, 9000.0);
        assert_eq!(m.incassato_percent(), 90.0);
        assert_eq!(m.costi_fissi_percent(), 2200.0 / 9000.0 * 100.0);
        assert_eq!(m.monthly_utile()[0], 3800.0);

        let only_stats = metrics.get(&2024).unwrap();
        assert_eq!(only_stats.fatturato_totale, 100.0);
        assert_eq!(only_stats.incassato, 0.0);
    }

    #[test]
    fn test_overview_series_labels() {
        let hierarchy = sample();
        let series = overview_series(hierarchy.get(2025).unwrap());
        assert_eq!(series.len(), 12);
        assert_eq!(series[0].label, "Gen 25");
        assert_eq!(series[0].utile, 3800.0);
        assert_eq!(series[11].label, "Dic 25");
        assert_eq!(series[11].incassato, 0.0);
    }

    #[test]
    fn test_effective_rollups_follow_overrides() {
        let hierarchy = sample();
        let year = hierarchy.get(2025).unwrap();
        let mut overlay = OverrideOverlay::default();
        overlay
            .write(Track::Consuntivo, "COSTI FISSI", CAT_FISSI, "Affitto", 2025, 0, Some(1500.0))
            .unwrap();
        let view = PlanView::new(&hierarchy, &overlay);

        let subtotal = category_subtotal(&view, year, COSTI_FISSI, CAT_FISSI, Track::Consuntivo);
        assert_eq!(subtotal[0], 1700.0);

        // base totals are unaffected by the overlay
        assert_eq!(macro_totals(year, COSTI_FISSI, Track::Consuntivo)[0], 1200.0);

        let profit = effective_profit(&view, year);
        assert_eq!(profit.monthly[0], 5000.0 - 1700.0);
        assert_eq!(effective_profit(&hierarchy, year), derive_profit(year));
    }

    #[test]
    fn test_row_has_any_value() {
        let hierarchy = sample();
        let mut overlay = OverrideOverlay::default();
        let view = PlanView::new(&hierarchy, &overlay);
        assert!(row_has_any_value(&view, "COSTI FISSI", CAT_FISSI, "Affitto", 2025));
        assert!(!row_has_any_value(&view, "COSTI FISSI", CAT_FISSI, "Rimborsi spese", 2025));

        overlay
            .write(
                Track::Preventivo,
                "COSTI FISSI",
                CAT_FISSI,
                "Rimborsi spese",
                2025,
                5,
                Some(10.0),
            )
            .unwrap();
        let view = PlanView::new(&hierarchy, &overlay);
        assert!(row_has_any_value(&view, "COSTI FISSI", CAT_FISSI, "Rimborsi spese", 2025));
    }
}
