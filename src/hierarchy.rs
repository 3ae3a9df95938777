use crate::catalog::CausaliCatalog;
use crate::config::EngineConfig;
use crate::schema::{RawPlanRow, Track};
use crate::utils::{normalize_label, parse_plan_month_label, MONTHS_PER_YEAR};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthValue {
    pub month_index: usize,
    pub preventivo: f64,
    pub consuntivo: f64,
}

impl MonthValue {
    fn zero(month_index: usize) -> Self {
        Self {
            month_index,
            preventivo: 0.0,
            consuntivo: 0.0,
        }
    }

    pub fn value(&self, track: Track) -> f64 {
        match track {
            Track::Preventivo => self.preventivo,
            Track::Consuntivo => self.consuntivo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub macro_category: String,
    pub category: String,
    pub detail: String,
    pub months: [MonthValue; MONTHS_PER_YEAR],
}

impl DetailRow {
    fn empty(macro_category: &str, category: &str, detail: &str) -> Self {
        Self {
            macro_category: macro_category.to_string(),
            category: category.to_string(),
            detail: detail.to_string(),
            months: std::array::from_fn(MonthValue::zero),
        }
    }

    pub fn values(&self, track: Track) -> [f64; MONTHS_PER_YEAR] {
        std::array::from_fn(|m| self.months[m].value(track))
    }

    fn matches(&self, category: &str, detail: &str) -> bool {
        self.category == category && normalize_label(&self.detail) == normalize_label(detail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroBlock {
    pub macro_category: String,
    pub details: Vec<DetailRow>,
}

impl MacroBlock {
    pub fn details_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DetailRow> + 'a {
        self.details.iter().filter(move |d| d.category == category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTotals {
    pub consuntivo: [f64; MONTHS_PER_YEAR],
    pub preventivo: [f64; MONTHS_PER_YEAR],
}

impl TrackTotals {
    fn zero() -> Self {
        Self {
            consuntivo: [0.0; MONTHS_PER_YEAR],
            preventivo: [0.0; MONTHS_PER_YEAR],
        }
    }

    pub fn track(&self, track: Track) -> &[f64; MONTHS_PER_YEAR] {
        match track {
            Track::Preventivo => &self.preventivo,
            Track::Consuntivo => &self.consuntivo,
        }
    }
}

/// One year of the plan. Built once per (rows, catalog) pair and never edited
/// in place; `totals` always equals the per-month sum of each macro's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanYearData {
    pub year: i32,
    pub macros: Vec<MacroBlock>,
    pub totals: BTreeMap<String, TrackTotals>,
}

impl PlanYearData {
    fn from_macros(year: i32, macros: Vec<MacroBlock>) -> Self {
        let mut totals = BTreeMap::new();
        for block in &macros {
            let entry = totals
                .entry(block.macro_category.clone())
                .or_insert_with(TrackTotals::zero);
            for detail in &block.details {
                for month in &detail.months {
                    entry.consuntivo[month.month_index] += month.consuntivo;
                    entry.preventivo[month.month_index] += month.preventivo;
                }
            }
        }
        Self {
            year,
            macros,
            totals,
        }
    }

    pub fn macro_block(&self, macro_category: &str) -> Option<&MacroBlock> {
        let wanted = normalize_label(macro_category);
        self.macros
            .iter()
            .find(|m| normalize_label(&m.macro_category) == wanted)
    }

    pub fn totals_for(&self, macro_category: &str) -> Option<&TrackTotals> {
        let wanted = normalize_label(macro_category);
        self.totals
            .iter()
            .find(|(name, _)| normalize_label(name) == wanted)
            .map(|(_, totals)| totals)
    }

    pub fn detail(
        &self,
        macro_category: &str,
        category: &str,
        detail: &str,
    ) -> Option<&DetailRow> {
        self.macro_block(macro_category)?
            .details
            .iter()
            .find(|d| d.matches(category, detail))
    }

    /// Base value of a single cell; a missing row or month reads as 0.
    pub fn base_value(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_index: usize,
    ) -> f64 {
        self.detail(macro_category, category, detail)
            .and_then(|row| row.months.get(month_index))
            .map(|m| m.value(track))
            .unwrap_or(0.0)
    }

    pub fn detail_count(&self) -> usize {
        self.macros.iter().map(|m| m.details.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanHierarchy {
    years: BTreeMap<i32, PlanYearData>,
}

impl PlanHierarchy {
    pub fn get(&self, year: i32) -> Option<&PlanYearData> {
        self.years.get(&year)
    }

    /// Years present in the data, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.years.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &PlanYearData)> {
        self.years.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }
}

// Per-year accumulator. Maps preserve first-seen order of macros and rows.
#[derive(Default)]
struct YearAccumulator {
    macros: Vec<MacroBlock>,
    macro_index: HashMap<String, usize>,
    detail_index: HashMap<(usize, String, String), usize>,
}

impl YearAccumulator {
    fn detail_mut(&mut self, macro_category: &str, category: &str, detail: &str) -> &mut DetailRow {
        let macro_key = normalize_label(macro_category);
        let macro_idx = match self.macro_index.get(&macro_key) {
            Some(idx) => *idx,
            None => {
                self.macros.push(MacroBlock {
                    macro_category: macro_category.to_string(),
                    details: Vec::new(),
                });
                let idx = self.macros.len() - 1;
                self.macro_index.insert(macro_key, idx);
                idx
            }
        };

        let detail_key = (macro_idx, category.to_string(), detail.to_string());
        let details = &mut self.macros[macro_idx].details;
        let detail_idx = *self.detail_index.entry(detail_key).or_insert_with(|| {
            details.push(DetailRow::empty(macro_category, category, detail));
            details.len() - 1
        });

        &mut self.macros[macro_idx].details[detail_idx]
    }
}

/// Folds raw monthly rows into the year → macro → (category, causale) → month
/// hierarchy.
pub struct HierarchyBuilder {
    year_filter: Option<i32>,
}

impl HierarchyBuilder {
    pub fn new(year_filter: Option<i32>) -> Self {
        Self { year_filter }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.year_filter)
    }

    /// Builds the hierarchy.
    ///
    /// Unparseable month labels are skipped. When the same causale appears more
    /// than once for a month, the later value replaces the earlier one. A
    /// missing `preventivo` takes the row's `consuntivo` (or 0).
    pub fn build(&self, rows: &[RawPlanRow], catalog: &CausaliCatalog) -> PlanHierarchy {
        let mut years: BTreeMap<i32, YearAccumulator> = BTreeMap::new();
        let mut skipped = 0usize;

        for row in rows {
            let meta = catalog.classify(&row.detail, &row.macro_category);

            for month_value in &row.months {
                let Some((year, month_index)) = parse_plan_month_label(&month_value.month) else {
                    warn!(
                        "Skipping unparseable month label '{}' for causale '{}'",
                        month_value.month, row.detail
                    );
                    skipped += 1;
                    continue;
                };

                if self.year_filter.is_some_and(|wanted| wanted != year) {
                    continue;
                }

                let consuntivo = month_value.consuntivo.unwrap_or(0.0);
                let preventivo = month_value
                    .preventivo
                    .or(month_value.consuntivo)
                    .unwrap_or(0.0);

                let detail = years.entry(year).or_default().detail_mut(
                    &meta.macro_category,
                    &meta.category,
                    &row.detail,
                );
                detail.months[month_index] = MonthValue {
                    month_index,
                    consuntivo,
                    preventivo,
                };
            }
        }

        let years: BTreeMap<i32, PlanYearData> = years
            .into_iter()
            .map(|(year, acc)| (year, PlanYearData::from_macros(year, acc.macros)))
            .collect();

        info!(
            "Built plan hierarchy: {} year(s), {} detail row(s)",
            years.len(),
            years.values().map(PlanYearData::detail_count).sum::<usize>()
        );
        if skipped > 0 {
            debug!("{} month value(s) skipped due to unparseable labels", skipped);
        }

        PlanHierarchy { years }
    }
}

pub fn build_hierarchy(
    rows: &[RawPlanRow],
    catalog: &CausaliCatalog,
    year_filter: Option<i32>,
) -> PlanHierarchy {
    HierarchyBuilder::new(year_filter).build(rows, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawMonthValue;

    fn month(label: &str, preventivo: Option<f64>, consuntivo: Option<f64>) -> RawMonthValue {
        RawMonthValue {
            month: label.to_string(),
            preventivo,
            consuntivo,
        }
    }

    fn row(macro_category: &str, detail: &str, months: Vec<RawMonthValue>) -> RawPlanRow {
        RawPlanRow {
            macro_category: macro_category.to_string(),
            detail: detail.to_string(),
            months,
        }
    }

    #[test]
    fn test_sparse_rows_get_twelve_slots() {
        let rows = vec![row(
            "COSTI FISSI",
            "Affitto",
            vec![month("Marzo 2025", Some(800.0), Some(1000.0))],
        )];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        let detail = year
            .detail("COSTI FISSI", "Rete vendita, Amministratori, Immobili", "Affitto")
            .unwrap();

        assert_eq!(detail.months.len(), 12);
        for (idx, m) in detail.months.iter().enumerate() {
            assert_eq!(m.month_index, idx);
        }
        assert_eq!(detail.months[2].consuntivo, 1000.0);
        assert_eq!(detail.months[2].preventivo, 800.0);
        assert_eq!(detail.months[0].consuntivo, 0.0);
    }

    #[test]
    fn test_preventivo_defaults_to_consuntivo() {
        let rows = vec![row(
            "INCASSATO",
            "Incassato",
            vec![
                month("Gennaio 2025", None, Some(120.50)),
                month("Febbraio 2025", None, None),
            ],
        )];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        assert_eq!(
            year.base_value(Track::Preventivo, "INCASSATO", "Incassato", "Incassato", 0),
            120.50
        );
        assert_eq!(
            year.base_value(Track::Preventivo, "INCASSATO", "Incassato", "Incassato", 1),
            0.0
        );
    }

    #[test]
    fn test_repeated_rows_are_last_write_wins() {
        let rows = vec![
            row("COSTI FISSI", "Affitto", vec![month("Gennaio 2025", Some(1.0), Some(100.0))]),
            row("COSTI FISSI", "Affitto", vec![month("Gennaio 2025", Some(2.0), Some(200.0))]),
        ];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        let block = year.macro_block("COSTI FISSI").unwrap();
        assert_eq!(block.details.len(), 1);
        assert_eq!(block.details[0].months[0].consuntivo, 200.0);
        assert_eq!(block.details[0].months[0].preventivo, 2.0);
        assert_eq!(year.totals_for("COSTI FISSI").unwrap().consuntivo[0], 200.0);
    }

    #[test]
    fn test_different_spellings_stay_separate_rows() {
        let rows = vec![
            row("COSTI FISSI", "Affitto", vec![month("Gennaio 2025", None, Some(100.0))]),
            row("COSTI FISSI", "AFFITTO ", vec![month("Gennaio 2025", None, Some(200.0))]),
        ];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        let block = year.macro_block("COSTI FISSI").unwrap();
        assert_eq!(block.details.len(), 2);
        assert_eq!(year.totals_for("COSTI FISSI").unwrap().consuntivo[0], 300.0);

        // reads still match on the normalized label and hit the first row
        assert_eq!(
            year.base_value(
                Track::Consuntivo,
                "COSTI FISSI",
                "Rete vendita, Amministratori, Immobili",
                "affitto",
                0
            ),
            100.0
        );
    }

    #[test]
    fn test_distinct_details_in_same_category_stay_distinct() {
        let rows = vec![
            row("COSTI FISSI", "Affitto", vec![month("Gennaio 2025", None, Some(100.0))]),
            row("COSTI FISSI", "Enasarco", vec![month("Gennaio 2025", None, Some(50.0))]),
        ];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        let block = year.macro_block("COSTI FISSI").unwrap();
        assert_eq!(block.details.len(), 2);
        assert_eq!(
            block
                .details_in_category("Rete vendita, Amministratori, Immobili")
                .count(),
            2
        );
        assert_eq!(year.totals_for("costi fissi").unwrap().consuntivo[0], 150.0);
    }

    #[test]
    fn test_unparseable_labels_are_skipped() {
        let rows = vec![row(
            "INCASSATO",
            "Incassato",
            vec![
                month("???", None, Some(999.0)),
                month("Gennaio", None, Some(999.0)),
                month("Aprile 2024", None, Some(10.0)),
            ],
        )];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        assert_eq!(hierarchy.years(), vec![2024]);
        assert_eq!(
            hierarchy.get(2024).unwrap().totals_for("INCASSATO").unwrap().consuntivo,
            [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_unclassified_causale_goes_to_default_category() {
        let rows = vec![row(
            "COSTI VARIABILI",
            "Carburante",
            vec![month("Maggio 2025", None, Some(40.0))],
        )];

        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        assert!(year.detail("COSTI VARIABILI", "Altro", "Carburante").is_some());
    }

    #[test]
    fn test_year_filter() {
        let rows = vec![row(
            "INCASSATO",
            "Incassato",
            vec![
                month("Dicembre 2024", None, Some(1.0)),
                month("Gennaio 2025", None, Some(2.0)),
            ],
        )];

        let hierarchy = HierarchyBuilder::new(Some(2025)).build(&rows, &CausaliCatalog::builtin());
        assert_eq!(hierarchy.years(), vec![2025]);
        assert_eq!(hierarchy.latest_year(), Some(2025));
    }

    #[test]
    fn test_build_is_idempotent() {
        let rows = vec![
            row("INCASSATO", "Incassato", vec![month("Gennaio 2025", None, Some(5.0))]),
            row("COSTI FISSI", "Affitto", vec![month("Gennaio 2025", Some(3.0), Some(4.0))]),
        ];
        let catalog = CausaliCatalog::builtin();

        assert_eq!(
            build_hierarchy(&rows, &catalog, None),
            build_hierarchy(&rows, &catalog, None)
        );
    }

    #[test]
    fn test_missing_cell_reads_zero() {
        let hierarchy = build_hierarchy(&[], &CausaliCatalog::builtin(), None);
        assert!(hierarchy.is_empty());

        let rows = vec![row(
            "INCASSATO",
            "Incassato",
            vec![month("Gennaio 2025", None, Some(5.0))],
        )];
        let hierarchy = build_hierarchy(&rows, &CausaliCatalog::builtin(), None);
        let year = hierarchy.get(2025).unwrap();
        assert_eq!(year.base_value(Track::Consuntivo, "INCASSATO", "Incassato", "Nope", 0), 0.0);
        assert_eq!(year.base_value(Track::Consuntivo, "NOPE", "Incassato", "Incassato", 0), 0.0);
        assert_eq!(
            year.base_value(Track::Consuntivo, "INCASSATO", "Incassato", "Incassato", 40),
            0.0
        );
    }
}
