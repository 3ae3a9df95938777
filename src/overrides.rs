use crate::error::Result;
use crate::hierarchy::PlanHierarchy;
use crate::schema::Track;
use crate::utils::MonthKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type MonthValues = BTreeMap<String, f64>;
type DetailMap = BTreeMap<String, MonthValues>;
type CategoryMap = BTreeMap<String, DetailMap>;

/// Sparse user-entered values for one track, keyed
/// `macro → category → causale → "YYYY-MM"`.
///
/// A present key overrides the base value, including an explicit 0; removing
/// the key restores the base. Keys are never checked against the catalog, so
/// entries for causali that no longer exist are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PlanOverrides(BTreeMap<String, CategoryMap>);

/// A single override as seen when walking the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideEntry<'a> {
    pub macro_category: &'a str,
    pub category: &'a str,
    pub detail: &'a str,
    pub month_key: &'a str,
    pub value: f64,
}

impl PlanOverrides {
    pub fn get(
        &self,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_key: &str,
    ) -> Option<f64> {
        self.0
            .get(macro_category)?
            .get(category)?
            .get(detail)?
            .get(month_key)
            .copied()
    }

    pub fn set(
        &mut self,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_key: &str,
        value: f64,
    ) {
        self.0
            .entry(macro_category.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default()
            .entry(detail.to_string())
            .or_default()
            .insert(month_key.to_string(), value);
    }

    /// Removes an override, pruning any map left empty. Returns the removed value.
    pub fn remove(
        &mut self,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_key: &str,
    ) -> Option<f64> {
        let categories = self.0.get_mut(macro_category)?;
        let details = categories.get_mut(category)?;
        let months = details.get_mut(detail)?;
        let removed = months.remove(month_key);

        if months.is_empty() {
            details.remove(detail);
        }
        if details.is_empty() {
            categories.remove(category);
        }
        if categories.is_empty() {
            self.0.remove(macro_category);
        }

        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = OverrideEntry<'_>> {
        self.0.iter().flat_map(|(macro_category, categories)| {
            categories.iter().flat_map(move |(category, details)| {
                details.iter().flat_map(move |(detail, months)| {
                    months.iter().map(move |(month_key, value)| OverrideEntry {
                        macro_category,
                        category,
                        detail,
                        month_key,
                        value: *value,
                    })
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The two override maps layered over the base hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideOverlay {
    pub preventivo: PlanOverrides,
    pub consuntivo: PlanOverrides,
}

impl OverrideOverlay {
    pub fn new(preventivo: PlanOverrides, consuntivo: PlanOverrides) -> Self {
        Self {
            preventivo,
            consuntivo,
        }
    }

    pub fn track(&self, track: Track) -> &PlanOverrides {
        match track {
            Track::Preventivo => &self.preventivo,
            Track::Consuntivo => &self.consuntivo,
        }
    }

    pub fn track_mut(&mut self, track: Track) -> &mut PlanOverrides {
        match track {
            Track::Preventivo => &mut self.preventivo,
            Track::Consuntivo => &mut self.consuntivo,
        }
    }

    pub fn get(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_key: &MonthKey,
    ) -> Option<f64> {
        self.track(track)
            .get(macro_category, category, detail, &month_key.to_string())
    }

    /// Sets (`Some`) or clears (`None`) one cell, leaving every other entry
    /// untouched. Returns the month key written.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        year: i32,
        month_index: usize,
        value: Option<f64>,
    ) -> Result<MonthKey> {
        let month_key = MonthKey::new(year, month_index)?;
        let key = month_key.to_string();
        let overrides = self.track_mut(track);
        match value {
            Some(v) => overrides.set(macro_category, category, detail, &key, v),
            None => {
                overrides.remove(macro_category, category, detail, &key);
            }
        }
        Ok(month_key)
    }

    pub fn len(&self) -> usize {
        self.preventivo.len() + self.consuntivo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preventivo.is_empty() && self.consuntivo.is_empty()
    }
}

/// Anything that can answer "what is the value of this cell".
pub trait CellSource {
    fn cell(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        year: i32,
        month_index: usize,
    ) -> f64;
}

impl CellSource for PlanHierarchy {
    fn cell(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        year: i32,
        month_index: usize,
    ) -> f64 {
        self.get(year)
            .map(|y| y.base_value(track, macro_category, category, detail, month_index))
            .unwrap_or(0.0)
    }
}

/// Read-only merge of a base hierarchy and an overlay.
#[derive(Debug, Clone, Copy)]
pub struct PlanView<'a> {
    base: &'a PlanHierarchy,
    overlay: &'a OverrideOverlay,
}

impl<'a> PlanView<'a> {
    pub fn new(base: &'a PlanHierarchy, overlay: &'a OverrideOverlay) -> Self {
        Self { base, overlay }
    }

    pub fn base(&self) -> &'a PlanHierarchy {
        self.base
    }

    pub fn overlay(&self) -> &'a OverrideOverlay {
        self.overlay
    }
}

impl CellSource for PlanView<'_> {
    fn cell(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        year: i32,
        month_index: usize,
    ) -> f64 {
        let Ok(month_key) = MonthKey::new(year, month_index) else {
            return 0.0;
        };
        self.overlay
            .get(track, macro_category, category, detail, &month_key)
            .unwrap_or_else(|| {
                self.base
                    .cell(track, macro_category, category, detail, year, month_index)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CausaliCatalog;
    use crate::hierarchy::build_hierarchy;
    use crate::schema::{RawMonthValue, RawPlanRow};

    const CAT: &str = "Rete vendita, Amministratori, Immobili";

    fn base() -> PlanHierarchy {
        let rows = vec![RawPlanRow {
            macro_category: "COSTI FISSI".to_string(),
            detail: "Affitto".to_string(),
            months: vec![RawMonthValue {
                month: "Gennaio 2025".to_string(),
                preventivo: None,
                consuntivo: Some(1000.0),
            }],
        }];
        build_hierarchy(&rows, &CausaliCatalog::builtin(), None)
    }

    #[test]
    fn test_override_round_trip() {
        let base = base();
        let mut overlay = OverrideOverlay::default();

        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0, Some(900.0))
            .unwrap();
        let view = PlanView::new(&base, &overlay);
        assert_eq!(view.cell(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0), 900.0);
        assert_eq!(view.cell(Track::Consuntivo, "COSTI FISSI", CAT, "Affitto", 2025, 0), 1000.0);

        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0, None)
            .unwrap();
        let view = PlanView::new(&base, &overlay);
        assert_eq!(view.cell(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0), 1000.0);
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_zero_is_a_valid_override() {
        let base = base();
        let mut overlay = OverrideOverlay::default();
        overlay
            .write(Track::Consuntivo, "COSTI FISSI", CAT, "Affitto", 2025, 0, Some(0.0))
            .unwrap();

        let view = PlanView::new(&base, &overlay);
        assert_eq!(view.cell(Track::Consuntivo, "COSTI FISSI", CAT, "Affitto", 2025, 0), 0.0);
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_writes_preserve_other_entries() {
        let mut overlay = OverrideOverlay::default();
        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0, Some(1.0))
            .unwrap();
        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 1, Some(2.0))
            .unwrap();
        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Enasarco", 2024, 11, Some(3.0))
            .unwrap();
        overlay
            .write(Track::Preventivo, "COSTI FISSI", CAT, "Affitto", 2025, 0, None)
            .unwrap();

        let prev = overlay.track(Track::Preventivo);
        assert_eq!(prev.get("COSTI FISSI", CAT, "Affitto", "2025-02"), Some(2.0));
        assert_eq!(prev.get("COSTI FISSI", CAT, "Enasarco", "2024-12"), Some(3.0));
        assert_eq!(prev.get("COSTI FISSI", CAT, "Affitto", "2025-01"), None);
        assert_eq!(prev.len(), 2);
    }

    #[test]
    fn test_orphaned_and_missing_cells_read_gracefully() {
        let base = base();
        let mut overlay = OverrideOverlay::default();
        overlay
            .write(Track::Consuntivo, "MACRO RIMOSSA", "Vecchia", "Sparita", 2025, 3, Some(7.0))
            .unwrap();

        let view = PlanView::new(&base, &overlay);
        assert_eq!(
            view.cell(Track::Consuntivo, "MACRO RIMOSSA", "Vecchia", "Sparita", 2025, 3),
            7.0
        );
        assert_eq!(view.cell(Track::Consuntivo, "COSTI FISSI", CAT, "Affitto", 2019, 0), 0.0);
        assert_eq!(view.cell(Track::Consuntivo, "COSTI FISSI", CAT, "Affitto", 2025, 12), 0.0);
    }

    #[test]
    fn test_write_rejects_bad_month() {
        let mut overlay = OverrideOverlay::default();
        assert!(overlay
            .write(Track::Preventivo, "A", "B", "C", 2025, 12, Some(1.0))
            .is_err());
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_overrides_json_shape() {
        let mut overrides = PlanOverrides::default();
        overrides.set("COSTI FISSI", CAT, "Affitto", "2025-03", 900.0);

        let json = serde_json::to_value(&overrides).unwrap();
        assert_eq!(json["COSTI FISSI"][CAT]["Affitto"]["2025-03"], 900.0);

        let back: PlanOverrides = serde_json::from_value(json).unwrap();
        assert_eq!(back, overrides);
    }
}
