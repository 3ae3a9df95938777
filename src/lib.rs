//! # Financial Plan Engine
//!
//! Aggregates monthly ledger rows into a plan hierarchy and lets an editor
//! override single cells on top of it, with dirty tracking and an audit log
//! of what gets saved.
//!
//! ## Core Concepts
//!
//! - **Causale**: the leaf label of a ledger row (e.g. "Affitto")
//! - **Catalog**: maps each causale to a macro category and a category
//! - **Tracks**: every cell carries a `preventivo` (budget) and a `consuntivo` (actual)
//! - **Base hierarchy**: year → macro → category → causale, rebuilt from the rows
//! - **Overlay**: sparse per-track overrides keyed by `"YYYY-MM"`; an override of `0` is a
//!   real value
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_plan_engine::*;
//!
//! let rows = vec![RawPlanRow {
//!     macro_category: "COSTI FISSI".to_string(),
//!     detail: "Affitto".to_string(),
//!     months: vec![RawMonthValue {
//!         month: "Gennaio 2025".to_string(),
//!         preventivo: None,
//!         consuntivo: Some(1000.0),
//!     }],
//! }];
//!
//! let mut session = PlanSession::new(
//!     EngineConfig::default(),
//!     rows,
//!     Vec::new(),
//!     CausaliCatalog::builtin(),
//! )?;
//!
//! let category = "Rete vendita, Amministratori, Immobili";
//! // preventivo falls back to consuntivo when the row has none
//! assert_eq!(
//!     session.read(Track::Preventivo, "COSTI FISSI", category, "Affitto", 2025, 0),
//!     1000.0
//! );
//!
//! session.write(Track::Preventivo, "COSTI FISSI", category, "Affitto", 2025, 0, Some(900.0))?;
//! let report = futures::executor::block_on(
//!     session.save(&MemoryStore::new(), &CompanyContext::new("acme")?, 2025),
//! )?;
//! assert_eq!(report.audit_entries.len(), 1);
//! ```

pub mod business_plan;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod ingestion;
pub mod overrides;
pub mod rollup;
pub mod schema;
pub mod session;
pub mod store;
pub mod tracker;
pub mod utils;

pub use business_plan::{calc_ratios, monthly_projection, BusinessPlanDraft, BusinessPlanDrafts};
pub use catalog::{CausaleCategory, CausaleGroup, CausaliCatalog, Classification};
pub use config::{CompanyContext, EngineConfig, DEFAULT_CATEGORY};
pub use error::{FinancialPlanError, Result};
pub use hierarchy::{
    build_hierarchy, DetailRow, HierarchyBuilder, MacroBlock, MonthValue, PlanHierarchy,
    PlanYearData, TrackTotals,
};
pub use ingestion::*;
pub use overrides::*;
pub use rollup::*;
pub use schema::*;
pub use session::{EditMode, PlanSession, SaveReport, WriteOutcome};
#[cfg(feature = "file-store")]
pub use store::JsonFileStore;
pub use store::{MemoryStore, PlanStore};
pub use tracker::{build_audit_log, DirtyKey, DirtySet};
pub use utils::*;

use log::info;

/// Validates `config` and builds the base hierarchy for `rows`.
pub fn build_plan(
    rows: &[RawPlanRow],
    catalog: &CausaliCatalog,
    config: &EngineConfig,
) -> Result<PlanHierarchy> {
    config.validate()?;

    let catalog = catalog
        .clone()
        .with_default_category(config.default_category.clone());
    let hierarchy = HierarchyBuilder::from_config(config).build(rows, &catalog);

    info!(
        "Built plan for {} year(s) from {} row(s)",
        hierarchy.len(),
        rows.len()
    );
    Ok(hierarchy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_plan_rejects_blank_default_category() {
        let config = EngineConfig {
            default_category: "  ".to_string(),
            year_filter: None,
        };
        let result = build_plan(&[], &CausaliCatalog::builtin(), &config);
        assert!(matches!(result, Err(FinancialPlanError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_plan_uses_configured_default_category() {
        let rows = vec![RawPlanRow {
            macro_category: "COSTI FISSI".to_string(),
            detail: "Cancelleria".to_string(),
            months: vec![RawMonthValue {
                month: "Marzo 2025".to_string(),
                preventivo: Some(10.0),
                consuntivo: Some(12.0),
            }],
        }];
        let config = EngineConfig {
            default_category: "Varie".to_string(),
            year_filter: None,
        };

        let plan = build_plan(&rows, &CausaliCatalog::builtin(), &config).unwrap();
        let row = plan
            .get(2025)
            .and_then(|y| y.detail("COSTI FISSI", "Varie", "Cancelleria"))
            .unwrap();
        assert_eq!(row.months[2].consuntivo, 12.0);
    }
}
