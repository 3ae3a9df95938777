use crate::catalog::CausaliCatalog;
use crate::config::{CompanyContext, EngineConfig};
use crate::error::Result;
use crate::hierarchy::{HierarchyBuilder, PlanHierarchy, PlanYearData};
use crate::overrides::{CellSource, OverrideOverlay, PlanView};
use crate::rollup::{compute_year_metrics, YearMetrics};
use crate::schema::{
    AuditEntry, PlanStatePayload, RawPlanRow, SavePayload, StatsOverride, StatsOverrides,
    StatsRow, Track,
};
use crate::store::PlanStore;
use crate::tracker::{build_audit_log, DirtyKey, DirtySet};
use crate::utils::MonthKey;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    Locked,
    Editing,
}

/// What a cell write did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// `true` when this write moved the session from `Locked` to `Editing`.
    pub entered_editing: bool,
    pub mode: EditMode,
    pub month_key: MonthKey,
    pub dirty_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub year: i32,
    pub audit_entries: Vec<AuditEntry>,
    pub cleared_dirty: usize,
}

// Last state known to match the store.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    overlay: OverrideOverlay,
    stats_overrides: StatsOverrides,
    catalog: CausaliCatalog,
}

/// One editor's view of a company's plan: the base hierarchy built from the
/// source rows, the override overlay on top of it, and the edit lifecycle.
///
/// The base is rebuilt only when the rows or the catalog change; overrides
/// survive rebuilds untouched.
#[derive(Debug)]
pub struct PlanSession {
    config: EngineConfig,
    rows: Vec<RawPlanRow>,
    stats_rows: Vec<StatsRow>,
    default_catalog: CausaliCatalog,
    catalog: CausaliCatalog,
    base: PlanHierarchy,
    built_for: u64,
    builds: usize,
    overlay: OverrideOverlay,
    stats_overrides: StatsOverrides,
    snapshot: Snapshot,
    dirty: DirtySet,
    mode: EditMode,
}

impl PlanSession {
    pub fn new(
        config: EngineConfig,
        rows: Vec<RawPlanRow>,
        stats_rows: Vec<StatsRow>,
        default_catalog: CausaliCatalog,
    ) -> Result<Self> {
        config.validate()?;

        let default_catalog =
            default_catalog.with_default_category(config.default_category.clone());
        let base = HierarchyBuilder::from_config(&config).build(&rows, &default_catalog);
        let built_for = default_catalog.fingerprint();

        Ok(Self {
            snapshot: Snapshot {
                overlay: OverrideOverlay::default(),
                stats_overrides: StatsOverrides::new(),
                catalog: default_catalog.clone(),
            },
            catalog: default_catalog.clone(),
            default_catalog,
            config,
            rows,
            stats_rows,
            base,
            built_for,
            builds: 1,
            overlay: OverrideOverlay::default(),
            stats_overrides: StatsOverrides::new(),
            dirty: DirtySet::new(),
            mode: EditMode::Locked,
        })
    }

    fn rebuild(&mut self, force: bool) {
        let fingerprint = self.catalog.fingerprint();
        if !force && fingerprint == self.built_for {
            debug!("Catalog unchanged, reusing memoized plan hierarchy");
            return;
        }
        self.base = HierarchyBuilder::from_config(&self.config).build(&self.rows, &self.catalog);
        self.built_for = fingerprint;
        self.builds += 1;
    }

    fn take_snapshot(&mut self) {
        self.snapshot = Snapshot {
            overlay: self.overlay.clone(),
            stats_overrides: self.stats_overrides.clone(),
            catalog: self.catalog.clone(),
        };
    }

    fn apply_payload(&mut self, payload: Option<PlanStatePayload>) {
        match payload {
            None => {
                info!("No stored plan state, using built-in defaults");
                self.overlay = OverrideOverlay::default();
                self.stats_overrides = StatsOverrides::new();
                self.catalog = self.default_catalog.clone();
            }
            Some(payload) => {
                self.overlay = OverrideOverlay::new(
                    payload.preventivo_overrides,
                    payload.consuntivo_overrides,
                );
                self.stats_overrides = payload.stats_overrides;
                self.catalog = if payload.causali_catalog.is_empty() {
                    self.default_catalog.clone()
                } else {
                    CausaliCatalog::new(payload.causali_catalog, payload.causali_version)
                        .with_default_category(self.config.default_category.clone())
                };
                info!(
                    "Loaded plan state: {} override(s), {} causali",
                    self.overlay.len(),
                    self.catalog.total_items()
                );
            }
        }

        self.rebuild(false);
        self.take_snapshot();
        self.dirty.clear();
        self.mode = EditMode::Locked;
    }

    /// Fetches the stored state for `ctx`. On failure the session is left as it was.
    pub async fn load<S: PlanStore + ?Sized>(
        &mut self,
        store: &S,
        ctx: &CompanyContext,
    ) -> Result<()> {
        let payload = store.fetch_state(ctx).await?;
        self.apply_payload(payload);
        Ok(())
    }

    /// Discards unsaved edits by re-fetching from the store.
    pub async fn reload<S: PlanStore + ?Sized>(
        &mut self,
        store: &S,
        ctx: &CompanyContext,
    ) -> Result<()> {
        self.load(store, ctx).await
    }

    /// Discards unsaved edits by restoring the last loaded or saved state.
    pub fn cancel(&mut self) {
        self.overlay = self.snapshot.overlay.clone();
        self.stats_overrides = self.snapshot.stats_overrides.clone();
        self.catalog = self.snapshot.catalog.clone();
        self.rebuild(false);
        self.dirty.clear();
        self.mode = EditMode::Locked;
    }

    pub fn read(
        &self,
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        year: i32,
        month_index: usize,
    ) -> f64 {
        self.view()
            .cell(track, macro_category, category, detail, year, month_index)
    }

    /// Sets (`Some`) or clears (`None`) the override for one cell and marks it
    /// dirty. The first write after a load or save unlocks the session.
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
    ) -> Result<WriteOutcome> {
        let month_key = self.overlay.write(
            track,
            macro_category,
            category,
            detail,
            year,
            month_index,
            value,
        )?;
        self.dirty
            .mark_dirty(DirtyKey::new(track, macro_category, category, detail, &month_key));

        let entered_editing = self.mode == EditMode::Locked;
        self.mode = EditMode::Editing;

        Ok(WriteOutcome {
            entered_editing,
            mode: self.mode,
            month_key,
            dirty_count: self.dirty.dirty_count(),
        })
    }

    /// Unlocks the session without writing. Returns `true` on a transition.
    pub fn begin_editing(&mut self) -> bool {
        let changed = self.mode == EditMode::Locked;
        self.mode = EditMode::Editing;
        changed
    }

    pub fn set_stats_override(&mut self, month_key: MonthKey, value: Option<StatsOverride>) {
        let key = month_key.to_string();
        match value {
            Some(v) => {
                self.stats_overrides.insert(key, v);
            }
            None => {
                self.stats_overrides.remove(&key);
            }
        }
    }

    /// Audit entries a save of `year` would produce right now.
    pub fn audit_preview(&self, year: i32) -> Vec<AuditEntry> {
        build_audit_log(&self.overlay, year, Utc::now())
    }

    pub fn save_payload(&self, selected_year: i32, created_at: DateTime<Utc>) -> SavePayload {
        SavePayload {
            preventivo_overrides: self.overlay.preventivo.clone(),
            consuntivo_overrides: self.overlay.consuntivo.clone(),
            manual_log: build_audit_log(&self.overlay, selected_year, created_at),
            monthly_metrics: Vec::new(),
            stats_overrides: self.stats_overrides.clone(),
            causali_catalog: self.catalog.groups().to_vec(),
            causali_version: self.catalog.version().map(str::to_string),
        }
    }

    /// Persists the overlay with the audit log of `selected_year`.
    ///
    /// On success the whole dirty set is cleared, including cells of other
    /// years, and the session locks. On failure nothing changes.
    pub async fn save<S: PlanStore + ?Sized>(
        &mut self,
        store: &S,
        ctx: &CompanyContext,
        selected_year: i32,
    ) -> Result<SaveReport> {
        let payload = self.save_payload(selected_year, Utc::now());
        let audit_entries = payload.manual_log.clone();

        store.persist_state(ctx, payload).await?;

        let cleared_dirty = self.dirty.dirty_count();
        self.take_snapshot();
        self.dirty.clear();
        self.mode = EditMode::Locked;

        info!(
            "Saved plan for {} ({}): {} audit entr(ies), {} dirty cell(s) cleared",
            ctx.storage_key(),
            selected_year,
            audit_entries.len(),
            cleared_dirty
        );

        Ok(SaveReport {
            year: selected_year,
            audit_entries,
            cleared_dirty,
        })
    }

    /// Edits the catalog and rebuilds the base hierarchy. Overrides are kept as
    /// they are, even when they now point at causali the catalog no longer lists.
    pub fn update_catalog<R>(
        &mut self,
        edit: impl FnOnce(&mut CausaliCatalog) -> Result<R>,
    ) -> Result<R> {
        let mut catalog = self.catalog.clone();
        let result = edit(&mut catalog)?;
        self.catalog = catalog;
        self.rebuild(false);
        Ok(result)
    }

    pub fn replace_rows(&mut self, rows: Vec<RawPlanRow>) {
        self.rows = rows;
        self.rebuild(true);
    }

    pub fn replace_stats_rows(&mut self, stats_rows: Vec<StatsRow>) {
        self.stats_rows = stats_rows;
    }

    pub fn view(&self) -> PlanView<'_> {
        PlanView::new(&self.base, &self.overlay)
    }

    pub fn hierarchy(&self) -> &PlanHierarchy {
        &self.base
    }

    pub fn year(&self, year: i32) -> Option<&PlanYearData> {
        self.base.get(year)
    }

    pub fn available_years(&self) -> Vec<i32> {
        self.base.years()
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.base.latest_year()
    }

    pub fn year_metrics(&self) -> BTreeMap<i32, YearMetrics> {
        compute_year_metrics(&self.base, &self.stats_rows)
    }

    pub fn overlay(&self) -> &OverrideOverlay {
        &self.overlay
    }

    pub fn catalog(&self) -> &CausaliCatalog {
        &self.catalog
    }

    pub fn stats_overrides(&self) -> &StatsOverrides {
        &self.stats_overrides
    }

    pub fn stats_rows(&self) -> &[StatsRow] {
        &self.stats_rows
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == EditMode::Editing
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.dirty_count()
    }

    pub fn is_dirty(&self, key: &DirtyKey) -> bool {
        self.dirty.is_dirty(key)
    }

    /// How many times the base hierarchy has been built.
    pub fn hierarchy_builds(&self) -> usize {
        self.builds
    }
}
