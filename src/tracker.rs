use crate::overrides::OverrideOverlay;
use crate::schema::{AuditEntry, Track};
use crate::utils::MonthKey;
use chrono::{DateTime, Utc};
use log::warn;
use std::collections::BTreeSet;
use std::fmt;

/// Identity of an edited cell, rendered as
/// `"<track>|<macro>|<category>|<causale>|<YYYY-MM>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirtyKey {
    pub track: Track,
    pub macro_category: String,
    pub category: String,
    pub detail: String,
    pub month_key: String,
}

impl DirtyKey {
    pub fn new(
        track: Track,
        macro_category: &str,
        category: &str,
        detail: &str,
        month_key: &MonthKey,
    ) -> Self {
        Self {
            track,
            macro_category: macro_category.to_string(),
            category: category.to_string(),
            detail: detail.to_string(),
            month_key: month_key.to_string(),
        }
    }
}

impl fmt::Display for DirtyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.track, self.macro_category, self.category, self.detail, self.month_key
        )
    }
}

/// Cells touched since the last load or save.
///
/// Tracks intent rather than net change: clearing an override still leaves
/// the cell dirty until the next save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtySet {
    keys: BTreeSet<DirtyKey>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key was not already present.
    pub fn mark_dirty(&mut self, key: DirtyKey) -> bool {
        self.keys.insert(key)
    }

    pub fn is_dirty(&self, key: &DirtyKey) -> bool {
        self.keys.contains(key)
    }

    pub fn dirty_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirtyKey> {
        self.keys.iter()
    }

    /// Dirty cells belonging to `year`.
    pub fn count_for_year(&self, year: i32) -> usize {
        self.keys
            .iter()
            .filter(|k| {
                k.month_key
                    .parse::<MonthKey>()
                    .is_ok_and(|mk| mk.year() == year)
            })
            .count()
    }
}

/// Audit entries for every override of `selected_year`, preventivo entries
/// first. Overrides of other years stay in the overlay but are not logged.
pub fn build_audit_log(
    overlay: &OverrideOverlay,
    selected_year: i32,
    created_at: DateTime<Utc>,
) -> Vec<AuditEntry> {
    let mut out = Vec::new();

    for track in Track::ALL {
        for entry in overlay.track(track).entries() {
            let month_key = match entry.month_key.parse::<MonthKey>() {
                Ok(mk) => mk,
                Err(_) => {
                    warn!(
                        "Skipping override with unparseable month key '{}' ({} / {} / {})",
                        entry.month_key, entry.macro_category, entry.category, entry.detail
                    );
                    continue;
                }
            };
            if month_key.year() != selected_year {
                continue;
            }

            out.push(AuditEntry {
                id: format!(
                    "{}-{}-{}-{}-{}",
                    track, entry.macro_category, entry.category, entry.detail, entry.month_key
                ),
                created_at,
                year: month_key.year(),
                month: month_key.month(),
                macro_category: entry.macro_category.to_string(),
                category: entry.category.to_string(),
                causale: entry.detail.to_string(),
                value: entry.value,
            });
        }
    }

    out
}
