use crate::config::DEFAULT_CATEGORY;
use crate::error::{FinancialPlanError, Result};
use crate::utils::normalize_label;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CausaleCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CausaleGroup {
    pub macro_category: String,
    #[serde(default)]
    pub categories: Vec<CausaleCategory>,
}

/// Where a causale sits in the macro → category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub macro_category: String,
    pub category: String,
}

/// The user-editable list of causali grouped by macro category and category.
///
/// Lookups go through an index keyed by the normalized label, rebuilt after
/// every edit.
#[derive(Debug, Clone)]
pub struct CausaliCatalog {
    groups: Vec<CausaleGroup>,
    version: Option<String>,
    default_category: String,
    index: HashMap<String, Classification>,
}

impl PartialEq for CausaliCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
            && self.version == other.version
            && self.default_category == other.default_category
    }
}

impl Default for CausaliCatalog {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl CausaliCatalog {
    pub fn new(groups: Vec<CausaleGroup>, version: Option<String>) -> Self {
        let mut catalog = Self {
            groups,
            version,
            default_category: DEFAULT_CATEGORY.to_string(),
            index: HashMap::new(),
        };
        catalog.reindex();
        catalog
    }

    #[must_use]
    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    /// The catalog shipped with the application, used when the store has none.
    pub fn builtin() -> Self {
        let group = |macro_category: &str, name: &str, items: &[&str]| CausaleGroup {
            macro_category: macro_category.to_string(),
            categories: vec![CausaleCategory {
                name: name.to_string(),
                items: items.iter().map(|s| s.to_string()).collect(),
            }],
        };

        Self::new(
            vec![
                group("INCASSATO", "Incassato", &["Incassato"]),
                group(
                    "COSTI FISSI",
                    "Rete vendita, Amministratori, Immobili",
                    &["Rimborsi spese", "Affitto", "Enasarco"],
                ),
                group(
                    "COSTI VARIABILI",
                    "Fornitori Materiali",
                    &[
                        "nome fornitore",
                        "Merce in Acquisto",
                        "Freelance",
                        "Noleggio Attrezzature",
                        "Sub-Appaltatori",
                    ],
                ),
            ],
            None,
        )
    }

    fn reindex(&mut self) {
        self.index.clear();
        for group in &self.groups {
            for category in &group.categories {
                for item in &category.items {
                    let meta = Classification {
                        macro_category: group.macro_category.clone(),
                        category: category.name.clone(),
                    };
                    if let Some(previous) = self.index.insert(normalize_label(item), meta) {
                        warn!(
                            "Causale '{}' listed more than once; '{} / {}' replaced by '{} / {}'",
                            item,
                            previous.macro_category,
                            previous.category,
                            group.macro_category,
                            category.name
                        );
                    }
                }
            }
        }
    }

    pub fn groups(&self) -> &[CausaleGroup] {
        &self.groups
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.categories.iter())
            .map(|c| c.items.len())
            .sum()
    }

    /// Content hash identifying this catalog for hierarchy memoization.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.groups.hash(&mut hasher);
        self.default_category.hash(&mut hasher);
        hasher.finish()
    }

    pub fn lookup(&self, label: &str) -> Option<&Classification> {
        self.index.get(&normalize_label(label))
    }

    /// Classifies a causale label. Labels the catalog does not know stay under
    /// the macro category declared by the source row, in the default category.
    pub fn classify(&self, label: &str, fallback_macro: &str) -> Classification {
        match self.lookup(label) {
            Some(meta) => meta.clone(),
            None => Classification {
                macro_category: fallback_macro.to_string(),
                category: self.default_category.clone(),
            },
        }
    }

    fn group_position(&self, macro_category: &str) -> Option<usize> {
        let wanted = normalize_label(macro_category);
        self.groups
            .iter()
            .position(|g| normalize_label(&g.macro_category) == wanted)
    }

    fn category_mut(
        &mut self,
        macro_category: &str,
        category: &str,
    ) -> Result<&mut CausaleCategory> {
        let group_idx = self
            .group_position(macro_category)
            .ok_or_else(|| FinancialPlanError::UnknownMacroCategory(macro_category.to_string()))?;

        let wanted = normalize_label(category);
        self.groups[group_idx]
            .categories
            .iter_mut()
            .find(|c| normalize_label(&c.name) == wanted)
            .ok_or_else(|| FinancialPlanError::UnknownCategory {
                macro_category: macro_category.to_string(),
                category: category.to_string(),
            })
    }

    /// Adds a macro category. Returns `false` when it already exists.
    pub fn add_macro(&mut self, macro_category: &str) -> bool {
        if self.group_position(macro_category).is_some() {
            return false;
        }
        self.groups.push(CausaleGroup {
            macro_category: macro_category.trim().to_string(),
            categories: Vec::new(),
        });
        true
    }

    /// Adds a category under an existing macro. Returns `false` when it already exists.
    pub fn add_category(&mut self, macro_category: &str, category: &str) -> Result<bool> {
        let group_idx = self
            .group_position(macro_category)
            .ok_or_else(|| FinancialPlanError::UnknownMacroCategory(macro_category.to_string()))?;

        let group = &mut self.groups[group_idx];
        let wanted = normalize_label(category);
        if group
            .categories
            .iter()
            .any(|c| normalize_label(&c.name) == wanted)
        {
            return Ok(false);
        }

        group.categories.push(CausaleCategory {
            name: category.trim().to_string(),
            items: Vec::new(),
        });
        Ok(true)
    }

    pub fn add_item(&mut self, macro_category: &str, category: &str, item: &str) -> Result<()> {
        if let Some(existing) = self.lookup(item) {
            return Err(FinancialPlanError::DuplicateCausale {
                label: item.to_string(),
                macro_category: existing.macro_category.clone(),
                category: existing.category.clone(),
            });
        }

        self.category_mut(macro_category, category)?
            .items
            .push(item.trim().to_string());
        self.reindex();
        Ok(())
    }

    /// Removes a causale. Returns `false` when the category does not list it.
    pub fn remove_item(
        &mut self,
        macro_category: &str,
        category: &str,
        item: &str,
    ) -> Result<bool> {
        let wanted = normalize_label(item);
        let entry = self.category_mut(macro_category, category)?;
        let before = entry.items.len();
        entry.items.retain(|i| normalize_label(i) != wanted);
        let removed = entry.items.len() != before;
        if removed {
            self.reindex();
        }
        Ok(removed)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Causali\n\n");
        if let Some(version) = &self.version {
            output.push_str(&format!("Version: {}\n\n", version));
        }

        for group in &self.groups {
            output.push_str(&format!("## {}\n\n", group.macro_category));
            for category in &group.categories {
                output.push_str(&format!("### {}\n\n", category.name));
                for item in &category.items {
                    output.push_str(&format!("- {}\n", item));
                }
                output.push('\n');
            }
        }

        output
    }
}
