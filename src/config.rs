use crate::error::{FinancialPlanError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CATEGORY: &str = "Altro";

/// Engine-wide settings. All state derived from it lives in the session that
/// owns it; nothing is read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[schemars(
        description = "Category assigned to causali that the catalog does not classify."
    )]
    #[serde(default = "default_category")]
    pub default_category: String,

    #[schemars(
        description = "When set, only rows belonging to this year are folded into the hierarchy."
    )]
    #[serde(default)]
    pub year_filter: Option<i32>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_category: default_category(),
            year_filter: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_category.trim().is_empty() {
            return Err(FinancialPlanError::InvalidConfig(
                "default category must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The company (and optional location) a session reads from and saves to.
///
/// Passed explicitly to every store call instead of being kept as ambient
/// "current company" state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyContext {
    pub company_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
}

impl CompanyContext {
    pub fn new(company_id: impl Into<String>) -> Result<Self> {
        let company_id = company_id.into();
        if company_id.trim().is_empty() {
            return Err(FinancialPlanError::InvalidContext(
                "company id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            company_id,
            location_id: None,
        })
    }

    #[must_use]
    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    /// Key under which the company's plan state is stored.
    pub fn storage_key(&self) -> String {
        match &self.location_id {
            Some(location) if !location.trim().is_empty() => {
                format!("{}__{}", self.company_id, location)
            }
            _ => self.company_id.clone(),
        }
    }
}
