use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialPlanError {
    #[error("Invalid month index {0}: must be between 0 and 11")]
    InvalidMonthIndex(usize),

    #[error("Invalid month key '{0}': expected YYYY-MM")]
    InvalidMonthKey(String),

    #[error("Unknown macro category: {0}")]
    UnknownMacroCategory(String),

    #[error("Unknown category '{category}' in macro category '{macro_category}'")]
    UnknownCategory {
        macro_category: String,
        category: String,
    },

    #[error("Causale '{label}' is already classified under {macro_category} / {category}")]
    DuplicateCausale {
        label: String,
        macro_category: String,
        category: String,
    },

    #[error("Invalid company context: {0}")]
    InvalidContext(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Persistence failed: {0}")]
    PersistenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FinancialPlanError>;
