use crate::error::{FinancialPlanError, Result};
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

pub const MONTHS_PER_YEAR: usize = 12;

pub const MONTH_NAMES: [&str; MONTHS_PER_YEAR] = [
    "Gennaio",
    "Febbraio",
    "Marzo",
    "Aprile",
    "Maggio",
    "Giugno",
    "Luglio",
    "Agosto",
    "Settembre",
    "Ottobre",
    "Novembre",
    "Dicembre",
];

pub const MONTH_SHORT: [&str; MONTHS_PER_YEAR] = [
    "Gen", "Feb", "Mar", "Apr", "Mag", "Giu", "Lug", "Ago", "Set", "Ott", "Nov", "Dic",
];

/// Canonical form used to compare labels: trimmed, inner whitespace collapsed,
/// upper-cased.
pub fn normalize_label(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn month_index_from_name(name: &str) -> Option<usize> {
    let normalized = normalize_label(name);
    MONTH_NAMES
        .iter()
        .position(|m| m.to_uppercase() == normalized)
}

fn month_index_from_short(name: &str) -> Option<usize> {
    let normalized = normalize_label(name.trim_end_matches('.'));
    MONTH_SHORT
        .iter()
        .position(|m| m.to_uppercase() == normalized)
}

/// Parses a free-text plan month label such as `"Gennaio 2025"` into
/// `(year, month_index)`. The last whitespace token is the year; everything
/// before it is the month name.
pub fn parse_plan_month_label(label: &str) -> Option<(i32, usize)> {
    let parts: Vec<&str> = label.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let year = parts[parts.len() - 1].parse::<i32>().ok()?;
    let month_index = month_index_from_name(&parts[..parts.len() - 1].join(" "))?;
    Some((year, month_index))
}

/// Parses the labels used by the statistics sheet (`"Gen. 24"`, `"Ott 2025"`),
/// falling back to the full plan label format.
pub fn parse_stats_month_label(label: &str) -> Option<(i32, usize)> {
    if let Some(parsed) = parse_plan_month_label(label) {
        return Some(parsed);
    }

    let parts: Vec<&str> = label.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }
    let month_index = month_index_from_short(parts[0])?;
    let year_token = parts[1];
    if !year_token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year = match year_token.len() {
        2 => 2000 + year_token.parse::<i32>().ok()?,
        4 => year_token.parse::<i32>().ok()?,
        _ => return None,
    };
    Some((year, month_index))
}

/// A month within a year, serialized as the zero-padded `"YYYY-MM"` key used
/// by the persisted override maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month_index: usize) -> Result<Self> {
        if month_index >= MONTHS_PER_YEAR {
            return Err(FinancialPlanError::InvalidMonthIndex(month_index));
        }
        let month = u32::try_from(month_index + 1)
            .map_err(|_| FinancialPlanError::InvalidMonthIndex(month_index))?;
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 0-based month index (January = 0).
    pub fn month_index(&self) -> usize {
        self.month as usize - 1
    }

    /// 1-based calendar month (January = 1).
    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = FinancialPlanError;

    fn from_str(key: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", key.trim()), "%Y-%m-%d")
            .map_err(|_| FinancialPlanError::InvalidMonthKey(key.to_string()))?;

        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }
}

pub fn build_month_key(year: i32, month_index: usize) -> Result<String> {
    Ok(MonthKey::new(year, month_index)?.to_string())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator`, reported as 0 when the denominator is 0 or the
/// result is not finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    safe_ratio(numerator, denominator) * 100.0
}

pub fn sum_months(values: &[f64; MONTHS_PER_YEAR]) -> f64 {
    values.iter().sum()
}
