//! Fiscal calendar: April-March years and fiscal month ordering.

use chrono::{Datelike, Month};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::normalize::FeeTransaction;

/// April, as a zero-based month index.
pub const DEFAULT_FISCAL_START_MONTH0: u32 = 3;

/// Label for the fiscal year starting in `start_year`.
pub fn fiscal_year_label(start_year: i32) -> String {
    format!("{}-{}", start_year, start_year + 1)
}

/// Fiscal year containing the given calendar month, for April-start years.
pub fn fiscal_year_of(year: i32, month_index0: u32) -> String {
    FiscalCalendar::default().fiscal_year_of(year, month_index0)
}

/// Start year of a `"YYYY-YYYY"` label whose halves are consecutive.
pub fn parse_fiscal_year_label(label: &str) -> Option<i32> {
    let (start, end) = label.trim().split_once('-')?;
    if start.len() != 4 || end.len() != 4 {
        return None;
    }
    let start: i32 = start.parse().ok()?;
    let end: i32 = end.parse().ok()?;
    (end == start + 1).then_some(start)
}

/// Accepts full or three-letter English month names, any case, or 1-12.
pub fn parse_month_name(raw: &str) -> Option<Month> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u8>() {
        return Month::try_from(n).ok();
    }
    Month::from_str(trimmed).ok()
}

fn month_from_index0(index0: u32) -> Month {
    // `% 12` keeps this total; try_from only fails outside 1..=12.
    Month::try_from((index0 % 12) as u8 + 1).unwrap_or(Month::January)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalCalendar {
    start_month0: u32,
}

impl Default for FiscalCalendar {
    fn default() -> Self {
        Self {
            start_month0: DEFAULT_FISCAL_START_MONTH0,
        }
    }
}

impl FiscalCalendar {
    pub fn new(start_month0: u32) -> Self {
        Self {
            start_month0: start_month0 % 12,
        }
    }

    /// Calendar year in which the fiscal year containing this month began.
    pub fn fiscal_start_year(&self, year: i32, month_index0: u32) -> i32 {
        if month_index0 >= self.start_month0 {
            year
        } else {
            year - 1
        }
    }

    pub fn fiscal_year_of(&self, year: i32, month_index0: u32) -> String {
        fiscal_year_label(self.fiscal_start_year(year, month_index0))
    }

    pub fn fiscal_year_for<D: Datelike>(&self, date: &D) -> String {
        self.fiscal_year_of(date.year(), date.month0())
    }

    /// The twelve months in fiscal order, starting at the fiscal start month.
    pub fn month_order(&self) -> Vec<Month> {
        (0..12)
            .map(|offset| month_from_index0(self.start_month0 + offset))
            .collect()
    }

    /// Distinct fiscal years present among dated records, newest first.
    pub fn fiscal_year_options(&self, records: &[FeeTransaction]) -> Vec<String> {
        let starts: BTreeSet<i32> = records
            .iter()
            .filter_map(|tx| tx.occurred_at.as_ref())
            .map(|at| self.fiscal_start_year(at.year(), at.month0()))
            .collect();
        starts.into_iter().rev().map(fiscal_year_label).collect()
    }
}
