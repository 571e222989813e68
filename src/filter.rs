//! Transaction filtering by date range, calendar month, or fiscal year.
//!
//! Filters borrow from the engine's list and never mutate it. Records whose
//! date did not parse never match any filter. Bad input is reported as a
//! `FilterError` so callers can tell "invalid input" apart from "no matches".

use chrono::{Datelike, Month, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fiscal::{parse_fiscal_year_label, parse_month_name, FiscalCalendar};
use crate::normalize::{parse_timestamp, FeeTransaction};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterError {
    #[error("Start date {from} is after end date {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("Missing {bound} date")]
    MissingBound { bound: &'static str },

    #[error("Unrecognised date: {value}")]
    InvalidDate { value: String },

    #[error("Unknown month: {value}")]
    UnknownMonth { value: String },

    #[error("Invalid fiscal year: {value}")]
    InvalidFiscalYear { value: String },

    #[error("Unknown filter mode: {value}")]
    UnknownMode { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeFilter {
    /// Inclusive on both ends; `to` covers the whole day.
    Range { from: NaiveDate, to: NaiveDate },
    /// Calendar month in any year.
    Monthly(Month),
    /// Fiscal-year label such as `2024-2025`.
    Yearly(String),
}

/// Dates from filter inputs: `YYYY-MM-DD` (HTML date inputs) or any shape the
/// record normaliser understands.
fn parse_input_date(raw: &str) -> Result<NaiveDate, FilterError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(trimmed).map(|at| at.date()))
        .ok_or_else(|| FilterError::InvalidDate {
            value: trimmed.to_string(),
        })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
}

impl FeeFilter {
    pub fn range(from: NaiveDate, to: NaiveDate) -> Result<Self, FilterError> {
        if from > to {
            return Err(FilterError::InvalidRange { from, to });
        }
        Ok(FeeFilter::Range { from, to })
    }

    pub fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<Self, FilterError> {
        let from = non_blank(from).ok_or(FilterError::MissingBound { bound: "start" })?;
        let to = non_blank(to).ok_or(FilterError::MissingBound { bound: "end" })?;
        Self::range(parse_input_date(from)?, parse_input_date(to)?)
    }

    pub fn parse_monthly(name: &str) -> Result<Self, FilterError> {
        parse_month_name(name)
            .map(FeeFilter::Monthly)
            .ok_or_else(|| FilterError::UnknownMonth {
                value: name.trim().to_string(),
            })
    }

    pub fn parse_yearly(label: &str) -> Result<Self, FilterError> {
        let trimmed = label.trim();
        parse_fiscal_year_label(trimmed)
            .map(|_| FeeFilter::Yearly(trimmed.to_string()))
            .ok_or_else(|| FilterError::InvalidFiscalYear {
                value: trimmed.to_string(),
            })
    }

    fn validate(&self) -> Result<(), FilterError> {
        match self {
            FeeFilter::Range { from, to } if from > to => Err(FilterError::InvalidRange {
                from: *from,
                to: *to,
            }),
            FeeFilter::Yearly(label) if parse_fiscal_year_label(label).is_none() => {
                Err(FilterError::InvalidFiscalYear {
                    value: label.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, at: &NaiveDateTime, calendar: &FiscalCalendar) -> bool {
        match self {
            FeeFilter::Range { from, to } => {
                let start = from.and_time(chrono::NaiveTime::MIN);
                *at >= start && *at <= end_of_day(*to)
            }
            FeeFilter::Monthly(month) => at.month() == month.number_from_month(),
            FeeFilter::Yearly(label) => {
                let start = calendar.fiscal_start_year(at.year(), at.month0());
                parse_fiscal_year_label(label) == Some(start)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FeeFilter::Range { from, to } => format!(
                "{} to {}",
                from.format("%d-%m-%Y"),
                to.format("%d-%m-%Y")
            ),
            FeeFilter::Monthly(month) => month.name().to_string(),
            FeeFilter::Yearly(label) => format!("FY {label}"),
        }
    }
}

/// Filter request as the dashboard sends it. Field names follow both the
/// current and the older form payloads.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default, alias = "type", alias = "filterType")]
    pub mode: Option<String>,
    #[serde(default, alias = "fromDate", alias = "from_date", alias = "startDate")]
    pub from: Option<String>,
    #[serde(default, alias = "toDate", alias = "to_date", alias = "endDate")]
    pub to: Option<String>,
    #[serde(default, alias = "monthName", alias = "month_name")]
    pub month: Option<String>,
    #[serde(default, alias = "fiscal_year", alias = "year", alias = "session")]
    pub fiscal_year: Option<String>,
}

impl FilterRequest {
    pub fn into_filter(self) -> Result<FeeFilter, FilterError> {
        let mode = self.mode.as_deref().map(str::trim).unwrap_or("range");
        match mode.to_ascii_lowercase().as_str() {
            "range" | "custom" | "daterange" => {
                FeeFilter::parse_range(self.from.as_deref(), self.to.as_deref())
            }
            "monthly" | "month" => FeeFilter::parse_monthly(self.month.as_deref().unwrap_or("")),
            "yearly" | "year" | "session" => {
                FeeFilter::parse_yearly(self.fiscal_year.as_deref().unwrap_or(""))
            }
            other => Err(FilterError::UnknownMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Records matching `filter`, in their original order.
pub fn filter<'a>(
    records: &'a [FeeTransaction],
    filter: &FeeFilter,
    calendar: &FiscalCalendar,
) -> Result<Vec<&'a FeeTransaction>, FilterError> {
    filter.validate()?;
    Ok(records
        .iter()
        .filter(|tx| {
            tx.occurred_at
                .as_ref()
                .is_some_and(|at| filter.matches(at, calendar))
        })
        .collect())
}
