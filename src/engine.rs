//! Fee analytics engine.
//!
//! One engine instance owns one session's transaction list. The list is
//! replaced wholesale on refresh and prepended to on local submission; every
//! query is recomputed from the current list.
//!
//! List lifecycle:
//! `Authoritative -> PendingLocalAppend -> Reconciling -> Authoritative`.
//! A refresh result always wins over local state (no merge).

use chrono::Month;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::FeesConfig;
use crate::error::FeesResult;
use crate::filter::{self, FeeFilter, FilterError};
use crate::fiscal::FiscalCalendar;
use crate::normalize::{normalize_all, FeeTransaction};
use crate::receipt::ReceiptSequencer;
use crate::summary::{
    format_inr, summarize, summarize_by_class, summarize_by_mode, BreakdownRow, SummaryResult,
};

pub type SharedEngine = Arc<Mutex<FeeAnalyticsEngine>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPhase {
    /// List matches the last successful fetch (or the cache it was seeded from).
    Authoritative,
    /// One or more local submissions are shown ahead of the server list.
    PendingLocalAppend,
    /// A full refetch is in flight.
    Reconciling,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeReport {
    pub scope: String,
    pub summary: SummaryResult,
    pub total_display: String,
    pub average_display: String,
    pub by_mode: Vec<BreakdownRow>,
    pub by_class: Vec<BreakdownRow>,
    pub transactions: Vec<FeeTransaction>,
}

#[derive(Debug)]
pub struct FeeAnalyticsEngine {
    calendar: FiscalCalendar,
    sequencer: ReceiptSequencer,
    transactions: Vec<FeeTransaction>,
    phase: ListPhase,
    pending_local: usize,
}

impl FeeAnalyticsEngine {
    pub fn new(config: &FeesConfig) -> Self {
        Self {
            calendar: config.calendar(),
            sequencer: config.sequencer(),
            transactions: Vec::new(),
            phase: ListPhase::Authoritative,
            pending_local: 0,
        }
    }

    pub fn with_transactions(config: &FeesConfig, raw: Vec<Value>) -> Self {
        let mut engine = Self::new(config);
        engine.replace_all(raw);
        engine
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    // -- State ----------------------------------------------------------------

    pub fn phase(&self) -> ListPhase {
        self.phase
    }

    /// Local submissions not yet confirmed by a refresh.
    pub fn pending_local(&self) -> usize {
        self.pending_local
    }

    pub fn replace_all(&mut self, raw: Vec<Value>) {
        self.transactions = normalize_all(raw);
        self.phase = ListPhase::Authoritative;
        self.pending_local = 0;
        debug!(count = self.transactions.len(), "Fee list replaced");
    }

    /// Show a just-submitted record ahead of the server list.
    pub fn append_local(&mut self, raw: Value) -> &FeeTransaction {
        self.transactions.insert(0, FeeTransaction::from_value(raw));
        self.pending_local += 1;
        self.phase = ListPhase::PendingLocalAppend;
        &self.transactions[0]
    }

    pub fn begin_reconcile(&mut self) {
        self.phase = ListPhase::Reconciling;
    }

    /// Apply a refetch result. On failure the list falls back to empty and
    /// the error is handed back to the caller.
    pub fn apply_refresh(&mut self, result: FeesResult<Vec<Value>>) -> FeesResult<usize> {
        match result {
            Ok(raw) => {
                let dropped_local = self.pending_local;
                self.replace_all(raw);
                info!(
                    count = self.transactions.len(),
                    superseded_local = dropped_local,
                    "Fee list refreshed"
                );
                Ok(self.transactions.len())
            }
            Err(e) => {
                warn!(error = %e, "Fee analytics refresh failed, clearing list");
                self.transactions.clear();
                self.phase = ListPhase::Authoritative;
                self.pending_local = 0;
                Err(e)
            }
        }
    }

    // -- Queries --------------------------------------------------------------

    pub fn transactions(&self) -> &[FeeTransaction] {
        &self.transactions
    }

    pub fn undated_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| !tx.has_valid_date())
            .count()
    }

    pub fn filter(&self, f: &FeeFilter) -> Result<Vec<&FeeTransaction>, FilterError> {
        filter::filter(&self.transactions, f, &self.calendar)
    }

    pub fn summary(&self, f: &FeeFilter) -> Result<SummaryResult, FilterError> {
        Ok(summarize(self.filter(f)?))
    }

    /// Summary over every record, including those with unparsable dates.
    pub fn summary_all(&self) -> SummaryResult {
        summarize(&self.transactions)
    }

    pub fn next_receipt_number(&self) -> String {
        self.sequencer.next(&self.transactions)
    }

    pub fn fiscal_year_options(&self) -> Vec<String> {
        self.calendar.fiscal_year_options(&self.transactions)
    }

    pub fn month_options(&self) -> Vec<Month> {
        self.calendar.month_order()
    }

    /// Summary, breakdowns, and matching rows. `None` reports on everything.
    pub fn report(&self, filter: Option<&FeeFilter>) -> Result<FeeReport, FilterError> {
        let (scope, rows) = match filter {
            Some(f) => (f.describe(), self.filter(f)?),
            None => (
                "All transactions".to_string(),
                self.transactions.iter().collect(),
            ),
        };
        let summary = summarize(rows.iter().copied());
        Ok(FeeReport {
            scope,
            total_display: format_inr(summary.total),
            average_display: format_inr(summary.average),
            by_mode: summarize_by_mode(rows.iter().copied()),
            by_class: summarize_by_class(rows.iter().copied()),
            transactions: rows.into_iter().cloned().collect(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeesError;
    use serde_json::json;

    fn sample() -> Vec<Value> {
        vec![
            json!({ "amount": 1000, "date": "05-04-2025", "receiptNumber": "GBIS-00002", "paymentMode": "Cash" }),
            json!({ "amount": 2000, "date": "10-03-2025", "receiptNumber": "GBIS-00001", "paymentMode": "UPI" }),
            json!({ "amount": 500, "date": "bad", "receiptNumber": "GBIS-00003", "paymentMode": "Cash" }),
        ]
    }

    fn engine() -> FeeAnalyticsEngine {
        FeeAnalyticsEngine::with_transactions(&FeesConfig::default(), sample())
    }

    #[test]
    fn test_all_view_counts_undated_records() {
        let e = engine();
        assert_eq!(e.summary_all().count, 3);
        assert_eq!(e.summary_all().total, 3500.0);
        assert_eq!(e.undated_count(), 1);
    }

    #[test]
    fn test_yearly_summary() {
        let e = engine();
        let s = e.summary(&FeeFilter::Yearly("2025-2026".into())).unwrap();
        assert_eq!((s.total, s.count, s.average), (1000.0, 1, 1000.0));
        let s = e.summary(&FeeFilter::Yearly("2024-2025".into())).unwrap();
        assert_eq!(s.total, 2000.0);
    }

    #[test]
    fn test_invalid_filter_surfaces_error() {
        let e = engine();
        let bad = FeeFilter::Yearly("next year".into());
        assert!(matches!(
            e.summary(&bad),
            Err(FilterError::InvalidFiscalYear { .. })
        ));
    }

    #[test]
    fn test_optimistic_append_then_refresh() {
        let mut e = engine();
        assert_eq!(e.phase(), ListPhase::Authoritative);
        assert_eq!(e.next_receipt_number(), "GBIS-00004");

        let appended = e.append_local(json!({ "amount": 750, "receiptNumber": "GBIS-00004" }));
        assert_eq!(appended.amount, 750.0);
        assert_eq!(e.phase(), ListPhase::PendingLocalAppend);
        assert_eq!(e.transactions()[0].receipt_number, "GBIS-00004");
        assert_eq!(e.next_receipt_number(), "GBIS-00005");

        e.begin_reconcile();
        assert_eq!(e.phase(), ListPhase::Reconciling);

        let refreshed = e.apply_refresh(Ok(vec![json!({ "amount": 1 })])).unwrap();
        assert_eq!(refreshed, 1);
        assert_eq!(e.phase(), ListPhase::Authoritative);
        assert_eq!(e.pending_local(), 0);
        assert_eq!(e.transactions().len(), 1);
    }

    #[test]
    fn test_failed_refresh_falls_back_to_empty() {
        let mut e = engine();
        e.begin_reconcile();
        let err = e
            .apply_refresh(Err(FeesError::Network("offline".into())))
            .unwrap_err();
        assert!(matches!(err, FeesError::Network(_)));
        assert_eq!(e.phase(), ListPhase::Authoritative);
        assert!(e.transactions().is_empty());
        assert_eq!(e.summary_all(), SummaryResult::default());
        assert_eq!(e.next_receipt_number(), "GBIS-00001");
    }

    #[test]
    fn test_report_formats_currency() {
        let e = engine();
        let report = e.report(None).unwrap();
        assert_eq!(report.scope, "All transactions");
        assert_eq!(report.total_display, "₹3,500");
        assert_eq!(report.average_display, "₹1,167");
        assert_eq!(report.by_mode[0].label, "UPI");
        assert_eq!(report.transactions.len(), 3);

        let april = FeeFilter::parse_monthly("April").unwrap();
        let report = e.report(Some(&april)).unwrap();
        assert_eq!(report.scope, "April");
        assert_eq!(report.summary.count, 1);
    }

    #[test]
    fn test_options_lists() {
        let e = engine();
        assert_eq!(e.fiscal_year_options(), vec!["2025-2026", "2024-2025"]);
        assert_eq!(e.month_options()[0], Month::April);
    }
}
