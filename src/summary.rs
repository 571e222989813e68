//! Summary statistics over a filtered set of fee transactions.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::normalize::FeeTransaction;

/// `{ total, count, average }`. Recomputed on every query; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub total: f64,
    pub count: usize,
    /// Rounded to the nearest whole unit. The total is left as summed.
    pub average: f64,
}

impl SummaryResult {
    fn from_parts(total: f64, count: usize) -> Self {
        let average = if count > 0 {
            (total / count as f64).round()
        } else {
            0.0
        };
        Self {
            total,
            count,
            average,
        }
    }
}

pub fn summarize<'a, I>(records: I) -> SummaryResult
where
    I: IntoIterator<Item = &'a FeeTransaction>,
{
    let (total, count) = records
        .into_iter()
        .fold((0.0, 0usize), |(total, count), tx| (total + tx.amount, count + 1));
    SummaryResult::from_parts(total, count)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub label: String,
    #[serde(flatten)]
    pub summary: SummaryResult,
}

fn breakdown_by<'a, I, F>(records: I, key: F) -> Vec<BreakdownRow>
where
    I: IntoIterator<Item = &'a FeeTransaction>,
    F: Fn(&FeeTransaction) -> &str,
{
    let mut buckets: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for tx in records {
        let entry = buckets.entry(key(tx).to_string()).or_insert((0.0, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
    }
    let mut rows: Vec<BreakdownRow> = buckets
        .into_iter()
        .map(|(label, (total, count))| BreakdownRow {
            label,
            summary: SummaryResult::from_parts(total, count),
        })
        .collect();
    // Largest collections first; BTreeMap order breaks ties by label.
    rows.sort_by(|a, b| b.summary.total.total_cmp(&a.summary.total));
    rows
}

/// Per payment-mode totals (Cash, UPI, Cheque, ...).
pub fn summarize_by_mode<'a, I>(records: I) -> Vec<BreakdownRow>
where
    I: IntoIterator<Item = &'a FeeTransaction>,
{
    breakdown_by(records, |tx| tx.payment_mode.as_str())
}

pub fn summarize_by_class<'a, I>(records: I) -> Vec<BreakdownRow>
where
    I: IntoIterator<Item = &'a FeeTransaction>,
{
    breakdown_by(records, |tx| tx.class_name.as_str())
}

/// Indian-grouped rupee string: `₹1,23,456`, with paise only when non-zero.
pub fn format_inr(amount: f64) -> String {
    if !amount.is_finite() {
        return "₹0".to_string();
    }
    let negative = amount < 0.0;
    let paise_total = (amount.abs() * 100.0).round() as u64;
    let whole = paise_total / 100;
    let paise = paise_total % 100;

    let digits = whole.to_string();
    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };

    let sign = if negative && paise_total > 0 { "-" } else { "" };
    if paise > 0 {
        format!("{sign}₹{grouped}.{paise:02}")
    } else {
        format!("{sign}₹{grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn txs(values: &[serde_json::Value]) -> Vec<FeeTransaction> {
        values
            .iter()
            .cloned()
            .map(FeeTransaction::from_value)
            .collect()
    }

    #[test]
    fn test_summarize_empty() {
        let empty: Vec<FeeTransaction> = Vec::new();
        assert_eq!(
            summarize(&empty),
            SummaryResult {
                total: 0.0,
                count: 0,
                average: 0.0
            }
        );
    }

    #[test]
    fn test_summarize_basic() {
        let recs = txs(&[
            json!({ "amount": 100 }),
            json!({ "amount": 200 }),
            json!({ "amount": 300 }),
        ]);
        let s = summarize(&recs);
        assert_eq!(s.total, 600.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.average, 200.0);
    }

    #[test]
    fn test_only_average_is_rounded() {
        let recs = txs(&[
            json!({ "amount": 100.25 }),
            json!({ "amount": "200" }),
            json!({ "amount": "n/a" }),
        ]);
        let s = summarize(&recs);
        assert_eq!(s.total, 300.25);
        assert_eq!(s.count, 3);
        assert_eq!(s.average, 100.0);
    }

    #[test]
    fn test_summarize_accepts_filtered_refs() {
        let recs = txs(&[json!({ "amount": 10 }), json!({ "amount": 20 })]);
        let subset: Vec<&FeeTransaction> = recs.iter().skip(1).collect();
        let s = summarize(subset);
        assert_eq!((s.total, s.count, s.average), (20.0, 1, 20.0));
    }

    #[test]
    fn test_breakdown_by_mode() {
        let recs = txs(&[
            json!({ "amount": 500, "paymentMode": "Cash" }),
            json!({ "amount": 1500, "paymentMode": "UPI" }),
            json!({ "amount": 700, "paymentMode": "Cash" }),
            json!({ "amount": 50 }),
        ]);
        let rows = summarize_by_mode(&recs);
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["UPI", "Cash", "N/A"]);
        assert_eq!(rows[1].summary.count, 2);
        assert_eq!(rows[1].summary.average, 600.0);
    }

    #[test]
    fn test_breakdown_by_class() {
        let recs = txs(&[
            json!({ "amount": 100, "class": "5A" }),
            json!({ "amount": 100, "className": "4B" }),
        ]);
        let rows = summarize_by_class(&recs);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "4B");
    }

    #[test]
    fn test_format_inr_grouping() {
        assert_eq!(format_inr(0.0), "₹0");
        assert_eq!(format_inr(999.0), "₹999");
        assert_eq!(format_inr(1000.0), "₹1,000");
        assert_eq!(format_inr(123456.0), "₹1,23,456");
        assert_eq!(format_inr(12345678.0), "₹1,23,45,678");
        assert_eq!(format_inr(1500.5), "₹1,500.50");
        assert_eq!(format_inr(-2500.0), "-₹2,500");
        assert_eq!(format_inr(f64::NAN), "₹0");
    }
}
