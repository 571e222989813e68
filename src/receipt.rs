//! Receipt number sequencing.
//!
//! Receipt numbers look like `GBIS-00042`. The next number is derived from
//! the highest suffix seen anywhere in the list (which may arrive unsorted),
//! keeping the widest zero-padding seen so far. This is a client-side aid
//! only: two sessions submitting at the same moment can compute the same
//! number, and nothing here detects that.

use crate::normalize::FeeTransaction;

pub const DEFAULT_RECEIPT_PREFIX: &str = "GBIS";
pub const DEFAULT_MIN_RECEIPT_WIDTH: usize = 5;

#[derive(Debug, Clone)]
pub struct ReceiptSequencer {
    prefix: String,
    min_width: usize,
}

impl Default for ReceiptSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIPT_PREFIX, DEFAULT_MIN_RECEIPT_WIDTH)
    }
}

impl ReceiptSequencer {
    pub fn new(prefix: &str, min_width: usize) -> Self {
        Self {
            prefix: prefix.trim().to_string(),
            min_width: min_width.max(1),
        }
    }

    /// Numeric suffix and its digit count, for numbers in this sequence.
    pub fn parse(&self, receipt_number: &str) -> Option<(u64, usize)> {
        let digits = receipt_number
            .trim()
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value = digits.parse::<u64>().ok()?;
        Some((value, digits.len()))
    }

    pub fn format(&self, value: u64, width: usize) -> String {
        let width = width.max(self.min_width);
        format!("{}-{:0width$}", self.prefix, value, width = width)
    }

    pub fn next<'a, I>(&self, records: I) -> String
    where
        I: IntoIterator<Item = &'a FeeTransaction>,
    {
        let (max, width) = records
            .into_iter()
            .filter_map(|tx| self.parse(&tx.receipt_number))
            .fold((0u64, self.min_width), |(max, width), (value, digits)| {
                (max.max(value), width.max(digits))
            });
        self.format(max.saturating_add(1), width)
    }
}

/// Next receipt number with the default `GBIS` prefix and width 5.
pub fn next_receipt_number<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a FeeTransaction>,
{
    ReceiptSequencer::default().next(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_receipts(numbers: &[&str]) -> Vec<FeeTransaction> {
        numbers
            .iter()
            .map(|n| FeeTransaction::from_value(json!({ "receiptNumber": n })))
            .collect()
    }

    #[test]
    fn test_next_after_unsorted_history() {
        let recs = with_receipts(&["GBIS-00007", "GBIS-00003"]);
        assert_eq!(next_receipt_number(&recs), "GBIS-00008");
    }

    #[test]
    fn test_first_receipt_when_empty() {
        let recs: Vec<FeeTransaction> = Vec::new();
        assert_eq!(next_receipt_number(&recs), "GBIS-00001");
    }

    #[test]
    fn test_ignores_foreign_and_malformed_numbers() {
        let recs = with_receipts(&["XYZ-00099", "GBIS-", "GBIS-12a", "N/A", "GBIS-00010"]);
        assert_eq!(next_receipt_number(&recs), "GBIS-00011");

        let recs = with_receipts(&["legacy-77"]);
        assert_eq!(next_receipt_number(&recs), "GBIS-00001");
    }

    #[test]
    fn test_keeps_widest_padding() {
        let recs = with_receipts(&["GBIS-0000041", "GBIS-00040"]);
        assert_eq!(next_receipt_number(&recs), "GBIS-0000042");
    }

    #[test]
    fn test_grows_past_padding() {
        let recs = with_receipts(&["GBIS-99999"]);
        assert_eq!(next_receipt_number(&recs), "GBIS-100000");
    }

    #[test]
    fn test_custom_prefix_matches_literally() {
        let seq = ReceiptSequencer::new("FEE.2025", 4);
        let recs = with_receipts(&["FEE.2025-0012", "FEEX2025-0099"]);
        assert_eq!(seq.next(&recs), "FEE.2025-0013");
        assert_eq!(seq.parse("FEE.2025-0012"), Some((12, 4)));
    }
}
