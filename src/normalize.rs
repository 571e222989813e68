//! Date and field normalisation for fee transactions.
//!
//! The webhook schema has changed several times, so every canonical field is
//! looked up through an ordered alias list, and dates arrive in a handful of
//! textual shapes. Nothing in here fails: unknown shapes decline with `None`
//! and missing fields fall back to typed defaults.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Placeholder for missing display strings.
pub const NOT_AVAILABLE: &str = "N/A";

// ---------------------------------------------------------------------------
// Timestamp parsing
// ---------------------------------------------------------------------------

/// Which textual shape a timestamp matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `DD-MM-YYYYTHH:mm:ss ZONE`; the zone label is kept as a literal and
    /// the time is read as wall-clock local time.
    DashDateTimeZoned,
    /// `DD-MM-YYYYTHH:mm:ss`
    DashDateTime,
    /// `DD-MM-YYYY`
    DashDate,
    /// `DD/MM/YYYY` (legacy)
    SlashDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTimestamp {
    pub value: NaiveDateTime,
    pub format: DateFormat,
    pub zone_label: Option<String>,
}

struct DateMatcher {
    format: DateFormat,
    re: Regex,
}

/// Matchers in priority order. Day and month accept one or two digits.
const DATE_PATTERNS: &[(DateFormat, &str)] = &[
    (
        DateFormat::DashDateTimeZoned,
        r"^(\d{1,2})-(\d{1,2})-(\d{4})T(\d{1,2}):(\d{2}):(\d{2})\s+([A-Za-z][A-Za-z0-9+:/_-]*)$",
    ),
    (
        DateFormat::DashDateTime,
        r"^(\d{1,2})-(\d{1,2})-(\d{4})T(\d{1,2}):(\d{2}):(\d{2})$",
    ),
    (DateFormat::DashDate, r"^(\d{1,2})-(\d{1,2})-(\d{4})$"),
    (DateFormat::SlashDate, r"^(\d{1,2})/(\d{1,2})/(\d{4})$"),
];

fn date_matchers() -> &'static [DateMatcher] {
    static MATCHERS: OnceLock<Vec<DateMatcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        DATE_PATTERNS
            .iter()
            .filter_map(|(format, pattern)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| DateMatcher { format: *format, re })
            })
            .collect()
    })
}

fn capture_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok())
}

impl DateMatcher {
    fn try_parse(&self, raw: &str) -> Option<ParsedTimestamp> {
        let caps = self.re.captures(raw)?;
        let day = capture_u32(&caps, 1)?;
        let month = capture_u32(&caps, 2)?;
        let year = caps.get(3)?.as_str().parse::<i32>().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        let (hour, minute, second) = match self.format {
            DateFormat::DashDateTimeZoned | DateFormat::DashDateTime => (
                capture_u32(&caps, 4)?,
                capture_u32(&caps, 5)?,
                capture_u32(&caps, 6)?,
            ),
            DateFormat::DashDate | DateFormat::SlashDate => (0, 0, 0),
        };
        let value = date.and_hms_opt(hour, minute, second)?;
        let zone_label = match self.format {
            DateFormat::DashDateTimeZoned => caps.get(7).map(|m| m.as_str().to_string()),
            _ => None,
        };

        Some(ParsedTimestamp {
            value,
            format: self.format,
            zone_label,
        })
    }
}

/// Parse a timestamp, reporting which format matched.
pub fn parse_timestamp_detailed(raw: &str) -> Option<ParsedTimestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    date_matchers().iter().find_map(|m| m.try_parse(trimmed))
}

/// Parse a timestamp in any supported shape. `None` means "exclude from
/// date-based queries".
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp_detailed(raw).map(|p| p.value)
}

pub fn format_date_ddmmyyyy(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Timestamp in the shape the webhook stores for new submissions.
pub fn format_submission_timestamp(at: NaiveDateTime, zone_label: &str) -> String {
    let base = at.format("%d-%m-%YT%H:%M:%S").to_string();
    let zone = zone_label.trim();
    if zone.is_empty() {
        base
    } else {
        format!("{base} {zone}")
    }
}

// ---------------------------------------------------------------------------
// Field aliases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeField {
    Amount,
    Timestamp,
    Date,
    StudentName,
    PaymentMode,
    ReceiptNumber,
    ReceiptLink,
    ReferenceId,
    ClassName,
}

/// Canonical field -> accepted keys, most recent schema first.
pub const FIELD_ALIASES: &[(FeeField, &[&str])] = &[
    (
        FeeField::Amount,
        &[
            "amount",
            "Amount",
            "amountPaid",
            "amount_paid",
            "feeAmount",
            "fee_amount",
            "Fee Amount",
        ],
    ),
    (
        FeeField::Timestamp,
        &["timestamp", "Timestamp", "submittedAt", "submitted_at", "createdAt", "created_at"],
    ),
    (
        FeeField::Date,
        &["date", "Date", "paymentDate", "payment_date", "Payment Date"],
    ),
    (
        FeeField::StudentName,
        &["studentName", "student_name", "Student Name", "name", "Name"],
    ),
    (
        FeeField::PaymentMode,
        &["paymentMode", "payment_mode", "Payment Mode", "mode", "Mode"],
    ),
    (
        FeeField::ReceiptNumber,
        &[
            "receiptNumber",
            "receipt_number",
            "receiptNo",
            "receipt_no",
            "Receipt Number",
            "Receipt No",
        ],
    ),
    (
        FeeField::ReceiptLink,
        &[
            "receiptLink",
            "receipt_link",
            "receiptUrl",
            "receipt_url",
            "pdfLink",
            "Receipt Link",
        ],
    ),
    (
        FeeField::ReferenceId,
        &[
            "referenceId",
            "reference_id",
            "transactionId",
            "transaction_id",
            "Reference ID",
            "Transaction ID",
        ],
    ),
    (
        FeeField::ClassName,
        &["className", "class_name", "class", "Class", "grade"],
    ),
];

pub fn aliases(field: FeeField) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

/// First present value for `field`: nulls and blank strings count as absent.
///
/// The webhook export writes unset form fields as `""` under the canonical key
/// while the real value sits under a legacy alias, so a blank must fall through
/// to the next alias (and finally to the field's default) like a missing key.
pub fn lookup(raw: &Value, field: FeeField) -> Option<&Value> {
    aliases(field).iter().find_map(|key| match raw.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    })
}

fn lookup_text(raw: &Value, field: FeeField) -> Option<String> {
    match lookup(raw, field)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_amount_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('₹')
        .trim_start_matches("Rs.")
        .trim_start_matches("Rs")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok()
}

pub fn get_amount(raw: &Value) -> f64 {
    let amount = match lookup(raw, FeeField::Amount) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_amount_text(s),
        _ => None,
    };
    amount.filter(|a| a.is_finite()).unwrap_or(0.0)
}

/// Canonical moment: the full timestamp when it parses, else the date-only
/// field.
pub fn get_date(raw: &Value) -> Option<NaiveDateTime> {
    lookup_text(raw, FeeField::Timestamp)
        .and_then(|s| parse_timestamp(&s))
        .or_else(|| lookup_text(raw, FeeField::Date).and_then(|s| parse_timestamp(&s)))
}

pub fn get_name(raw: &Value) -> String {
    lookup_text(raw, FeeField::StudentName).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn get_mode(raw: &Value) -> String {
    lookup_text(raw, FeeField::PaymentMode).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn get_receipt_number(raw: &Value) -> String {
    lookup_text(raw, FeeField::ReceiptNumber).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn get_receipt_link(raw: &Value) -> Option<String> {
    lookup_text(raw, FeeField::ReceiptLink)
}

pub fn get_reference_id(raw: &Value) -> String {
    lookup_text(raw, FeeField::ReferenceId).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn get_class_name(raw: &Value) -> String {
    lookup_text(raw, FeeField::ClassName).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

// ---------------------------------------------------------------------------
// Normalised record
// ---------------------------------------------------------------------------

/// One fee payment, normalised at ingestion. The raw record is kept so it
/// can be written back to the cache untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTransaction {
    pub amount: f64,
    pub occurred_at: Option<NaiveDateTime>,
    pub student_name: String,
    pub payment_mode: String,
    pub class_name: String,
    pub receipt_number: String,
    pub receipt_link: Option<String>,
    pub reference_id: String,
    #[serde(skip)]
    pub raw: Value,
}

impl FeeTransaction {
    pub fn from_value(raw: Value) -> Self {
        Self {
            amount: get_amount(&raw),
            occurred_at: get_date(&raw),
            student_name: get_name(&raw),
            payment_mode: get_mode(&raw),
            class_name: get_class_name(&raw),
            receipt_number: get_receipt_number(&raw),
            receipt_link: get_receipt_link(&raw),
            reference_id: get_reference_id(&raw),
            raw,
        }
    }

    pub fn has_valid_date(&self) -> bool {
        self.occurred_at.is_some()
    }

    pub fn receipt_ready(&self) -> bool {
        self.receipt_link.is_some()
    }
}

pub fn normalize_all(raw: Vec<Value>) -> Vec<FeeTransaction> {
    raw.into_iter().map(FeeTransaction::from_value).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_parse_zoned_timestamp_ignores_zone_offset() {
        let parsed = parse_timestamp_detailed("05-04-2025T14:30:15 IST").unwrap();
        assert_eq!(parsed.format, DateFormat::DashDateTimeZoned);
        assert_eq!(parsed.zone_label.as_deref(), Some("IST"));
        assert_eq!(parsed.value.day(), 5);
        assert_eq!(parsed.value.month(), 4);
        assert_eq!(parsed.value.year(), 2025);
        assert_eq!(parsed.value.hour(), 14);
        assert_eq!(parsed.value.second(), 15);
    }

    #[test]
    fn test_parse_formats_in_priority_order() {
        assert_eq!(
            parse_timestamp_detailed("05-04-2025T09:00:00").unwrap().format,
            DateFormat::DashDateTime
        );
        let date_only = parse_timestamp_detailed("05-04-2025").unwrap();
        assert_eq!(date_only.format, DateFormat::DashDate);
        assert_eq!(date_only.value.hour(), 0);
        let legacy = parse_timestamp_detailed("  31/03/2024 ").unwrap();
        assert_eq!(legacy.format, DateFormat::SlashDate);
        assert_eq!(legacy.value.month(), 3);
    }

    #[test]
    fn test_parse_rejects_unknown_shapes() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2025-04-05").is_none());
        assert!(parse_timestamp("2025-04-05T10:00:00Z").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("31-02-2025").is_none());
        assert!(parse_timestamp("05-04-2025T25:00:00").is_none());
    }

    #[test]
    fn test_ddmmyyyy_round_trip() {
        for (y, m, d) in [(2024, 2, 29), (2025, 12, 31), (2025, 1, 1), (1999, 7, 9)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let parsed = parse_timestamp(&format_date_ddmmyyyy(date)).unwrap();
            assert_eq!(parsed.date(), date);
        }
    }

    #[test]
    fn test_submission_timestamp_round_trip() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 3)
            .unwrap()
            .and_hms_opt(8, 5, 9)
            .unwrap();
        let text = format_submission_timestamp(at, "IST");
        assert_eq!(text, "03-06-2025T08:05:09 IST");
        assert_eq!(parse_timestamp(&text), Some(at));
        assert_eq!(format_submission_timestamp(at, ""), "03-06-2025T08:05:09");
    }

    #[test]
    fn test_lookup_prefers_first_alias_and_skips_blank() {
        let raw = json!({ "studentName": "  ", "student_name": null, "Name": "Asha" });
        assert_eq!(get_name(&raw), "Asha");

        let raw = json!({ "studentName": "Ravi", "name": "Other" });
        assert_eq!(get_name(&raw), "Ravi");
    }

    #[test]
    fn test_amount_coercion() {
        assert_eq!(get_amount(&json!({ "amount": 1500 })), 1500.0);
        assert_eq!(get_amount(&json!({ "Amount": "1,250.50" })), 1250.5);
        assert_eq!(get_amount(&json!({ "amount_paid": "₹ 2,000" })), 2000.0);
        assert_eq!(get_amount(&json!({ "amount": "abc" })), 0.0);
        assert_eq!(get_amount(&json!({ "amount": [1] })), 0.0);
        assert_eq!(get_amount(&json!({})), 0.0);
    }

    #[test]
    fn test_get_date_falls_back_to_date_field() {
        let raw = json!({ "timestamp": "garbage", "date": "10/11/2024" });
        let at = get_date(&raw).unwrap();
        assert_eq!((at.day(), at.month(), at.year()), (10, 11, 2024));

        let raw = json!({ "timestamp": "10-11-2024T10:20:30 IST", "date": "01-01-2000" });
        assert_eq!(get_date(&raw).unwrap().hour(), 10);

        assert!(get_date(&json!({ "date": "soon" })).is_none());
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let tx = FeeTransaction::from_value(json!({}));
        assert_eq!(tx.amount, 0.0);
        assert!(tx.occurred_at.is_none());
        assert_eq!(tx.student_name, NOT_AVAILABLE);
        assert_eq!(tx.payment_mode, NOT_AVAILABLE);
        assert_eq!(tx.receipt_number, NOT_AVAILABLE);
        assert_eq!(tx.reference_id, NOT_AVAILABLE);
        assert!(tx.receipt_link.is_none());
        assert!(!tx.receipt_ready());
    }

    #[test]
    fn test_numeric_reference_id_is_stringified() {
        let tx = FeeTransaction::from_value(json!({ "transaction_id": 99812 }));
        assert_eq!(tx.reference_id, "99812");
    }

    #[test]
    fn test_every_field_has_aliases() {
        for field in [
            FeeField::Amount,
            FeeField::Timestamp,
            FeeField::Date,
            FeeField::StudentName,
            FeeField::PaymentMode,
            FeeField::ReceiptNumber,
            FeeField::ReceiptLink,
            FeeField::ReferenceId,
            FeeField::ClassName,
        ] {
            assert!(!aliases(field).is_empty(), "{field:?} has no aliases");
        }
    }
}
