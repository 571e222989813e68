//! Runtime configuration.
//!
//! Layered: built-in defaults, then `fees/*` rows in `local_settings`, then
//! `FEEDESK_*` environment variables.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::db;
use crate::error::{FeesError, FeesResult};
use crate::fiscal::{FiscalCalendar, DEFAULT_FISCAL_START_MONTH0};
use crate::receipt::{ReceiptSequencer, DEFAULT_MIN_RECEIPT_WIDTH, DEFAULT_RECEIPT_PREFIX};

const SETTINGS_CATEGORY: &str = "fees";

/// Setting key -> environment variable.
const OVERRIDE_KEYS: &[(&str, &str)] = &[
    ("webhook_base_url", "FEEDESK_WEBHOOK_URL"),
    ("analytics_path", "FEEDESK_ANALYTICS_PATH"),
    ("submit_path", "FEEDESK_SUBMIT_PATH"),
    ("receipt_prefix", "FEEDESK_RECEIPT_PREFIX"),
    ("min_receipt_width", "FEEDESK_MIN_RECEIPT_WIDTH"),
    ("fiscal_start_month0", "FEEDESK_FISCAL_START_MONTH0"),
    ("zone_label", "FEEDESK_ZONE_LABEL"),
    ("refresh_delay_ms", "FEEDESK_REFRESH_DELAY_MS"),
    ("request_timeout_secs", "FEEDESK_REQUEST_TIMEOUT_SECS"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeesConfig {
    /// Base URL of the automation webhook host.
    pub webhook_base_url: String,
    pub analytics_path: String,
    pub submit_path: String,
    pub receipt_prefix: String,
    pub min_receipt_width: usize,
    /// Zero-based month the fiscal year starts in (3 = April).
    pub fiscal_start_month0: u32,
    /// Literal appended to submission timestamps; not used for offsets.
    pub zone_label: String,
    /// Delay before the full refetch that follows a local submission.
    pub refresh_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            webhook_base_url: String::new(),
            analytics_path: "/webhook/fees-analytics".to_string(),
            submit_path: "/webhook/fees-submit".to_string(),
            receipt_prefix: DEFAULT_RECEIPT_PREFIX.to_string(),
            min_receipt_width: DEFAULT_MIN_RECEIPT_WIDTH,
            fiscal_start_month0: DEFAULT_FISCAL_START_MONTH0,
            zone_label: "IST".to_string(),
            refresh_delay_ms: 3_000,
            request_timeout_secs: 30,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> FeesResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| FeesError::Config(format!("{key} must be a number, got {value:?}")))
}

impl FeesConfig {
    /// Defaults, then stored settings (when a connection is given), then env.
    pub fn load(conn: Option<&Connection>) -> FeesResult<Self> {
        let mut config = Self::default();
        if let Some(conn) = conn {
            config.apply_settings(conn)?;
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_override(&mut self, key: &str, value: &str) -> FeesResult<()> {
        match key {
            "webhook_base_url" => self.webhook_base_url = value.trim().to_string(),
            "analytics_path" => self.analytics_path = value.trim().to_string(),
            "submit_path" => self.submit_path = value.trim().to_string(),
            "receipt_prefix" => self.receipt_prefix = value.trim().to_string(),
            "min_receipt_width" => self.min_receipt_width = parse_number(key, value)?,
            "fiscal_start_month0" => self.fiscal_start_month0 = parse_number(key, value)?,
            "zone_label" => self.zone_label = value.trim().to_string(),
            "refresh_delay_ms" => self.refresh_delay_ms = parse_number(key, value)?,
            "request_timeout_secs" => self.request_timeout_secs = parse_number(key, value)?,
            other => return Err(FeesError::Config(format!("Unknown setting: {other}"))),
        }
        Ok(())
    }

    pub fn apply_settings(&mut self, conn: &Connection) -> FeesResult<()> {
        for (key, _) in OVERRIDE_KEYS {
            if let Some(value) = db::get_setting(conn, SETTINGS_CATEGORY, key) {
                debug!(key = key, "Applying stored fee setting");
                self.apply_override(key, &value)?;
            }
        }
        Ok(())
    }

    pub fn apply_env(&mut self) -> FeesResult<()> {
        for (key, env_var) in OVERRIDE_KEYS {
            if let Ok(value) = std::env::var(env_var) {
                if value.trim().is_empty() {
                    continue;
                }
                debug!(env = env_var, "Applying environment override");
                self.apply_override(key, &value)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> FeesResult<()> {
        if self.receipt_prefix.is_empty() {
            return Err(FeesError::Config("receipt_prefix cannot be empty".into()));
        }
        if self.receipt_prefix.contains(char::is_whitespace) {
            return Err(FeesError::Config(
                "receipt_prefix cannot contain whitespace".into(),
            ));
        }
        if !(1..=12).contains(&self.min_receipt_width) {
            return Err(FeesError::Config(
                "min_receipt_width must be between 1 and 12".into(),
            ));
        }
        if self.fiscal_start_month0 > 11 {
            return Err(FeesError::Config(
                "fiscal_start_month0 must be between 0 and 11".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(FeesError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Validate `key = value` against the current config, then persist it.
    pub fn store_setting(&mut self, conn: &Connection, key: &str, value: &str) -> FeesResult<()> {
        let mut candidate = self.clone();
        candidate.apply_override(key, value)?;
        candidate.validate()?;
        db::set_setting(conn, SETTINGS_CATEGORY, key, value.trim())?;
        *self = candidate;
        Ok(())
    }

    pub fn sequencer(&self) -> ReceiptSequencer {
        ReceiptSequencer::new(&self.receipt_prefix, self.min_receipt_width)
    }

    pub fn calendar(&self) -> FiscalCalendar {
        FiscalCalendar::new(self.fiscal_start_month0)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for (_, env_var) in OVERRIDE_KEYS {
            std::env::remove_var(env_var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = FeesConfig::load(None).unwrap();
        assert_eq!(config.receipt_prefix, "GBIS");
        assert_eq!(config.min_receipt_width, 5);
        assert_eq!(config.fiscal_start_month0, 3);
        assert_eq!(config.refresh_delay(), Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn test_settings_then_env_precedence() {
        clear_env();
        let db = db::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "receipt_prefix", "SCH").unwrap();
        db::set_setting(&conn, SETTINGS_CATEGORY, "refresh_delay_ms", "500").unwrap();

        let config = FeesConfig::load(Some(&*conn)).unwrap();
        assert_eq!(config.receipt_prefix, "SCH");
        assert_eq!(config.refresh_delay_ms, 500);

        std::env::set_var("FEEDESK_RECEIPT_PREFIX", "ENV");
        let config = FeesConfig::load(Some(&*conn)).unwrap();
        assert_eq!(config.receipt_prefix, "ENV");
        assert_eq!(config.refresh_delay_ms, 500);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_config_error() {
        clear_env();
        std::env::set_var("FEEDESK_MIN_RECEIPT_WIDTH", "wide");
        let err = FeesConfig::load(None).unwrap_err();
        assert!(matches!(err, FeesError::Config(_)));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = FeesConfig {
            fiscal_start_month0: 12,
            ..FeesConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FeesConfig {
            receipt_prefix: "GB IS".into(),
            ..FeesConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = FeesConfig::default();
        assert!(config.apply_override("colour", "blue").is_err());
    }

    #[test]
    fn test_store_setting_validates_before_saving() {
        let db = db::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let mut config = FeesConfig::default();

        assert!(config.store_setting(&conn, "fiscal_start_month0", "14").is_err());
        assert!(db::get_setting(&conn, SETTINGS_CATEGORY, "fiscal_start_month0").is_none());
        assert_eq!(config.fiscal_start_month0, 3);

        config.store_setting(&conn, "zone_label", " UTC ").unwrap();
        assert_eq!(config.zone_label, "UTC");
        assert_eq!(
            db::get_setting(&conn, SETTINGS_CATEGORY, "zone_label").as_deref(),
            Some("UTC")
        );
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: FeesConfig = serde_json::from_value(serde_json::json!({
            "webhookBaseUrl": "https://hooks.example.org",
            "refreshDelayMs": 1000
        }))
        .unwrap();
        assert_eq!(config.webhook_base_url, "https://hooks.example.org");
        assert_eq!(config.refresh_delay_ms, 1000);
        assert_eq!(config.receipt_prefix, "GBIS");
    }
}
