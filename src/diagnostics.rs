//! Diagnostics for Feedesk.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Engine status**: list phase, record counts, next receipt number
//! - **Logging setup**: console plus daily rolling log files, with pruning

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::FeeAnalyticsEngine;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "feedesk";

const DEFAULT_LOG_FILTER: &str = "info,feedesk_lib=debug";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

pub fn get_engine_status(engine: &FeeAnalyticsEngine) -> Value {
    json!({
        "phase": engine.phase(),
        "transactionCount": engine.transactions().len(),
        "undatedCount": engine.undated_count(),
        "pendingLocal": engine.pending_local(),
        "nextReceiptNumber": engine.next_receipt_number(),
        "fiscalYears": engine.fiscal_year_options(),
    })
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

/// Install the global subscriber: console plus a daily file under
/// `{data_dir}/logs`. Keep the returned guard alive until exit; dropping it
/// flushes the file writer.
pub fn init_logging(data_dir: &Path) -> std::io::Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let log_dir = get_log_dir(data_dir);
    prune_old_logs(&log_dir);
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeesConfig;

    #[test]
    fn test_about_info_has_required_fields() {
        let info = get_about_info();
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
    }

    #[test]
    fn test_engine_status_reports_counts() {
        let engine = FeeAnalyticsEngine::with_transactions(
            &FeesConfig::default(),
            vec![
                json!({ "amount": 10, "date": "02-04-2025", "receiptNumber": "GBIS-00041" }),
                json!({ "amount": 20, "date": "not a date" }),
            ],
        );
        let status = get_engine_status(&engine);
        assert_eq!(status["phase"], "authoritative");
        assert_eq!(status["transactionCount"], 2);
        assert_eq!(status["undatedCount"], 1);
        assert_eq!(status["nextReceiptNumber"], "GBIS-00042");
        assert_eq!(status["fiscalYears"], json!(["2025-2026"]));
    }

    #[test]
    fn test_prune_keeps_newest_logs_only() {
        let dir = std::env::temp_dir().join(format!("feedesk_logs_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..(MAX_LOG_FILES + 3) {
            std::fs::write(dir.join(format!("feedesk.2025-01-{:02}", i + 1)), "x").unwrap();
        }
        std::fs::write(dir.join("unrelated.txt"), "keep").unwrap();

        prune_old_logs(&dir);

        let remaining: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
            .collect();
        assert_eq!(remaining.len(), MAX_LOG_FILES);
        assert!(dir.join("unrelated.txt").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = std::env::temp_dir().join(format!("feedesk_none_{}", uuid::Uuid::new_v4()));
        prune_old_logs(&dir);
        assert!(!dir.exists());
    }

    #[test]
    fn test_log_dir_under_data_dir() {
        assert_eq!(
            get_log_dir(Path::new("/srv/feedesk")),
            PathBuf::from("/srv/feedesk/logs")
        );
    }
}
