//! Feedesk - fee collection analytics for the school admin dashboard.
//!
//! Fee records arrive from an automation webhook in loosely shaped JSON.
//! They are normalised once at ingestion (`normalize`), then filtered by
//! date range, month, or fiscal year (`filter`, `fiscal`), summarised
//! (`summary`), and used to derive the next receipt number (`receipt`).
//! `engine` owns the list for a session; `desk` and `refresh` handle local
//! submissions and the delayed full refetch that follows them.

use anyhow::Context;
use clap::Parser;
use tracing::info;

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod desk;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fiscal;
pub mod normalize;
pub mod receipt;
pub mod refresh;
pub mod summary;

pub use config::FeesConfig;
pub use desk::{FeeDesk, FeePaymentDraft};
pub use engine::{FeeAnalyticsEngine, FeeReport, ListPhase, SharedEngine};
pub use error::{FeesError, FeesResult};
pub use filter::{FeeFilter, FilterError, FilterRequest};
pub use fiscal::FiscalCalendar;
pub use normalize::FeeTransaction;
pub use receipt::{next_receipt_number, ReceiptSequencer};
pub use summary::{summarize, SummaryResult};

// ============================================================================
// Entry point
// ============================================================================

pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Dropping the guard flushes the file writer, so hold it until exit.
    let _guard =
        diagnostics::init_logging(&cli.data_dir).context("Failed to initialise logging")?;

    info!("Starting Feedesk v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let output = runtime.block_on(cli::execute(cli))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
