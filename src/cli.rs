//! Command line front end for the fee desk.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{FeesSource, OfflineSource, WebhookClient};
use crate::config::FeesConfig;
use crate::db::{self, DbState};
use crate::desk::{FeeDesk, FeePaymentDraft};
use crate::diagnostics;
use crate::filter::{FeeFilter, FilterError, FilterRequest};
use crate::refresh::RefreshOutcome;

#[derive(Debug, Parser)]
#[command(name = "feedesk")]
#[command(about = "Fee collection analytics for the school admin dashboard")]
#[command(version)]
pub struct Cli {
    /// Directory holding the local database and logs
    #[arg(long, env = "FEEDESK_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Use the cached fee list only; no webhook calls
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Persist a setting override (e.g. `webhook_base_url`)
    Set { key: String, value: String },
    #[command(flatten)]
    Desk(DeskCommand),
}

/// Commands that run against a loaded fee list.
#[derive(Debug, Subcommand)]
pub enum DeskCommand {
    /// Summarise fees, optionally narrowed by a filter
    Report(FilterArgs),
    /// Fiscal years and months available for filtering
    Options,
    /// Receipt number the next submission will get
    NextReceipt,
    /// Record a fee payment
    Submit {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "")]
        class: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Cash")]
        mode: String,
        #[arg(long)]
        reference: Option<String>,
        /// Return without waiting for the follow-up refresh
        #[arg(long)]
        no_wait: bool,
    },
    /// Build info and list state
    Status,
}

#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    /// range, monthly, or yearly
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub month: Option<String>,
    /// Fiscal year label, e.g. 2025-2026
    #[arg(long)]
    pub fiscal_year: Option<String>,
}

impl FilterArgs {
    /// `None` when no filter flag was given.
    pub fn to_filter(&self) -> Result<Option<FeeFilter>, FilterError> {
        let empty = self.mode.is_none()
            && self.from.is_none()
            && self.to.is_none()
            && self.month.is_none()
            && self.fiscal_year.is_none();
        if empty {
            return Ok(None);
        }
        let mode = self.mode.clone().or_else(|| {
            if self.month.is_some() {
                Some("monthly".to_string())
            } else if self.fiscal_year.is_some() {
                Some("yearly".to_string())
            } else {
                None
            }
        });
        FilterRequest {
            mode,
            from: self.from.clone(),
            to: self.to.clone(),
            month: self.month.clone(),
            fiscal_year: self.fiscal_year.clone(),
        }
        .into_filter()
        .map(Some)
    }
}

pub async fn execute(cli: Cli) -> Result<Value> {
    let db = Arc::new(db::init(&cli.data_dir).context("Failed to open local database")?);
    let mut config = {
        let conn = db.conn.lock().unwrap_or_else(|e| e.into_inner());
        FeesConfig::load(Some(&*conn))?
    };

    let command = cli
        .command
        .unwrap_or(Command::Desk(DeskCommand::Report(FilterArgs::default())));
    match command {
        Command::Set { key, value } => {
            let conn = db.conn.lock().unwrap_or_else(|e| e.into_inner());
            config.store_setting(&conn, &key, &value)?;
            info!(key = %key, "Setting saved");
            Ok(json!({ "saved": key, "config": config }))
        }
        Command::Desk(command) => run_desk_command(command, &config, db, cli.offline).await,
    }
}

async fn run_desk_command(
    command: DeskCommand,
    config: &FeesConfig,
    db: Arc<DbState>,
    offline: bool,
) -> Result<Value> {
    let source: Arc<dyn FeesSource> = if offline {
        Arc::new(OfflineSource)
    } else {
        Arc::new(WebhookClient::from_config(config)?)
    };
    let desk = FeeDesk::new(config, source, Some(db));

    // A failed fetch leaves the list empty; it is reported alongside the output.
    let fetch_error = if offline {
        let cached = desk.hydrate_from_cache()?;
        info!(count = cached, "Fee list hydrated from cache");
        None
    } else {
        match desk.load().await {
            Ok(count) => {
                info!(count = count, "Fee list loaded");
                None
            }
            Err(e) => {
                warn!(error = %e, "Fee analytics load failed, continuing with an empty list");
                Some(e.to_string())
            }
        }
    };

    let mut output = match command {
        DeskCommand::Report(args) => {
            let filter = args.to_filter()?;
            serde_json::to_value(desk.report(filter.as_ref())?)?
        }
        DeskCommand::Options => {
            let engine = desk.engine();
            let guard = engine.lock().unwrap_or_else(|e| e.into_inner());
            let months: Vec<&str> = guard.month_options().iter().map(|m| m.name()).collect();
            json!({ "fiscalYears": guard.fiscal_year_options(), "months": months })
        }
        DeskCommand::NextReceipt => {
            let engine = desk.engine();
            let next = engine
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .next_receipt_number();
            json!({ "receiptNumber": next })
        }
        DeskCommand::Submit {
            student,
            class,
            amount,
            mode,
            reference,
            no_wait,
        } => {
            let draft = FeePaymentDraft {
                student_name: student,
                class_name: class,
                amount,
                payment_mode: mode,
                reference_id: reference,
            };
            let submission = desk.submit_payment(draft).await?;
            let reconciled = if no_wait {
                false
            } else {
                match submission.refresh.await? {
                    RefreshOutcome::Applied(_) => true,
                    RefreshOutcome::Superseded => false,
                    RefreshOutcome::Failed(e) => {
                        warn!(error = %e, "Refresh after submission failed");
                        false
                    }
                }
            };
            json!({ "transaction": submission.transaction, "reconciled": reconciled })
        }
        DeskCommand::Status => {
            let engine = desk.engine();
            let guard = engine.lock().unwrap_or_else(|e| e.into_inner());
            json!({
                "about": diagnostics::get_about_info(),
                "engine": diagnostics::get_engine_status(&guard),
                "webhook": config.webhook_base_url,
                "offline": offline,
            })
        }
    };

    if let (Some(err), Value::Object(map)) = (fetch_error, &mut output) {
        map.insert("fetchError".to_string(), Value::String(err));
    }
    Ok(output)
}
