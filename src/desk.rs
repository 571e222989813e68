//! Fee desk: the service the cashier screen talks to.
//!
//! Wires the webhook source, the shared engine, and the refresh scheduler.
//! A submission is posted first and only shown locally once the webhook has
//! accepted it; a reconcile is then scheduled to pick up the stored record.

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{self, FeesSource};
use crate::cache;
use crate::config::FeesConfig;
use crate::db::DbState;
use crate::engine::{FeeAnalyticsEngine, FeeReport, SharedEngine};
use crate::error::{FeesError, FeesResult};
use crate::filter::FeeFilter;
use crate::normalize::{format_submission_timestamp, FeeTransaction};
use crate::refresh::{RefreshOutcome, RefreshScheduler};

/// A payment as entered at the desk, before a receipt number is assigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePaymentDraft {
    #[serde(alias = "student_name", alias = "name")]
    pub student_name: String,
    #[serde(default, alias = "class_name", alias = "class")]
    pub class_name: String,
    pub amount: f64,
    #[serde(default, alias = "payment_mode", alias = "mode")]
    pub payment_mode: String,
    #[serde(default, alias = "reference_id", alias = "transactionId")]
    pub reference_id: Option<String>,
}

impl FeePaymentDraft {
    fn validate(&self) -> FeesResult<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(FeesError::Validation(
                "Amount must be greater than zero".into(),
            ));
        }
        if self.student_name.trim().is_empty() {
            return Err(FeesError::Validation("Student name is required".into()));
        }
        Ok(())
    }
}

pub struct Submission {
    pub transaction: FeeTransaction,
    /// Reconcile armed by this submission; resolves after the refresh delay.
    pub refresh: JoinHandle<RefreshOutcome>,
}

pub struct FeeDesk {
    source: Arc<dyn FeesSource>,
    engine: SharedEngine,
    scheduler: RefreshScheduler,
    cache: Option<Arc<DbState>>,
    zone_label: String,
}

impl FeeDesk {
    pub fn new(
        config: &FeesConfig,
        source: Arc<dyn FeesSource>,
        cache: Option<Arc<DbState>>,
    ) -> Self {
        let engine = FeeAnalyticsEngine::new(config).shared();
        let scheduler = RefreshScheduler::new(
            source.clone(),
            engine.clone(),
            cache.clone(),
            config.refresh_delay(),
        );
        Self {
            source,
            engine,
            scheduler,
            cache,
            zone_label: config.zone_label.clone(),
        }
    }

    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Warm the list from the last cached fetch. Returns the record count.
    pub fn hydrate_from_cache(&self) -> FeesResult<usize> {
        let Some(db) = self.cache.as_deref() else {
            return Ok(0);
        };
        let raw = cache::load_transactions(db)?;
        let count = raw.len();
        self.engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace_all(raw);
        info!(count = count, "Fee list hydrated from cache");
        Ok(count)
    }

    /// Fetch the full list now. On failure the list is left empty.
    pub async fn load(&self) -> FeesResult<usize> {
        self.scheduler.refresh_now().await
    }

    pub fn report(&self, filter: Option<&FeeFilter>) -> FeesResult<FeeReport> {
        let engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        Ok(engine.report(filter)?)
    }

    pub async fn submit_payment(&self, draft: FeePaymentDraft) -> FeesResult<Submission> {
        self.submit_payment_at(draft, Local::now().naive_local())
            .await
    }

    /// Submit with an explicit wall-clock time for the timestamp stamp.
    pub async fn submit_payment_at(
        &self,
        draft: FeePaymentDraft,
        at: NaiveDateTime,
    ) -> FeesResult<Submission> {
        draft.validate()?;

        let receipt_number = self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_receipt_number();
        let reference_id = draft
            .reference_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let payload = json!({
            "receiptNumber": receipt_number,
            "studentName": draft.student_name.trim(),
            "className": draft.class_name.trim(),
            "amount": draft.amount,
            "paymentMode": draft.payment_mode.trim(),
            "referenceId": reference_id,
            "timestamp": format_submission_timestamp(at, &self.zone_label),
        });

        let response = match self.source.submit_fee_payment(&payload).await {
            Ok(r) => r,
            Err(e) => {
                warn!(receipt = %receipt_number, error = %e, "Fee submission failed");
                return Err(e);
            }
        };

        let record = merge_response(payload, response);
        let transaction = self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append_local(record)
            .clone();
        info!(
            receipt = %transaction.receipt_number,
            amount = transaction.amount,
            "Fee submission accepted"
        );

        let refresh = self.scheduler.schedule();
        Ok(Submission {
            transaction,
            refresh,
        })
    }
}

/// Fill fields the webhook added (receipt link, server ids) into the local
/// record. Fields we sent are kept as sent.
fn merge_response(payload: Value, response: Value) -> Value {
    let response = match response {
        Value::Array(mut items) if items.len() == 1 => api::unwrap_item(items.remove(0)),
        other => api::unwrap_item(other),
    };
    let (Value::Object(mut record), Value::Object(extra)) = (payload.clone(), response) else {
        return payload;
    };
    for (key, value) in extra {
        if !record.contains_key(&key) && !value.is_null() {
            record.insert(key, value);
        }
    }
    Value::Object(record)
}
