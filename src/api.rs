//! Automation webhook client.
//!
//! Fetches the fee analytics list and posts new fee submissions. The webhook
//! has answered in several envelope shapes over time, so list responses are
//! unwrapped tolerantly.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::FeesConfig;
use crate::error::{FeesError, FeesResult};

/// Envelope keys that may wrap the record array, in lookup order.
const LIST_ENVELOPE_KEYS: &[&str] = &["data", "transactions", "records", "items", "fees"];

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// Where fee records come from and where submissions go.
#[async_trait]
pub trait FeesSource: Send + Sync {
    async fn fetch_fees_analytics(&self) -> FeesResult<Vec<Value>>;

    async fn submit_fee_payment(&self, payload: &Value) -> FeesResult<Value>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the webhook host URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_webhook_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn join_path(base: &str, path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> FeesError {
    if err.is_connect() {
        return FeesError::Network(format!("Cannot reach fees webhook at {url}"));
    }
    if err.is_timeout() {
        return FeesError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return FeesError::InvalidUrl(url.to_string());
    }
    FeesError::Network(format!("Network error communicating with {url}: {err}"))
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 | 403 => "Webhook rejected the request credentials".to_string(),
        404 => "Fees webhook endpoint not found".to_string(),
        s if s >= 500 => "Fees webhook server error".to_string(),
        _ => "Unexpected response from fees webhook".to_string(),
    }
}

fn status_error(status: StatusCode, body_text: &str) -> FeesError {
    let trimmed = body_text.trim();
    let message = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| (!trimmed.is_empty()).then(|| format!("{}: {trimmed}", status_message(status))))
        .unwrap_or_else(|| status_message(status));
    FeesError::Status {
        status: status.as_u16(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Response unwrapping
// ---------------------------------------------------------------------------

pub(crate) fn unwrap_item(item: Value) -> Value {
    // n8n wraps each item as `{ "json": { ... } }`.
    match item {
        Value::Object(mut obj)
            if obj.len() == 1 && obj.get("json").is_some_and(Value::is_object) =>
        {
            obj.remove("json").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Pull the record array out of an analytics response body.
pub fn extract_records(body: Value) -> FeesResult<Vec<Value>> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            // A single wrapped envelope, e.g. `[{ "data": [...] }]`.
            let single_envelope = matches!(
                items.as_slice(),
                [Value::Object(obj)] if LIST_ENVELOPE_KEYS
                    .iter()
                    .any(|key| obj.get(*key).is_some_and(Value::is_array))
            );
            if single_envelope {
                return extract_records(items.into_iter().next().unwrap_or(Value::Null));
            }
            Ok(items
                .into_iter()
                .map(unwrap_item)
                .filter(Value::is_object)
                .collect())
        }
        Value::Object(mut obj) => {
            for key in LIST_ENVELOPE_KEYS {
                if obj.get(*key).is_some_and(Value::is_array) {
                    return extract_records(obj.remove(*key).unwrap_or(Value::Null));
                }
            }
            Err(FeesError::InvalidJson(
                "analytics response has no transaction list".to_string(),
            ))
        }
        _ => Err(FeesError::InvalidJson(
            "analytics response is not a list".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct WebhookClient {
    client: Client,
    base_url: String,
    analytics_path: String,
    submit_path: String,
}

impl WebhookClient {
    pub fn new(
        base_url: &str,
        analytics_path: &str,
        submit_path: &str,
        timeout: Duration,
    ) -> FeesResult<Self> {
        let base_url = normalize_webhook_url(base_url);
        if base_url.is_empty() {
            return Err(FeesError::Config(
                "Fees webhook not configured: missing base URL".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeesError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            analytics_path: analytics_path.to_string(),
            submit_path: submit_path.to_string(),
        })
    }

    pub fn from_config(config: &FeesConfig) -> FeesResult<Self> {
        Self::new(
            &config.webhook_base_url,
            &config.analytics_path,
            &config.submit_path,
            config.request_timeout(),
        )
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> FeesResult<Value> {
        let full_url = join_path(&self.base_url, path);
        let start = Instant::now();

        let mut req = self
            .client
            .request(method.clone(), &full_url)
            .header("Accept", "application/json");
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        debug!(
            method = %method,
            path = path,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Webhook call finished"
        );

        if !status.is_success() {
            return Err(status_error(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| FeesError::InvalidJson(e.to_string()))
    }
}

#[async_trait]
impl FeesSource for WebhookClient {
    async fn fetch_fees_analytics(&self) -> FeesResult<Vec<Value>> {
        let body = self.send(Method::GET, &self.analytics_path, None).await?;
        let records = extract_records(body)?;
        info!(count = records.len(), "Fetched fee analytics");
        Ok(records)
    }

    async fn submit_fee_payment(&self, payload: &Value) -> FeesResult<Value> {
        self.send(Method::POST, &self.submit_path, Some(payload)).await
    }
}

/// Source used when webhook calls are switched off; every call fails.
pub struct OfflineSource;

#[async_trait]
impl FeesSource for OfflineSource {
    async fn fetch_fees_analytics(&self) -> FeesResult<Vec<Value>> {
        Err(FeesError::Network("Offline mode: webhook calls are disabled".into()))
    }

    async fn submit_fee_payment(&self, _payload: &Value) -> FeesResult<Value> {
        Err(FeesError::Network("Offline mode: webhook calls are disabled".into()))
    }
}
