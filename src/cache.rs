//! Local cache of the last fee list fetched from the webhook.
//!
//! Stored as raw JSON so records round-trip untouched. A missing or corrupt
//! cache reads as an empty list.

use serde_json::Value;
use tracing::warn;

use crate::db::{self, DbState};
use crate::error::{FeesError, FeesResult};

const CACHE_CATEGORY: &str = "cache";
const FEES_KEY: &str = "fees_analytics";

pub(crate) fn read_local_json(db: &DbState, key: &str) -> FeesResult<Value> {
    let conn = db.conn.lock().map_err(|e| FeesError::Cache(e.to_string()))?;
    let Some(raw) = db::get_setting(&conn, CACHE_CATEGORY, key) else {
        return Ok(Value::Null);
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            warn!(key = key, error = %e, "Discarding corrupt cache entry");
            Ok(Value::Null)
        }
    }
}

pub(crate) fn write_local_json(db: &DbState, key: &str, value: &Value) -> FeesResult<()> {
    let conn = db.conn.lock().map_err(|e| FeesError::Cache(e.to_string()))?;
    db::set_setting(&conn, CACHE_CATEGORY, key, &value.to_string())
}

pub fn load_transactions(db: &DbState) -> FeesResult<Vec<Value>> {
    let parsed = read_local_json(db, FEES_KEY)?;
    Ok(parsed.as_array().cloned().unwrap_or_default())
}

pub fn store_transactions(db: &DbState, records: &[Value]) -> FeesResult<()> {
    write_local_json(db, FEES_KEY, &Value::Array(records.to_vec()))
}

pub fn clear_transactions(db: &DbState) -> FeesResult<()> {
    let conn = db.conn.lock().map_err(|e| FeesError::Cache(e.to_string()))?;
    db::delete_setting(&conn, CACHE_CATEGORY, FEES_KEY)
}
