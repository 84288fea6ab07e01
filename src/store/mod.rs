//! Store abstraction layer
//!
//! The taproom owns no persistence of its own. Every read and write goes to
//! a hosted Postgres database through its REST interface, or to an
//! in-process store for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use std::time::Duration;

use crate::types::{NewTap, PourParams, TapId};
use crate::Result;

pub mod memory;
pub mod postgrest;

/// Remote procedure that records a pour and decrements stock in one transaction
pub const POUR_PROCEDURE: &str = "log_pour_and_decrement";

/// Remote procedure that applies a clamped counter change in one statement
pub const ADJUST_PROCEDURE: &str = "adjust_pours_remaining";

/// Operations the handlers need from the inventory store
#[async_trait]
pub trait TapStore: Send + Sync {
    /// Current remaining pours, or `None` when no tap has this id.
    /// A stored `null` counter reads as zero.
    async fn fetch_pours_remaining(&self, id: &TapId) -> Result<Option<i64>>;

    /// Overwrite the remaining pours and the update timestamp
    async fn update_pours_remaining(
        &self,
        id: &TapId,
        pours_remaining: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Apply `max(0, pours_remaining + change)` atomically and return the new
    /// value, or `None` when no tap has this id.
    async fn adjust_pours_remaining(&self, id: &TapId, change: i64) -> Result<Option<i64>>;

    /// Insert a tap and return the stored rows as the store reports them
    async fn insert_tap(&self, tap: &NewTap) -> Result<Vec<Value>>;

    /// Invoke [`POUR_PROCEDURE`] and return its payload untouched
    async fn log_pour(&self, pour: &PourParams) -> Result<Value>;
}

/// Store configuration
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgrest {
        url: String,
        service_key: SecretString,
        table: String,
        timeout: Option<Duration>,
    },
    Memory,
}

/// Create store backend from config
pub fn create_store(config: StoreConfig) -> Result<Box<dyn TapStore>> {
    match config {
        StoreConfig::Postgrest {
            url,
            service_key,
            table,
            timeout,
        } => {
            let backend = postgrest::PostgrestStore::new(&url, service_key, table, timeout)?;
            Ok(Box::new(backend))
        }
        StoreConfig::Memory => Ok(Box::new(memory::MemoryStore::new())),
    }
}
