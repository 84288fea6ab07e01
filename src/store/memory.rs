//! In-process store backend
//!
//! Mirrors the hosted store closely enough for local runs and tests. Every
//! call is appended to an operation journal so callers can check which
//! store calls a request made. The journal keeps only the most recent
//! [`JOURNAL_CAPACITY`] calls.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{adjusted_pours, NewTap, PourParams, Tap, TapId};
use crate::{Error, Result};

use super::TapStore;

/// Number of store calls the journal retains
pub const JOURNAL_CAPACITY: usize = 1024;

/// A store call, as recorded in the journal
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    FetchPours(TapId),
    UpdatePours { id: TapId, pours_remaining: i64 },
    AdjustPours { id: TapId, change: i64 },
    InsertTap { name: String },
    LogPour(TapId),
}

impl StoreOp {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, StoreOp::FetchPours(_))
    }
}

/// In-memory tap table plus pour log
#[derive(Default)]
pub struct MemoryStore {
    taps: DashMap<TapId, Tap>,
    pours: Mutex<Vec<PourParams>>,
    journal: Mutex<VecDeque<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `taps`
    pub fn with_taps(taps: impl IntoIterator<Item = Tap>) -> Self {
        let store = Self::new();
        for tap in taps {
            store.taps.insert(tap.id.clone(), tap);
        }
        store
    }

    pub fn get(&self, id: &TapId) -> Option<Tap> {
        self.taps.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Recent store calls, oldest first
    pub async fn operations(&self) -> Vec<StoreOp> {
        self.journal.lock().await.iter().cloned().collect()
    }

    /// Pours recorded through [`TapStore::log_pour`], oldest first
    pub async fn pours(&self) -> Vec<PourParams> {
        self.pours.lock().await.clone()
    }

    async fn record(&self, op: StoreOp) {
        let mut journal = self.journal.lock().await;
        if journal.len() == JOURNAL_CAPACITY {
            journal.pop_front();
        }
        journal.push_back(op);
    }
}

#[async_trait]
impl TapStore for MemoryStore {
    async fn fetch_pours_remaining(&self, id: &TapId) -> Result<Option<i64>> {
        self.record(StoreOp::FetchPours(id.clone())).await;
        Ok(self
            .taps
            .get(id)
            .map(|tap| tap.pours_remaining.unwrap_or(0)))
    }

    async fn update_pours_remaining(
        &self,
        id: &TapId,
        pours_remaining: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.record(StoreOp::UpdatePours {
            id: id.clone(),
            pours_remaining,
        })
        .await;

        // Like a filtered UPDATE, an unknown id matches nothing.
        if let Some(mut tap) = self.taps.get_mut(id) {
            tap.pours_remaining = Some(pours_remaining);
            tap.updated_at = Some(updated_at);
        }
        Ok(())
    }

    async fn adjust_pours_remaining(&self, id: &TapId, change: i64) -> Result<Option<i64>> {
        self.record(StoreOp::AdjustPours {
            id: id.clone(),
            change,
        })
        .await;

        // The shard write lock is held for the whole read-modify-write.
        Ok(self.taps.get_mut(id).map(|mut tap| {
            let next = adjusted_pours(tap.pours_remaining.unwrap_or(0), change);
            tap.pours_remaining = Some(next);
            tap.updated_at = Some(Utc::now());
            next
        }))
    }

    async fn insert_tap(&self, new_tap: &NewTap) -> Result<Vec<Value>> {
        self.record(StoreOp::InsertTap {
            name: new_tap.name.clone(),
        })
        .await;

        let tap = Tap {
            id: TapId::Text(Uuid::new_v4().to_string()),
            name: new_tap.name.clone(),
            brewery: new_tap.brewery.clone(),
            style: new_tap.style.clone(),
            abv: new_tap.abv,
            keg_size_oz: new_tap.keg_size_oz,
            pours_remaining: new_tap.pours_remaining.map(i64::from),
            cost_per_keg: new_tap.cost_per_keg,
            is_on_tap: new_tap.is_on_tap,
            tapped_at: Some(new_tap.tapped_at),
            updated_at: None,
        };
        let row = serde_json::to_value(&tap)?;
        self.taps.insert(tap.id.clone(), tap);

        Ok(vec![row])
    }

    async fn log_pour(&self, pour: &PourParams) -> Result<Value> {
        self.record(StoreOp::LogPour(pour.tap_id.clone())).await;

        let remaining = {
            let mut tap = self
                .taps
                .get_mut(&pour.tap_id)
                .ok_or_else(|| Error::store(format!("Tap {} not found", pour.tap_id)))?;
            let next = adjusted_pours(tap.pours_remaining.unwrap_or(0), -1);
            tap.pours_remaining = Some(next);
            tap.updated_at = Some(Utc::now());
            next
        };
        self.pours.lock().await.push(pour.clone());

        Ok(json!({
            "tap_id": pour.tap_id,
            "pours_remaining": remaining,
        }))
    }
}
