//! API server state

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::config::AdjustStrategy;
use crate::store::TapStore;

/// Header carrying the shared admin secret
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// Shared secret callers must present; `None` when the server has none configured
    admin_secret: Option<Arc<SecretString>>,

    /// Inventory store; `None` when its connection settings are missing
    store: Option<Arc<dyn TapStore>>,

    /// How adjustments are applied
    pub adjust_strategy: AdjustStrategy,
}

impl AppState {
    pub fn new(admin_secret: Option<SecretString>, store: Option<Arc<dyn TapStore>>) -> Self {
        Self {
            admin_secret: admin_secret
                .filter(|s| !s.expose_secret().is_empty())
                .map(Arc::new),
            store,
            adjust_strategy: AdjustStrategy::default(),
        }
    }

    pub fn with_adjust_strategy(mut self, strategy: AdjustStrategy) -> Self {
        self.adjust_strategy = strategy;
        self
    }

    pub fn store_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Check the admin secret header against the configured secret
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let expected = self
            .admin_secret
            .as_ref()
            .ok_or(ApiError::SecretNotConfigured)?;

        let provided = headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());

        match provided {
            Some(provided) if secrets_match(provided, expected.expose_secret()) => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    pub fn store(&self) -> Result<&Arc<dyn TapStore>, ApiError> {
        self.store.as_ref().ok_or(ApiError::StoreNotConfigured)
    }
}

/// Compare without short-circuiting on the first differing byte
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
