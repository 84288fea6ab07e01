//! Typed request bodies
//!
//! Bodies are read and parsed only after the caller is authorized, so the
//! handlers take the raw [`Body`] instead of axum's `Json` or `Bytes`
//! extractors, which would buffer it up front.

use axum::body::{to_bytes, Body, Bytes};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Number;

use crate::api::error::ApiError;
use crate::types::{NewTap, PourParams, TapId};

pub const ADJUST_INVALID: &str = "Missing id or change number";
pub const POUR_INVALID: &str = "tapId and sizeOz required";
pub const TAP_NEW_INVALID: &str = "Missing name or brewery";

const DEFAULT_POUR_SOURCE: &str = "manual";

/// Largest request body the handlers will buffer
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Buffer a request body, refusing anything over [`MAX_BODY_BYTES`]
pub async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        tracing::debug!(error = %e, "Failed to read request body");
        ApiError::PayloadTooLarge
    })
}

/// Parse a JSON body. An empty body reads as `{}`.
///
/// Malformed JSON maps to [`ApiError::InvalidJson`]; well-formed JSON that
/// does not fit `T` maps to `ApiError::Validation(invalid)`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8], invalid: &'static str) -> Result<T, ApiError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };

    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            tracing::debug!(error = %e, "Request body failed validation");
            ApiError::Validation(invalid)
        } else {
            ApiError::InvalidJson
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustRequest {
    pub id: Option<TapId>,
    pub change: Option<Number>,
}

impl AdjustRequest {
    pub fn validate(self) -> Result<(TapId, i64), ApiError> {
        match (self.id, self.change.as_ref().and_then(whole_number)) {
            (Some(id), Some(change)) if !id.is_blank() => Ok((id, change)),
            _ => Err(ApiError::Validation(ADJUST_INVALID)),
        }
    }
}

/// A JSON number with no fractional part that fits in an `i64`.
/// `2.0` and `-3e0` qualify, `1.5` does not.
fn whole_number(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then_some(f as i64)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PourRequest {
    pub tap_id: Option<TapId>,
    pub size_oz: Option<f64>,
    pub price: Option<f64>,
    pub source: Option<String>,
    pub note: Option<String>,
}

impl PourRequest {
    /// Check required fields and fill defaults for the optional ones
    pub fn validate(self) -> Result<PourParams, ApiError> {
        let (tap_id, size_oz) = match (self.tap_id, self.size_oz) {
            (Some(tap_id), Some(size_oz)) if !tap_id.is_blank() && size_oz != 0.0 => {
                (tap_id, size_oz)
            }
            _ => return Err(ApiError::Validation(POUR_INVALID)),
        };

        Ok(PourParams {
            tap_id,
            size_oz,
            price: self.price.unwrap_or(0.0),
            source: self
                .source
                .unwrap_or_else(|| DEFAULT_POUR_SOURCE.to_string()),
            note: self.note,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTapRequest {
    pub name: Option<String>,
    pub brewery: Option<String>,
    pub style: Option<String>,
    pub abv: Option<f64>,
    pub keg_size_oz: Option<f64>,
    pub pours_remaining: Option<u32>,
    pub cost_per_keg: Option<f64>,
}

impl NewTapRequest {
    pub fn validate(self, tapped_at: DateTime<Utc>) -> Result<NewTap, ApiError> {
        let present = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        if !present(&self.name) || !present(&self.brewery) {
            return Err(ApiError::Validation(TAP_NEW_INVALID));
        }

        Ok(NewTap {
            name: self.name.unwrap_or_default(),
            brewery: self.brewery.unwrap_or_default(),
            style: self.style,
            abv: self.abv,
            keg_size_oz: self.keg_size_oz,
            pours_remaining: self.pours_remaining,
            cost_per_keg: self.cost_per_keg,
            is_on_tap: true,
            tapped_at,
        })
    }
}
