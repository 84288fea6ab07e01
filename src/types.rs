//! Core types for the taproom inventory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tap identifier as the store keys it: a UUID string or a serial integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TapId {
    Int(i64),
    Text(String),
}

impl TapId {
    /// `0` and empty strings are treated as "no id supplied".
    pub fn is_blank(&self) -> bool {
        match self {
            TapId::Int(n) => *n == 0,
            TapId::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for TapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapId::Int(n) => write!(f, "{}", n),
            TapId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TapId {
    fn from(value: &str) -> Self {
        TapId::Text(value.to_string())
    }
}

impl From<String> for TapId {
    fn from(value: String) -> Self {
        TapId::Text(value)
    }
}

impl From<i64> for TapId {
    fn from(value: i64) -> Self {
        TapId::Int(value)
    }
}

/// One inventory row: a keg currently or previously on tap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tap {
    pub id: TapId,
    pub name: String,
    pub brewery: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub abv: Option<f64>,
    #[serde(default)]
    pub keg_size_oz: Option<f64>,
    #[serde(default)]
    pub pours_remaining: Option<i64>,
    #[serde(default)]
    pub cost_per_keg: Option<f64>,
    #[serde(default)]
    pub is_on_tap: bool,
    #[serde(default)]
    pub tapped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row sent to the store when a keg is tapped.
///
/// Unset optional columns are omitted so the store's column defaults apply.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTap {
    pub name: String,
    pub brewery: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keg_size_oz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pours_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_keg: Option<f64>,
    pub is_on_tap: bool,
    pub tapped_at: DateTime<Utc>,
}

/// Arguments of the `log_pour_and_decrement` remote procedure
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PourParams {
    #[serde(rename = "p_tap_id")]
    pub tap_id: TapId,
    #[serde(rename = "p_size_oz")]
    pub size_oz: f64,
    #[serde(rename = "p_price")]
    pub price: f64,
    #[serde(rename = "p_source")]
    pub source: String,
    /// Serialized as `null` when absent; the procedure expects the argument.
    #[serde(rename = "p_note")]
    pub note: Option<String>,
}

/// Remaining pours after applying `change` to `current`, never below zero.
pub fn adjusted_pours(current: i64, change: i64) -> i64 {
    current.saturating_add(change).max(0)
}
