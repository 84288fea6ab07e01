//! PostgREST store backend
//!
//! Talks to a hosted Postgres (Supabase style) through its REST interface
//! using the service-role key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::types::{NewTap, PourParams, TapId};
use crate::{Error, Result};

use super::{TapStore, ADJUST_PROCEDURE, POUR_PROCEDURE};

/// PostgREST-backed store
pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    service_key: SecretString,
    table: String,
}

impl PostgrestStore {
    pub fn new(
        url: &str,
        service_key: SecretString,
        table: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::config(format!("invalid store url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "store url must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            service_key,
            table: table.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        self.client
            .request(method, format!("{}/{}", self.rest_url, path))
            .header("apikey", key.as_str())
            .bearer_auth(key)
    }

    fn rpc(&self, procedure: &str) -> RequestBuilder {
        self.request(Method::POST, &format!("rpc/{}", procedure))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Error body PostgREST returns for failed requests
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<Value>,
    #[serde(default)]
    hint: Option<Value>,
}

async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Error::Http(e),
    };

    match serde_json::from_str::<PostgrestError>(&body) {
        Ok(err) if !err.message.trim().is_empty() => {
            tracing::debug!(
                %status,
                code = ?err.code,
                details = ?err.details,
                hint = ?err.hint,
                "Store rejected request"
            );
            Error::Store {
                message: err.message,
                code: err.code,
            }
        }
        // No message to relay; callers substitute their own.
        _ if body.trim().is_empty() => Error::Store {
            message: String::new(),
            code: Some(status.as_str().to_string()),
        },
        _ => Error::store(body),
    }
}

#[derive(Debug, Deserialize)]
struct CounterRow {
    pours_remaining: Option<i64>,
}

#[derive(Serialize)]
struct CounterUpdate {
    pours_remaining: i64,
    updated_at: DateTime<Utc>,
}

fn id_filter(id: &TapId) -> (&'static str, String) {
    ("id", format!("eq.{}", id))
}

#[async_trait]
impl TapStore for PostgrestStore {
    async fn fetch_pours_remaining(&self, id: &TapId) -> Result<Option<i64>> {
        let request = self
            .request(Method::GET, &self.table)
            .query(&[id_filter(id), ("select", "pours_remaining".to_string())]);

        let rows: Vec<CounterRow> = self.send(request).await?.json().await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.pours_remaining.unwrap_or(0)))
    }

    async fn update_pours_remaining(
        &self,
        id: &TapId,
        pours_remaining: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let request = self
            .request(Method::PATCH, &self.table)
            .query(&[id_filter(id)])
            .header("Prefer", "return=minimal")
            .json(&CounterUpdate {
                pours_remaining,
                updated_at,
            });

        self.send(request).await?;
        Ok(())
    }

    async fn adjust_pours_remaining(&self, id: &TapId, change: i64) -> Result<Option<i64>> {
        let request = self.rpc(ADJUST_PROCEDURE).json(&json!({
            "p_tap_id": id,
            "p_change": change,
        }));

        let value: Option<i64> = self.send(request).await?.json().await?;
        Ok(value)
    }

    async fn insert_tap(&self, tap: &NewTap) -> Result<Vec<Value>> {
        let request = self
            .request(Method::POST, &self.table)
            .header("Prefer", "return=representation")
            .json(&[tap]);

        let rows: Vec<Value> = self.send(request).await?.json().await?;
        Ok(rows)
    }

    async fn log_pour(&self, pour: &PourParams) -> Result<Value> {
        let request = self
            .rpc(POUR_PROCEDURE)
            .header(header::ACCEPT, "application/json")
            .json(pour);

        // A procedure returning void answers with an empty body.
        let body = self.send(request).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
