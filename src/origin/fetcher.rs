//! HTTP batch fetcher for origin endpoints.
//!
//! Builds `{<prop>: [key, …]}` request bodies, merges the configured
//! headers, posts under the configured timeout, and decodes the response as
//! a flat `{key -> raw JSON value}` object. Values are forwarded as opaque
//! tokens; nothing beyond the outer object is parsed.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::value::RawValue;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::config::{KeyType, OriginConfig};

/// Applied when a cache's origin descriptor carries no timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin url is empty")]
    MissingUrl,

    #[error("invalid numeric key {key:?}")]
    InvalidKey { key: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("origin request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad response ({status}): {body}")]
    BadStatus { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct HttpBatchFetcher {
    client: reqwest::Client,
}

impl Default for HttpBatchFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBatchFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stratacache/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST one key batch to the configured origin and decode the response
    /// map. Any non-2xx status is an error.
    pub async fn fetch(
        &self,
        keys: &[String],
        config: &OriginConfig,
    ) -> Result<HashMap<String, Box<RawValue>>, OriginError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        if config.url.is_empty() {
            return Err(OriginError::MissingUrl);
        }

        let body = prepare_body(keys, config)?;
        let headers = build_headers(config)?;
        let timeout = if config.timeout_seconds > 0 {
            config.timeout()
        } else {
            DEFAULT_TIMEOUT
        };

        let response = self
            .client
            .post(&config.url)
            .timeout(timeout)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OriginError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Encode the key array under the configured property name. Numeric keys are
/// validated; one bad key aborts the batch.
fn prepare_body(keys: &[String], config: &OriginConfig) -> Result<Value, OriginError> {
    let encoded = match config.key_type {
        KeyType::String => keys.iter().map(|k| Value::String(k.clone())).collect(),
        KeyType::Number => {
            let mut encoded = Vec::with_capacity(keys.len());
            for key in keys {
                encoded.push(Value::Number(parse_number(key)?));
            }
            encoded
        }
    };

    let mut body = Map::new();
    body.insert(config.prop.clone(), Value::Array(encoded));
    Ok(Value::Object(body))
}

fn parse_number(key: &str) -> Result<Number, OriginError> {
    if let Ok(n) = key.parse::<i64>() {
        return Ok(Number::from(n));
    }
    if let Ok(n) = key.parse::<u64>() {
        return Ok(Number::from(n));
    }
    key.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| OriginError::InvalidKey {
            key: key.to_string(),
        })
}

fn build_headers(config: &OriginConfig) -> Result<HeaderMap, OriginError> {
    let mut headers = HeaderMap::with_capacity(config.headers.len() + 1);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            OriginError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| OriginError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}
