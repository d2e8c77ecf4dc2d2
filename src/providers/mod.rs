pub mod kakao;
#[cfg(test)]
pub mod mock;
pub mod tmap;
pub mod types;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::geokey::{Coordinate, TransportType};
use types::{KeywordSearchRequest, PlaceDocument};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: Value },
    /// A 2xx answer that could not be decoded; `body` is what the provider sent.
    #[error("Response decoding failed: {source}")]
    Decode {
        body: Value,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected response shape: {0}")]
    Rejected(Value),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }

    /// What the provider said, for surfacing to the caller.
    pub fn diagnostic(&self) -> Value {
        match self {
            ProviderError::Status { status, body } => {
                serde_json::json!({ "status": status, "body": body })
            }
            ProviderError::Decode { body, source } => {
                serde_json::json!({ "reason": source.to_string(), "body": body })
            }
            ProviderError::Rejected(body) => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Upstream directions for one transport mode. Payloads are returned verbatim.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn fetch_route(
        &self,
        transport: TransportType,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Value, ProviderError>;
}

#[async_trait]
pub trait PlaceSearchProvider: Send + Sync {
    /// Results come back in provider order (nearest first when sorted by distance).
    async fn keyword_search(
        &self,
        request: &KeywordSearchRequest,
    ) -> Result<Vec<PlaceDocument>, ProviderError>;
}

/// Sends once and decodes a JSON body. Non-2xx statuses carry the provider's body.
/// There is no retry here: every attempt is a billed call.
pub(crate) async fn send_json(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;
    let status = response.status();

    if status.is_success() {
        let text = response.text().await.map_err(|e| classify(e, timeout))?;
        return serde_json::from_str(&text).map_err(|source| ProviderError::Decode {
            body: Value::String(text),
            source,
        });
    }

    let error_text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&error_text).unwrap_or(Value::String(error_text));
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

fn classify(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Request(err)
    }
}
