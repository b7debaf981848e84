//! REST sink for the hosted backend.
//!
//! Items are inserted with `Prefer: resolution=ignore-duplicates`, so a
//! resend of an id the backend already stored is accepted without
//! creating a second row.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use super::{FeedbackSink, SinkFuture};
use crate::config::SinkConfig;
use crate::models::QueuedFeedbackItem;
use crate::{AppError, Result};

const PREFER_HEADER: &str = "resolution=ignore-duplicates,return=minimal";

/// HTTP sink posting items to `{endpoint}/rest/v1/{table}`.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpSink {
    /// Build a sink from the `[sink]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if the HTTP client cannot be built.
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}/rest/v1/{}",
                config.endpoint.trim_end_matches('/'),
                config.table
            ),
            api_key: config.api_key.clone(),
        })
    }

    /// Full insert URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Row sent to the backend: the payload fields with `id` and `isOffline`
/// alongside.
///
/// `isOffline` is true for items replayed from the durable queue, so the
/// backend can tell them from live submissions. Non-object payloads are
/// nested under a `payload` field.
#[must_use]
pub fn row_body(item: &QueuedFeedbackItem) -> Value {
    let mut row = match &item.payload {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = Map::new();
            fields.insert("payload".into(), other.clone());
            fields
        }
    };
    row.insert("id".into(), Value::String(item.id.clone()));
    row.insert("isOffline".into(), Value::Bool(item.offline_flag));
    Value::Object(row)
}

impl FeedbackSink for HttpSink {
    fn send<'a>(&'a self, item: &'a QueuedFeedbackItem) -> SinkFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
                .header("Prefer", PREFER_HEADER)
                .json(&row_body(item))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Network(format!(
                    "sink rejected item {}: {status} {body}",
                    item.id
                )));
            }

            debug!(item_id = %item.id, %status, "item accepted by sink");
            Ok(())
        })
    }
}
