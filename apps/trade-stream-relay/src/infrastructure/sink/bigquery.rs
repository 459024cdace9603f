//! BigQuery Trade Sink
//!
//! Streams one row per trade into a BigQuery table through the REST
//! `tabledata.insertAll` endpoint.
//!
//! # Row Schema
//!
//! | column       | type      |
//! |--------------|-----------|
//! | `event_time` | TIMESTAMP |
//! | `symbol`     | STRING    |
//! | `price`      | FLOAT64   |

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::application::ports::{SinkError, TradeSink};
use crate::domain::trade::TradeEvent;
use super::auth::TokenProvider;
use crate::infrastructure::config::BigQuerySettings;

/// One row in the trades table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRow {
    /// Receipt time, RFC 3339 with microseconds.
    pub event_time: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Trade price.
    pub price: f64,
}

impl TryFrom<&TradeEvent> for TradeRow {
    type Error = SinkError;

    fn try_from(event: &TradeEvent) -> Result<Self, Self::Error> {
        let price = event
            .price()
            .to_f64()
            .ok_or_else(|| SinkError::Rejected(format!("price {} not representable", event.price())))?;

        Ok(Self {
            event_time: event
                .observed_at()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            symbol: event.symbol().to_string(),
            price,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest {
    rows: Vec<InsertAllRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRow {
    insert_id: String,
    json: TradeRow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// `TradeSink` writing to a BigQuery table.
#[derive(Debug)]
pub struct BigQuerySink {
    client: Client,
    insert_url: String,
    tokens: TokenProvider,
}

impl BigQuerySink {
    /// Create a sink for the table described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Network` if the HTTP client cannot be built.
    pub fn new(settings: &BigQuerySettings, request_timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SinkError::Network(e.to_string()))?;

        let insert_url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            settings.api_base.trim_end_matches('/'),
            settings.project_id,
            settings.dataset,
            settings.table
        );

        Ok(Self {
            insert_url,
            tokens: TokenProvider::new(&settings.credentials, client.clone()),
            client,
        })
    }

    /// Fully qualified insert endpoint.
    #[must_use]
    pub fn insert_url(&self) -> &str {
        &self.insert_url
    }
}

#[async_trait]
impl TradeSink for BigQuerySink {
    async fn insert(&self, event: &TradeEvent) -> Result<(), SinkError> {
        let request = InsertAllRequest {
            rows: vec![InsertAllRow {
                insert_id: uuid::Uuid::new_v4().to_string(),
                json: TradeRow::try_from(event)?,
            }],
        };

        let response = self
            .client
            .post(&self.insert_url)
            .bearer_auth(self.tokens.token().await?)
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        if body.insert_errors.is_empty() {
            return Ok(());
        }

        let reasons: Vec<String> = body
            .insert_errors
            .iter()
            .flat_map(|row| row.errors.iter())
            .map(|e| format!("{}: {}", e.reason, e.message))
            .collect();
        Err(SinkError::Rejected(reasons.join("; ")))
    }
}
