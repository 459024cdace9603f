//! Configuration Module
//!
//! Environment-driven configuration for the relay.

mod settings;

pub use settings::{
    BigQueryCredentials, BigQuerySettings, ConfigError, DEFAULT_BIGQUERY_API_BASE,
    DEFAULT_FEED_URL, DEFAULT_METADATA_HOST, FeedSettings, RelayConfig, ServerSettings,
    SinkSettings, validate_feed_url,
};
