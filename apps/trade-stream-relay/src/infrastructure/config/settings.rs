//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! The feed URL and liveness port are validated strictly since a bad value
//! there can never recover; tunables fall back to their defaults when unset
//! or unparseable.

use std::time::Duration;

use tokio_tungstenite::tungstenite::http::Uri;

/// Default upstream trade stream.
pub const DEFAULT_FEED_URL: &str = "wss://stream.binance.com:9443/ws/btcusdt@trade";

/// Default BigQuery REST base.
pub const DEFAULT_BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Upstream feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// WebSocket URL of the trade stream.
    pub url: String,
    /// Timeout for establishing a session.
    pub connect_timeout: Duration,
    /// A session with no frames for this long is considered dead.
    pub read_idle_timeout: Duration,
    /// Sessions shorter than this are followed by an `initial` pause
    /// (zero disables).
    pub min_stable_session: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to reconnection delays (0 = deterministic).
    pub reconnect_jitter: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_idle_timeout: Duration::from_secs(120),
            min_stable_session: Duration::ZERO,
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
        }
    }
}

/// Default GCE metadata server host, overridable with `GCE_METADATA_HOST`.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// How the BigQuery sink authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum BigQueryCredentials {
    /// A fixed OAuth bearer token. GCP access tokens expire after about an
    /// hour and are not refreshed.
    AccessToken(String),
    /// Tokens fetched and refreshed from the GCE/Cloud Run metadata server.
    MetadataServer {
        /// Metadata server `host[:port]`.
        host: String,
    },
}

impl std::fmt::Debug for BigQueryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken([REDACTED])"),
            Self::MetadataServer { host } => f
                .debug_struct("MetadataServer")
                .field("host", host)
                .finish(),
        }
    }
}

/// BigQuery destination and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigQuerySettings {
    /// GCP project id.
    pub project_id: String,
    /// Dataset name.
    pub dataset: String,
    /// Table name.
    pub table: String,
    /// REST API base URL.
    pub api_base: String,
    /// Authentication source.
    pub credentials: BigQueryCredentials,
}

impl BigQuerySettings {
    /// Create settings.
    #[must_use]
    pub const fn new(
        project_id: String,
        dataset: String,
        table: String,
        api_base: String,
        credentials: BigQueryCredentials,
    ) -> Self {
        Self {
            project_id,
            dataset,
            table,
            api_base,
            credentials,
        }
    }
}

/// Downstream sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    /// BigQuery destination, if configured.
    pub bigquery: Option<BigQuerySettings>,
    /// Events buffered between reader and writer.
    pub queue_capacity: usize,
    /// Longest the reader waits for queue space.
    pub enqueue_timeout: Duration,
    /// Longest a single sink write may take.
    pub write_timeout: Duration,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            bigquery: None,
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Liveness HTTP port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Downstream sink settings.
    pub sink: SinkSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed URL or port is malformed, or a tunable
    /// is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let feed_defaults = FeedSettings::default();
        let sink_defaults = SinkSettings::default();

        let url = env
            .non_empty("FEED_URL")
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        validate_feed_url(&url)?;

        let port = match env.non_empty("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "PORT".to_string(),
                    reason: format!("{raw:?} is not a valid port"),
                })?,
            None => ServerSettings::default().port,
        };

        let feed = FeedSettings {
            url,
            connect_timeout: env.duration_secs("RELAY_CONNECT_TIMEOUT_SECS", feed_defaults.connect_timeout),
            read_idle_timeout: env.duration_secs(
                "RELAY_READ_IDLE_TIMEOUT_SECS",
                feed_defaults.read_idle_timeout,
            ),
            min_stable_session: env.duration_secs(
                "RELAY_MIN_STABLE_SESSION_SECS",
                feed_defaults.min_stable_session,
            ),
            reconnect_delay_initial: env.duration_millis(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                feed_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                feed_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parsed(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                feed_defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: env.parsed("RELAY_RECONNECT_JITTER", feed_defaults.reconnect_jitter),
        };

        let bigquery = env.non_empty("GOOGLE_CLOUD_PROJECT").map(|project_id| {
            let credentials = env.non_empty("BIGQUERY_ACCESS_TOKEN").map_or_else(
                || BigQueryCredentials::MetadataServer {
                    host: env
                        .non_empty("GCE_METADATA_HOST")
                        .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
                },
                BigQueryCredentials::AccessToken,
            );
            BigQuerySettings::new(
                project_id,
                env.non_empty("BIGQUERY_DATASET")
                    .unwrap_or_else(|| "crypto_data".to_string()),
                env.non_empty("BIGQUERY_TABLE")
                    .unwrap_or_else(|| "trades".to_string()),
                env.non_empty("BIGQUERY_API_BASE")
                    .unwrap_or_else(|| DEFAULT_BIGQUERY_API_BASE.to_string()),
                credentials,
            )
        });

        let sink = SinkSettings {
            bigquery,
            queue_capacity: env.parsed("RELAY_SINK_QUEUE_CAPACITY", sink_defaults.queue_capacity),
            enqueue_timeout: env.duration_millis(
                "RELAY_SINK_ENQUEUE_TIMEOUT_MS",
                sink_defaults.enqueue_timeout,
            ),
            write_timeout: env.duration_secs(
                "RELAY_SINK_WRITE_TIMEOUT_SECS",
                sink_defaults.write_timeout,
            ),
        };

        let config = Self {
            feed,
            sink,
            server: ServerSettings { port },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let feed = &self.feed;
        if feed.reconnect_delay_initial.is_zero() {
            return Err(invalid("RELAY_RECONNECT_DELAY_INITIAL_MS", "must be greater than zero"));
        }
        if feed.reconnect_delay_max < feed.reconnect_delay_initial {
            return Err(invalid(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                "must not be below the initial delay",
            ));
        }
        if !(feed.reconnect_delay_multiplier >= 1.0 && feed.reconnect_delay_multiplier.is_finite()) {
            return Err(invalid("RELAY_RECONNECT_DELAY_MULTIPLIER", "must be at least 1.0"));
        }
        if !(0.0..1.0).contains(&feed.reconnect_jitter) {
            return Err(invalid("RELAY_RECONNECT_JITTER", "must be in [0, 1)"));
        }
        if feed.connect_timeout.is_zero() {
            return Err(invalid("RELAY_CONNECT_TIMEOUT_SECS", "must be greater than zero"));
        }
        if feed.read_idle_timeout.is_zero() {
            return Err(invalid("RELAY_READ_IDLE_TIMEOUT_SECS", "must be greater than zero"));
        }
        if self.sink.queue_capacity == 0 {
            return Err(invalid("RELAY_SINK_QUEUE_CAPACITY", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Check that `url` is an absolute `ws://` or `wss://` URL with a host.
///
/// # Errors
///
/// Returns `ConfigError::InvalidFeedUrl` otherwise.
pub fn validate_feed_url(url: &str) -> Result<(), ConfigError> {
    let bad = |reason: &str| ConfigError::InvalidFeedUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|e: tokio_tungstenite::tungstenite::http::uri::InvalidUri| bad(&e.to_string()))?;

    match uri.scheme_str() {
        Some("ws" | "wss") => {}
        Some(other) => return Err(bad(&format!("unsupported scheme {other:?}"))),
        None => return Err(bad("missing scheme")),
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(bad("missing host"));
    }

    Ok(())
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The feed URL cannot be used.
    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidFeedUrl {
        /// Offending URL.
        url: String,
        /// What is wrong with it.
        reason: String,
    },
    /// A setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.non_empty(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.non_empty(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.non_empty(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.feed, FeedSettings::default());
        assert_eq!(config.sink, SinkSettings::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(config.feed.reconnect_delay_max, Duration::from_secs(60));
        assert_eq!(config.feed.min_stable_session, Duration::ZERO);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("FEED_URL", "ws://127.0.0.1:9001/ws"),
            ("PORT", "9090"),
            ("RELAY_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("RELAY_RECONNECT_DELAY_MAX_SECS", "5"),
            ("RELAY_SINK_QUEUE_CAPACITY", "16"),
        ])
        .unwrap();
        assert_eq!(config.feed.url, "ws://127.0.0.1:9001/ws");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(config.feed.reconnect_delay_max, Duration::from_secs(5));
        assert_eq!(config.sink.queue_capacity, 16);
    }

    #[test]
    fn unparseable_tunables_fall_back() {
        let config = load(&[("RELAY_CONNECT_TIMEOUT_SECS", "soon")]).unwrap();
        assert_eq!(config.feed.connect_timeout, Duration::from_secs(10));
    }

    #[test_case("https://stream.binance.com/ws" ; "http scheme")]
    #[test_case("stream.binance.com:9443/ws" ; "no scheme")]
    #[test_case("wss://" ; "no host")]
    #[test_case("wss://exa mple.com/ws" ; "space in host")]
    fn rejects_malformed_feed_urls(url: &str) {
        let err = load(&[("FEED_URL", url)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFeedUrl { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_malformed_port() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let err = load(&[
            ("RELAY_RECONNECT_DELAY_INITIAL_MS", "5000"),
            ("RELAY_RECONNECT_DELAY_MAX_SECS", "1"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RELAY_RECONNECT_DELAY_MAX_SECS")
        );
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let err = load(&[("RELAY_RECONNECT_DELAY_MULTIPLIER", "0.5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn sink_requires_project() {
        let config = load(&[("BIGQUERY_ACCESS_TOKEN", "ya29.secret")]).unwrap();
        assert!(config.sink.bigquery.is_none());
    }

    #[test]
    fn static_token_when_provided() {
        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("BIGQUERY_ACCESS_TOKEN", "ya29.secret"),
        ])
        .unwrap();
        let bigquery = config.sink.bigquery.unwrap();
        assert_eq!(bigquery.project_id, "demo");
        assert_eq!(bigquery.dataset, "crypto_data");
        assert_eq!(bigquery.table, "trades");
        assert_eq!(bigquery.api_base, DEFAULT_BIGQUERY_API_BASE);
        assert_eq!(
            bigquery.credentials,
            BigQueryCredentials::AccessToken("ya29.secret".to_string())
        );
    }

    #[test]
    fn metadata_server_without_token() {
        let config = load(&[("GOOGLE_CLOUD_PROJECT", "demo")]).unwrap();
        assert_eq!(
            config.sink.bigquery.unwrap().credentials,
            BigQueryCredentials::MetadataServer {
                host: DEFAULT_METADATA_HOST.to_string()
            }
        );

        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("GCE_METADATA_HOST", "127.0.0.1:8999"),
        ])
        .unwrap();
        assert_eq!(
            config.sink.bigquery.unwrap().credentials,
            BigQueryCredentials::MetadataServer {
                host: "127.0.0.1:8999".to_string()
            }
        );
    }

    #[test]
    fn bigquery_token_redacted_in_debug() {
        let settings = BigQuerySettings::new(
            "demo".to_string(),
            "crypto_data".to_string(),
            "trades".to_string(),
            DEFAULT_BIGQUERY_API_BASE.to_string(),
            BigQueryCredentials::AccessToken("ya29.secret".to_string()),
        );
        let debug = format!("{settings:?}");
        assert!(!debug.contains("ya29.secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
