//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `PRODUCT_SERVICE_URL`, `USER_SERVICE_URL`: external services
/// - `ORDER_SERVICE_URL`, `DELIVERY_SERVICE_URL`: default to this server
/// - `RPC_TIMEOUT_MS`: outbound request timeout (default: `2000`)
/// - `GATEWAY_TOKEN`: when set, requests must carry it in `X-Gateway-Token`
/// - `BROKER_PARTITIONS`: partitions per topic (default: `3`)
/// - `CONSUMER_MAX_ATTEMPTS`: attempts before dead-lettering (default: `5`)
/// - `CONSUMER_POLL_INTERVAL_MS`, `OUTBOX_POLL_INTERVAL_MS`: loop intervals
///   (default: `200`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub product_service_url: String,
    pub user_service_url: String,
    pub order_service_url: String,
    pub delivery_service_url: String,
    pub rpc_timeout: Duration,
    pub gateway_token: Option<String>,
    pub broker_partitions: u32,
    pub consumer_max_attempts: u32,
    pub consumer_poll_interval: Duration,
    pub outbox_poll_interval: Duration,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let port = parsed::<u16>(&lookup, "PORT").unwrap_or(defaults.port);
        let self_url = format!("http://127.0.0.1:{port}");

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            product_service_url: lookup("PRODUCT_SERVICE_URL")
                .unwrap_or(defaults.product_service_url),
            user_service_url: lookup("USER_SERVICE_URL").unwrap_or(defaults.user_service_url),
            order_service_url: lookup("ORDER_SERVICE_URL").unwrap_or_else(|| self_url.clone()),
            delivery_service_url: lookup("DELIVERY_SERVICE_URL").unwrap_or(self_url),
            rpc_timeout: parsed::<u64>(&lookup, "RPC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rpc_timeout),
            gateway_token: lookup("GATEWAY_TOKEN").filter(|t| !t.trim().is_empty()),
            broker_partitions: parsed::<u32>(&lookup, "BROKER_PARTITIONS")
                .filter(|p| *p > 0)
                .unwrap_or(defaults.broker_partitions),
            consumer_max_attempts: parsed::<u32>(&lookup, "CONSUMER_MAX_ATTEMPTS")
                .filter(|a| *a > 0)
                .unwrap_or(defaults.consumer_max_attempts),
            consumer_poll_interval: parsed::<u64>(&lookup, "CONSUMER_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.consumer_poll_interval),
            outbox_poll_interval: parsed::<u64>(&lookup, "OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            product_service_url: "http://localhost:8081".to_string(),
            user_service_url: "http://localhost:8082".to_string(),
            order_service_url: "http://127.0.0.1:3000".to_string(),
            delivery_service_url: "http://127.0.0.1:3000".to_string(),
            rpc_timeout: Duration::from_millis(2000),
            gateway_token: None,
            broker_partitions: 3,
            consumer_max_attempts: 5,
            consumer_poll_interval: Duration::from_millis(200),
            outbox_poll_interval: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.rpc_timeout, Duration::from_millis(2000));
        assert_eq!(config.broker_partitions, 3);
        assert_eq!(config.consumer_max_attempts, 5);
        assert_eq!(config.gateway_token, None);
    }

    #[test]
    fn test_own_services_default_to_this_server() {
        let config = config_from(&[("PORT", "8080")]);
        assert_eq!(config.order_service_url, "http://127.0.0.1:8080");
        assert_eq!(config.delivery_service_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = config_from(&[
            ("LOG_FORMAT", "JSON"),
            ("RPC_TIMEOUT_MS", "500"),
            ("BROKER_PARTITIONS", "0"),
            ("CONSUMER_MAX_ATTEMPTS", "not-a-number"),
            ("GATEWAY_TOKEN", "s3cret"),
        ]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rpc_timeout, Duration::from_millis(500));
        assert_eq!(config.broker_partitions, 3);
        assert_eq!(config.consumer_max_attempts, 5);
        assert_eq!(config.gateway_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
