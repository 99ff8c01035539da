use crate::market::types::{
    normalize_symbol, StartMarketStreamArgs, Timeframe, DEFAULT_RETRY_DELAY_MS, DEFAULT_SYMBOL,
    DEFAULT_TIMEFRAME, DEFAULT_WINDOW_SIZE, MAX_RETRY_DELAY_MS, MAX_WINDOW_SIZE,
    MIN_RETRY_DELAY_MS, MIN_WINDOW_SIZE,
};
use std::env;
use url::Url;
use tracing::warn;

pub const LOCAL_FEED_HOST: &str = "localhost:8888";
pub const DEFAULT_DEPLOYED_HOST: &str = "trading-jv2r.onrender.com";
pub const FEED_PATH: &str = "/ws/trading";
pub const DEFAULT_WATCHLIST: [&str; 5] = ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT"];
pub const DEFAULT_BOARD_INTERVAL_MS: u64 = 1_000;

/// Dashboard configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Explicit feed endpoint. When unset, derived from the dashboard host.
    pub feed_url: Option<String>,
    pub dashboard_host: String,
    pub dashboard_secure: bool,
    pub deployed_host: String,
    pub retry_delay_ms: u64,
    /// When empty, the board lists whatever symbols the feed has delivered.
    pub watchlist: Vec<String>,
    pub default_symbol: String,
    pub default_timeframe: Timeframe,
    pub window_size: usize,
    pub board_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            dashboard_host: "localhost".to_string(),
            dashboard_secure: false,
            deployed_host: DEFAULT_DEPLOYED_HOST.to_string(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            default_timeframe: DEFAULT_TIMEFRAME,
            window_size: DEFAULT_WINDOW_SIZE,
            board_interval_ms: DEFAULT_BOARD_INTERVAL_MS,
        }
    }
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_opt(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_str(lookup: Lookup<'_>, name: &str, default: &str) -> String {
    env_opt(lookup, name).unwrap_or_else(|| default.to_string())
}

fn env_u64(lookup: Lookup<'_>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(lookup: Lookup<'_>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

fn env_feed_url(lookup: Lookup<'_>, name: &str) -> Option<String> {
    let raw = env_opt(lookup, name)?;
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => Some(raw),
        Ok(url) => {
            warn!(%raw, scheme = url.scheme(), "{name} must be ws or wss, deriving endpoint");
            None
        }
        Err(error) => {
            warn!(%raw, %error, "{name} invalid, deriving endpoint");
            None
        }
    }
}

fn env_watchlist(lookup: Lookup<'_>, name: &str) -> Vec<String> {
    match lookup(name) {
        None => DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
        Some(raw) => raw
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .filter_map(|item| match normalize_symbol(item) {
                Ok(symbol) => Some(symbol),
                Err(error) => {
                    warn!(%name, item, %error, "ignoring watchlist entry");
                    None
                }
            })
            .collect(),
    }
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let default_symbol = env_opt(lookup, "DASHBOARD_SYMBOL")
            .and_then(|raw| match normalize_symbol(&raw) {
                Ok(symbol) => Some(symbol),
                Err(error) => {
                    warn!(%raw, %error, "DASHBOARD_SYMBOL invalid, using default");
                    None
                }
            })
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string());

        let default_timeframe = env_opt(lookup, "DASHBOARD_TIMEFRAME")
            .and_then(|raw| match raw.parse::<Timeframe>() {
                Ok(timeframe) => Some(timeframe),
                Err(error) => {
                    warn!(%raw, %error, "DASHBOARD_TIMEFRAME invalid, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_TIMEFRAME);

        let window_size = env_u64(lookup, "CHART_WINDOW_SIZE", DEFAULT_WINDOW_SIZE as u64)
            .clamp(MIN_WINDOW_SIZE as u64, MAX_WINDOW_SIZE as u64) as usize;

        let requested_retry_ms =
            env_u64(lookup, "FEED_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS);
        let retry_delay_ms = requested_retry_ms.clamp(MIN_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS);
        if retry_delay_ms != requested_retry_ms {
            warn!(
                requested = requested_retry_ms,
                applied = retry_delay_ms,
                "FEED_RETRY_DELAY_MS out of range, clamped"
            );
        }

        Self {
            feed_url: env_feed_url(lookup, "MARKET_FEED_URL"),
            dashboard_host: env_str(lookup, "DASHBOARD_HOST", "localhost"),
            dashboard_secure: env_bool(lookup, "DASHBOARD_SECURE", false),
            deployed_host: env_str(lookup, "MARKET_FEED_DEPLOYED_HOST", DEFAULT_DEPLOYED_HOST),
            retry_delay_ms,
            watchlist: env_watchlist(lookup, "DASHBOARD_WATCHLIST"),
            default_symbol,
            default_timeframe,
            window_size,
            board_interval_ms: env_u64(lookup, "BOARD_INTERVAL_MS", DEFAULT_BOARD_INTERVAL_MS)
                .max(100),
        }
    }

    pub fn feed_endpoint(&self) -> String {
        match &self.feed_url {
            Some(url) => url.clone(),
            None => resolve_feed_endpoint(
                &self.dashboard_host,
                self.dashboard_secure,
                &self.deployed_host,
            ),
        }
    }

    pub fn stream_args(&self) -> StartMarketStreamArgs {
        StartMarketStreamArgs {
            endpoint: Some(self.feed_endpoint()),
            retry_delay_ms: Some(self.retry_delay_ms),
        }
    }
}

pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// A loopback dashboard talks to the local feed; anything else goes to the
/// deployed host. The scheme follows the dashboard page.
pub fn resolve_feed_endpoint(dashboard_host: &str, secure: bool, deployed_host: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    let host = if is_loopback_host(dashboard_host) {
        LOCAL_FEED_HOST
    } else {
        deployed_host
    };
    format!("{scheme}://{host}{FEED_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> DashboardConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DashboardConfig::from_lookup(&move |name: &str| vars.get(name).cloned())
    }

    #[test]
    fn defaults_target_local_feed() {
        let config = config_from(&[]);

        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.feed_endpoint(), "ws://localhost:8888/ws/trading");
        assert_eq!(config.watchlist.len(), 5);
        assert_eq!(config.default_timeframe, Timeframe::M30);
    }

    #[test]
    fn remote_dashboard_uses_deployed_host() {
        assert_eq!(
            resolve_feed_endpoint("dashboard.example.com", true, DEFAULT_DEPLOYED_HOST),
            "wss://trading-jv2r.onrender.com/ws/trading"
        );
        assert_eq!(
            resolve_feed_endpoint("127.0.0.1", true, DEFAULT_DEPLOYED_HOST),
            "wss://localhost:8888/ws/trading"
        );
        assert!(is_loopback_host("[::1]"));
        assert!(!is_loopback_host("10.0.0.1"));
    }

    #[test]
    fn explicit_feed_url_wins() {
        let config = config_from(&[
            ("MARKET_FEED_URL", " wss://feed.example.com/ws/trading "),
            ("DASHBOARD_HOST", "dashboard.example.com"),
        ]);

        assert_eq!(config.feed_endpoint(), "wss://feed.example.com/ws/trading");
    }

    #[test]
    fn empty_watchlist_means_dynamic() {
        let config = config_from(&[("DASHBOARD_WATCHLIST", "")]);
        assert!(config.watchlist.is_empty());

        let config = config_from(&[("DASHBOARD_WATCHLIST", "ethusdt, ,sol-usdt,pepeusdt")]);
        assert_eq!(config.watchlist, vec!["ETHUSDT", "PEPEUSDT"]);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[
            ("DASHBOARD_TIMEFRAME", "2h"),
            ("DASHBOARD_SYMBOL", "not a symbol"),
            ("CHART_WINDOW_SIZE", "5000"),
            ("FEED_RETRY_DELAY_MS", "soon"),
            ("DASHBOARD_SECURE", "yes"),
        ]);

        assert_eq!(config.default_timeframe, Timeframe::M30);
        assert_eq!(config.default_symbol, "BTCUSDT");
        assert_eq!(config.window_size, MAX_WINDOW_SIZE);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert!(config.dashboard_secure);
    }

    #[test]
    fn out_of_range_stream_settings_still_start() {
        let config = config_from(&[
            ("FEED_RETRY_DELAY_MS", "100"),
            ("MARKET_FEED_URL", "http://x"),
        ]);

        let runtime = config
            .stream_args()
            .normalize()
            .expect("bad stream settings must fall back, not fail");

        assert_eq!(runtime.endpoint, "ws://localhost:8888/ws/trading");
        assert_eq!(runtime.retry_delay.as_millis(), u128::from(MIN_RETRY_DELAY_MS));
        assert_eq!(
            config_from(&[("FEED_RETRY_DELAY_MS", "90000")]).retry_delay_ms,
            MAX_RETRY_DELAY_MS
        );
        assert_eq!(config_from(&[("MARKET_FEED_URL", "not a url")]).feed_url, None);
    }

    #[test]
    fn stream_args_normalize_into_runtime_config() {
        let config = config_from(&[("FEED_RETRY_DELAY_MS", "3000")]);

        let runtime = config
            .stream_args()
            .normalize()
            .expect("configured stream args should be valid");

        assert_eq!(runtime.endpoint, "ws://localhost:8888/ws/trading");
        assert_eq!(runtime.retry_delay.as_millis(), 3_000);
    }
}
