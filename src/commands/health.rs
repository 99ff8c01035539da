use crate::error::AppError;
use crate::market::feed::{fetch_feed_health, FeedHealth};
use crate::market::types::ConnectionState;
use crate::state::AppState;
use serde::Serialize;
use std::time::{Duration, Instant};

const FEED_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub stream: ConnectionState,
    pub cached_symbols: usize,
    pub feed: &'static str,
    pub feed_environment: Option<String>,
}

pub fn build_health_response(
    started_at: Instant,
    stream: ConnectionState,
    cached_symbols: usize,
    feed_probe: Result<FeedHealth, AppError>,
) -> HealthResponse {
    let (feed, feed_environment) = match feed_probe {
        Ok(health) => ("ok", health.environment),
        Err(_) => ("unreachable", None),
    };

    HealthResponse {
        status: "ok",
        uptime_ms: started_at.elapsed().as_millis(),
        stream,
        cached_symbols,
        feed,
        feed_environment,
    }
}

pub async fn health(state: &AppState) -> HealthResponse {
    let endpoint = state.market_status.read().endpoint.clone();
    let feed_probe = match tokio::time::timeout(
        FEED_PROBE_TIMEOUT,
        fetch_feed_health(&state.http_client, &endpoint),
    )
    .await
    {
        Ok(probe) => probe,
        Err(_) => Err(AppError::Timeout {
            what: "feed health probe",
            after: FEED_PROBE_TIMEOUT,
        }),
    };

    let stream = state.market_status.read().state;
    build_health_response(state.started_at, stream, state.cache.len(), feed_probe)
}
