use crate::error::AppError;
use crate::market::cache::SnapshotLookup;
use crate::market::chart::run_chart_feed;
use crate::market::feed::WsFeedTransport;
use crate::market::stream::{run_feed_stream, StreamClient};
use crate::market::transport::FeedTransport;
use crate::market::types::{
    normalize_symbol, MarketStreamSession, MarketStreamStopResult, StartMarketStreamArgs,
    StreamStatusSnapshot,
};
use crate::state::{AppState, MarketStreamHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub async fn start_market_stream(
    state: &AppState,
    args: Option<StartMarketStreamArgs>,
) -> Result<MarketStreamSession, AppError> {
    start_market_stream_with(state, WsFeedTransport, args).await
}

/// Starts the feed and chart tasks on `transport`. Calling it while a stream
/// is already running returns the running session and opens nothing new.
pub async fn start_market_stream_with<T: FeedTransport>(
    state: &AppState,
    transport: T,
    args: Option<StartMarketStreamArgs>,
) -> Result<MarketStreamSession, AppError> {
    let defaults = state.config.stream_args();
    let args = args.unwrap_or_default();
    let config = StartMarketStreamArgs {
        endpoint: args.endpoint.or(defaults.endpoint),
        retry_delay_ms: args.retry_delay_ms.or(defaults.retry_delay_ms),
    }
    .normalize()?;

    let mut stream_slot = state.market_stream.lock().await;
    if let Some(handle) = stream_slot.as_ref() {
        debug!(endpoint = %handle.session.endpoint, "market stream already running");
        return Ok(handle.session.clone());
    }

    let cancellation_token = CancellationToken::new();
    let client = StreamClient::new(
        config.clone(),
        state.cache.clone(),
        Arc::clone(&state.market_status),
        state.events.clone(),
    );

    let stream_task = tokio::spawn(run_feed_stream(
        transport,
        client,
        cancellation_token.clone(),
    ));
    let chart_task = tokio::spawn(run_chart_feed(
        Arc::clone(&state.chart),
        state.cache.subscribe(),
        state.events.clone(),
        cancellation_token.clone(),
    ));

    let session = MarketStreamSession::from_config(&config);
    info!(
        endpoint = %session.endpoint,
        retry_delay_ms = session.retry_delay_ms,
        "market stream started"
    );
    *stream_slot = Some(MarketStreamHandle {
        cancellation_token,
        join_handles: vec![stream_task, chart_task],
        session: session.clone(),
    });

    Ok(session)
}

/// Cancels the running stream, including any pending reconnect, and waits
/// for its tasks to finish.
pub async fn stop_market_stream(state: &AppState) -> Result<MarketStreamStopResult, AppError> {
    let existing_handle = {
        let mut stream_slot = state.market_stream.lock().await;
        stream_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        for join_handle in handle.join_handles {
            let _ = join_handle.await;
        }
        true
    } else {
        false
    };

    Ok(MarketStreamStopResult { stopped })
}

pub fn market_stream_status(state: &AppState) -> StreamStatusSnapshot {
    state.market_status.read().clone()
}

/// The configured watch list, or every symbol seen so far when none is set.
pub fn market_symbols(state: &AppState) -> Vec<String> {
    if state.config.watchlist.is_empty() {
        state.cache.keys()
    } else {
        state.config.watchlist.clone()
    }
}

pub fn market_snapshot(state: &AppState, symbol: &str) -> Result<SnapshotLookup, AppError> {
    let symbol = normalize_symbol(symbol)?;
    Ok(state.cache.get(&symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::market::transport::scripted::{payload, ScriptedTransport};
    use crate::market::types::ConnectionState;
    use std::time::Duration;

    fn dynamic_state() -> AppState {
        AppState::new(DashboardConfig {
            watchlist: Vec::new(),
            ..DashboardConfig::default()
        })
    }

    #[tokio::test]
    async fn start_applies_feed_messages_to_cache() {
        let state = dynamic_state();
        let transport = ScriptedTransport::default();
        let frames = transport.accept();
        let mut updates = state.cache.subscribe();

        let session = start_market_stream_with(&state, transport.clone(), None)
            .await
            .expect("stream should start");
        assert!(session.running);
        assert_eq!(session.endpoint, "ws://localhost:8888/ws/trading");
        assert_eq!(session.retry_delay_ms, 2_000);

        transport.wait_for_opens(1).await;
        frames
            .send(payload(r#"{"symbol":"ethusdt","current_price":"2500.00"}"#))
            .expect("connection should accept frames");
        let applied = updates.recv().await.expect("snapshot should be applied");

        assert_eq!(applied.symbol, "ETHUSDT");
        let lookup = market_snapshot(&state, "ethusdt").expect("symbol should be valid");
        assert_eq!(lookup.price(), Some(2_500.0));
        assert!(!market_snapshot(&state, "BTCUSDT")
            .expect("symbol should be valid")
            .is_known());
        assert_eq!(market_symbols(&state), vec!["ETHUSDT".to_string()]);
        assert_eq!(market_stream_status(&state).state, ConnectionState::Open);

        let stopped = stop_market_stream(&state).await.expect("stop should succeed");
        assert!(stopped.stopped);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let state = dynamic_state();
        let transport = ScriptedTransport::default();
        let _frames = transport.accept();

        let first = start_market_stream_with(&state, transport.clone(), None)
            .await
            .expect("stream should start");
        transport.wait_for_opens(1).await;
        let second = start_market_stream_with(
            &state,
            transport.clone(),
            Some(StartMarketStreamArgs {
                endpoint: Some("ws://other.example.com/ws/trading".to_string()),
                retry_delay_ms: None,
            }),
        )
        .await
        .expect("second start should succeed");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second.endpoint, first.endpoint);
        assert_eq!(transport.open_count(), 1);

        stop_market_stream(&state).await.expect("stop should succeed");
    }

    #[tokio::test]
    async fn stop_reports_whether_stream_was_running() {
        let state = dynamic_state();
        assert!(!stop_market_stream(&state).await.expect("stop should succeed").stopped);

        let transport = ScriptedTransport::default();
        transport.refuse("connection refused");
        start_market_stream_with(&state, transport.clone(), None)
            .await
            .expect("stream should start");
        transport.wait_for_opens(1).await;

        assert!(stop_market_stream(&state).await.expect("stop should succeed").stopped);
        let status = market_stream_status(&state);
        assert_eq!(status.state, ConnectionState::Closed);
        assert_eq!(status.reason.as_deref(), Some("stream stopped"));
        assert!(state.market_stream.lock().await.is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_stream_args() {
        let state = dynamic_state();

        let result = start_market_stream_with(
            &state,
            ScriptedTransport::default(),
            Some(StartMarketStreamArgs {
                endpoint: Some("http://localhost:8888/ws/trading".to_string()),
                retry_delay_ms: Some(10),
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert!(state.market_stream.lock().await.is_none());
    }

    #[test]
    fn configured_watchlist_takes_precedence() {
        let state = AppState::new(DashboardConfig::default());

        assert_eq!(market_symbols(&state).len(), 5);
        assert!(market_snapshot(&state, "BTC/USDT").is_err());
    }
}
