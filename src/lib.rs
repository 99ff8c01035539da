pub mod commands;
pub mod config;
pub mod error;
pub mod market;
pub mod state;

use commands::{
    chart::select_chart,
    health::health,
    market_stream::{market_stream_status, market_symbols, start_market_stream, stop_market_stream},
};
use config::DashboardConfig;
use error::AppError;
use market::board::{format_price, render_watch_board};
use market::MarketEvent;
use state::AppState;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

pub fn run() -> Result<(), AppError> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DashboardConfig::from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(AppState::new(config)))
}

async fn serve(state: AppState) -> Result<(), AppError> {
    let mut events = state.subscribe_events();
    let session = start_market_stream(&state, None).await?;
    info!(endpoint = %session.endpoint, "dashboard sync running, ctrl-c to stop");

    let series = select_chart(&state, None)?;
    info!(
        symbol = %series.symbol,
        timeframe = series.timeframe.as_str(),
        candles = series.len(),
        "chart ready"
    );

    let probe = health(&state).await;
    info!(feed = probe.feed, environment = ?probe.feed_environment, "feed health");

    let mut board_tick =
        tokio::time::interval(Duration::from_millis(state.config.board_interval_ms));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "ctrl-c handler failed, stopping");
                }
                break;
            }
            received = events.recv() => match received {
                Ok(event) => log_market_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event log lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = board_tick.tick() => {
                let status = market_stream_status(&state);
                for line in render_watch_board(&state.cache, &market_symbols(&state), &status) {
                    info!("{line}");
                }
            }
        }
    }

    let result = stop_market_stream(&state).await?;
    info!(stopped = result.stopped, "dashboard sync stopped");
    Ok(())
}

fn log_market_event(event: &MarketEvent) {
    match event {
        MarketEvent::MarketStatus(status) => info!(
            event = event.name(),
            state = ?status.state,
            indicator = status.indicator_label(),
            reason = status.reason.as_deref().unwrap_or_default(),
            "stream status"
        ),
        MarketEvent::CandlesBootstrap(series) => info!(
            event = event.name(),
            symbol = %series.symbol,
            timeframe = series.timeframe.as_str(),
            candles = series.len(),
            "candles bootstrapped"
        ),
        MarketEvent::CandleUpdate(update) => debug!(
            event = event.name(),
            symbol = %update.symbol,
            close = %format_price(Some(update.candle.close), &update.symbol),
            high = update.candle.high,
            low = update.candle.low,
            "candle updated"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market::types::MarketSnapshot;

    #[tokio::test]
    async fn console_runner_sees_chart_events() {
        let state = AppState::new(DashboardConfig::default());
        let mut events = state.subscribe_events();
        let chart_task = tokio::spawn(market::chart::run_chart_feed(
            std::sync::Arc::clone(&state.chart),
            state.cache.subscribe(),
            state.events.clone(),
            tokio_util::sync::CancellationToken::new(),
        ));

        select_chart(&state, None).expect("default chart should select");
        state
            .cache
            .upsert("BTCUSDT", MarketSnapshot::new("BTCUSDT", Some(95_500.0)));

        let bootstrap = events.recv().await.expect("bootstrap should be published");
        assert_eq!(bootstrap.name(), market::CANDLES_BOOTSTRAP_EVENT);
        log_market_event(&bootstrap);

        let update = events.recv().await.expect("candle update should be published");
        assert_eq!(update.name(), market::CANDLE_UPDATE_EVENT);
        log_market_event(&update);

        chart_task.abort();
    }
}
