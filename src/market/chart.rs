use crate::market::candles::{apply_tick, generate_series};
use crate::market::types::{CandleSeries, CandleUpdate, MarketSnapshot, Timeframe};
use crate::market::MarketEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ChartState {
    NoSeries,
    SeriesReady(CandleSeries),
}

/// The chart's view of the candle engine: one series for the selected
/// (symbol, timeframe) pair, discarded and regenerated whenever the pair
/// changes.
#[derive(Debug)]
pub struct ChartSession {
    window_size: usize,
    state: ChartState,
}

impl ChartSession {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            state: ChartState::NoSeries,
        }
    }

    pub fn state(&self) -> &ChartState {
        &self.state
    }

    pub fn series(&self) -> Option<&CandleSeries> {
        match &self.state {
            ChartState::SeriesReady(series) => Some(series),
            ChartState::NoSeries => None,
        }
    }

    /// Returns `true` when a fresh series was generated. Re-selecting the
    /// current pair keeps the existing series.
    pub fn select(&mut self, symbol: &str, timeframe: Timeframe, base_price: Option<f64>) -> bool {
        if let Some(series) = self.series() {
            if series.symbol == symbol && series.timeframe == timeframe {
                return false;
            }
        }

        let candles = generate_series(
            base_price.unwrap_or_default(),
            timeframe,
            self.window_size,
        );
        info!(
            symbol,
            timeframe = timeframe.as_str(),
            candles = candles.len(),
            "generated candle series"
        );
        self.state = ChartState::SeriesReady(CandleSeries {
            symbol: symbol.to_string(),
            timeframe,
            candles,
        });
        true
    }

    /// Folds the snapshot's price into the open candle when it belongs to the
    /// selected symbol and carries a known price.
    pub fn on_snapshot(&mut self, snapshot: &MarketSnapshot) -> Option<CandleUpdate> {
        let ChartState::SeriesReady(series) = &mut self.state else {
            return None;
        };
        if series.symbol != snapshot.symbol {
            return None;
        }
        let price = snapshot.price()?;
        let candle = apply_tick(&mut series.candles, price)?;

        Some(CandleUpdate {
            symbol: series.symbol.clone(),
            timeframe: series.timeframe,
            candle,
        })
    }
}

pub async fn run_chart_feed(
    chart: Arc<Mutex<ChartSession>>,
    mut updates: broadcast::Receiver<Arc<MarketSnapshot>>,
    events: broadcast::Sender<MarketEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = updates.recv() => received,
        };

        match received {
            Ok(snapshot) => {
                let update = {
                    let mut writable = chart.lock();
                    writable.on_snapshot(&snapshot)
                };
                if let Some(update) = update {
                    let _ = events.send(MarketEvent::CandleUpdate(update));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "chart feed lagged behind snapshot updates");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
