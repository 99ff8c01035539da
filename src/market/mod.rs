pub mod board;
pub mod cache;
pub mod candles;
pub mod chart;
pub mod feed;
pub mod stream;
pub mod transport;
pub mod types;

use serde::Serialize;
use types::{CandleSeries, CandleUpdate, StreamStatusSnapshot};

pub const MARKET_STATUS_EVENT: &str = "market_status";
pub const CANDLES_BOOTSTRAP_EVENT: &str = "candles_bootstrap";
pub const CANDLE_UPDATE_EVENT: &str = "candle_update";
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published over the app's broadcast channel. This bus is the
/// surface a UI shell subscribes to; the console runner only logs it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum MarketEvent {
    MarketStatus(StreamStatusSnapshot),
    CandlesBootstrap(CandleSeries),
    CandleUpdate(CandleUpdate),
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarketStatus(_) => MARKET_STATUS_EVENT,
            Self::CandlesBootstrap(_) => CANDLES_BOOTSTRAP_EVENT,
            Self::CandleUpdate(_) => CANDLE_UPDATE_EVENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{Candle, Timeframe};

    #[test]
    fn event_tag_matches_event_name() {
        let event = MarketEvent::CandleUpdate(CandleUpdate {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            candle: Candle {
                time: 3_600,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
            },
        });

        let encoded = simd_json::serde::to_string(&event).expect("event should serialize");
        assert!(encoded.starts_with(&format!("{{\"event\":\"{}\"", event.name())));
        assert!(encoded.contains("\"timeframe\":\"1h\""));
    }
}
