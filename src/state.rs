use crate::config::DashboardConfig;
use crate::market::cache::SymbolCache;
use crate::market::chart::ChartSession;
use crate::market::types::{MarketStreamSession, StreamStatusSnapshot};
use crate::market::{MarketEvent, EVENT_CHANNEL_CAPACITY};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct MarketStreamHandle {
    pub cancellation_token: CancellationToken,
    pub join_handles: Vec<JoinHandle<()>>,
    pub session: MarketStreamSession,
}

/// Composition root shared by every command.
pub struct AppState {
    pub started_at: Instant,
    pub config: DashboardConfig,
    pub http_client: Client,
    pub cache: SymbolCache,
    pub events: broadcast::Sender<MarketEvent>,
    pub market_stream: Mutex<Option<MarketStreamHandle>>,
    pub market_status: Arc<parking_lot::RwLock<StreamStatusSnapshot>>,
    pub chart: Arc<parking_lot::Mutex<ChartSession>>,
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Self {
        let market_status =
            StreamStatusSnapshot::idle(config.feed_endpoint(), config.retry_delay_ms);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let chart = ChartSession::new(config.window_size);

        Self {
            started_at: Instant::now(),
            http_client: Client::new(),
            cache: SymbolCache::new(),
            events,
            market_stream: Mutex::new(None),
            market_status: Arc::new(parking_lot::RwLock::new(market_status)),
            chart: Arc::new(parking_lot::Mutex::new(chart)),
            config,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }
}
