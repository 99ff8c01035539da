use crate::error::AppError;
use crate::market::cache::SymbolCache;
use crate::market::transport::{FeedConnection, FeedFrame, FeedTransport};
use crate::market::types::{
    parse_feed_payload, ConnectionState, MarketStreamConfig, StreamStatusSnapshot,
};
use crate::market::MarketEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DECODE_LOG_THROTTLE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied { symbol: String },
    Dropped,
}

#[derive(Debug, Default)]
struct DecodeLogThrottle {
    last_reason: Option<String>,
    last_emit: Option<Instant>,
    suppressed: u64,
}

impl DecodeLogThrottle {
    /// Returns the number of identical warnings swallowed since the last one
    /// that was let through, or `None` while still inside the quiet window.
    fn allow(&mut self, reason: &str) -> Option<u64> {
        let now = Instant::now();
        let repeated = self.last_reason.as_deref() == Some(reason)
            && self
                .last_emit
                .map(|instant| {
                    now.duration_since(instant) < Duration::from_millis(DECODE_LOG_THROTTLE_MS)
                })
                .unwrap_or(false);

        if repeated {
            self.suppressed = self.suppressed.saturating_add(1);
            return None;
        }

        self.last_reason = Some(reason.to_string());
        self.last_emit = Some(now);
        Some(std::mem::take(&mut self.suppressed))
    }
}

/// Connection state machine for the price feed.
///
/// Every transition is a plain method so it can be driven without a socket;
/// [`run_feed_stream`] wires the transitions to a real [`FeedTransport`].
/// The client is the only writer of the [`SymbolCache`] and of the status
/// store.
pub struct StreamClient {
    config: MarketStreamConfig,
    cache: SymbolCache,
    status_store: Arc<RwLock<StreamStatusSnapshot>>,
    events: broadcast::Sender<MarketEvent>,
    state: ConnectionState,
    retry_delay: Duration,
    last_error: Option<String>,
    link_failure: bool,
    reconnect_attempts: u64,
    messages_applied: u64,
    decode_failures: u64,
    decode_throttle: DecodeLogThrottle,
}

impl StreamClient {
    pub fn new(
        config: MarketStreamConfig,
        cache: SymbolCache,
        status_store: Arc<RwLock<StreamStatusSnapshot>>,
        events: broadcast::Sender<MarketEvent>,
    ) -> Self {
        let retry_delay = config.retry_delay;
        Self {
            config,
            cache,
            status_store,
            events,
            state: ConnectionState::Closed,
            retry_delay,
            last_error: None,
            link_failure: false,
            reconnect_attempts: 0,
            messages_applied: 0,
            decode_failures: 0,
            decode_throttle: DecodeLogThrottle::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the endpoint to open, or `None` when a connection is already
    /// being opened or is live.
    pub fn connect(&mut self) -> Option<String> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(state = ?self.state, "connect ignored, stream already active");
            return None;
        }

        self.state = ConnectionState::Connecting;
        let reason = if self.reconnect_attempts == 0 {
            "opening feed stream".to_string()
        } else {
            format!("reconnect attempt {}", self.reconnect_attempts)
        };
        info!(endpoint = %self.config.endpoint, "{reason}");
        self.publish_status(Some(reason));
        Some(self.config.endpoint.clone())
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.retry_delay = self.config.retry_delay;
        self.last_error = None;
        self.link_failure = false;
        info!(endpoint = %self.config.endpoint, "feed connected");
        self.publish_status(Some("feed connected".to_string()));
    }

    /// Decodes one payload and stores it. A bad payload is logged and dropped;
    /// it never touches the cache or the connection.
    pub fn on_message(&mut self, payload: &mut [u8]) -> MessageOutcome {
        match parse_feed_payload(payload) {
            Ok(snapshot) => {
                let symbol = snapshot.symbol.clone();
                self.cache.upsert(symbol.clone(), snapshot);
                self.messages_applied = self.messages_applied.saturating_add(1);
                self.sync_counters();
                MessageOutcome::Applied { symbol }
            }
            Err(error) => {
                self.decode_failures = self.decode_failures.saturating_add(1);
                let reason = error.to_string();
                if let Some(suppressed) = self.decode_throttle.allow(&reason) {
                    warn!(
                        error = %reason,
                        suppressed,
                        "dropping undecodable feed message"
                    );
                }
                self.sync_counters();
                MessageOutcome::Dropped
            }
        }
    }

    /// Marks the link as failed for observers. Retry scheduling stays with
    /// [`StreamClient::on_close`].
    pub fn on_error(&mut self, error: &AppError) {
        let message = error.to_string();
        warn!(error = %message, "feed link failure");
        self.last_error = Some(message.clone());
        self.link_failure = true;
        self.publish_status(Some(format!("link failure: {message}")));
    }

    /// Returns the delay before the next attempt, exactly once per close.
    pub fn on_close(&mut self, reason: &str) -> Option<Duration> {
        if self.state == ConnectionState::Closed {
            debug!(reason, "close ignored, retry already scheduled");
            return None;
        }

        self.state = ConnectionState::Closed;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        info!(
            reason,
            retry_in_ms = self.retry_delay.as_millis() as u64,
            "feed closed, scheduling reconnect"
        );
        self.publish_status(Some(reason.to_string()));
        Some(self.retry_delay)
    }

    pub fn shutdown(&mut self) {
        self.state = ConnectionState::Closed;
        info!("feed stream stopped");
        self.publish_status(Some("stream stopped".to_string()));
    }

    pub fn status(&self, reason: Option<String>) -> StreamStatusSnapshot {
        StreamStatusSnapshot {
            state: self.state,
            endpoint: self.config.endpoint.clone(),
            retry_delay_ms: self.retry_delay.as_millis().min(u64::MAX as u128) as u64,
            last_error: self.last_error.clone(),
            link_failure: self.link_failure,
            reconnect_attempts: self.reconnect_attempts,
            messages_applied: self.messages_applied,
            decode_failures: self.decode_failures,
            reason,
        }
    }

    fn publish_status(&self, reason: Option<String>) {
        let snapshot = self.status(reason);
        {
            let mut writable = self.status_store.write();
            *writable = snapshot.clone();
        }
        let _ = self.events.send(MarketEvent::MarketStatus(snapshot));
    }

    fn sync_counters(&self) {
        let mut writable = self.status_store.write();
        writable.messages_applied = self.messages_applied;
        writable.decode_failures = self.decode_failures;
    }
}

/// Drives the client until `cancel_token` fires: connect, pump frames, and
/// after every close wait the flat retry delay before the next attempt.
pub async fn run_feed_stream<T: FeedTransport>(
    mut transport: T,
    mut client: StreamClient,
    cancel_token: CancellationToken,
) {
    while !cancel_token.is_cancelled() {
        let Some(endpoint) = client.connect() else {
            break;
        };

        let opened = tokio::select! {
            _ = cancel_token.cancelled() => break,
            opened = transport.open(&endpoint) => opened,
        };

        let close_reason = match opened {
            Ok(mut connection) => {
                client.on_open();
                pump_frames(&mut connection, &mut client, &cancel_token).await
            }
            Err(error) => {
                client.on_error(&error);
                format!("connect failed: {error}")
            }
        };

        if cancel_token.is_cancelled() {
            break;
        }

        let Some(delay) = client.on_close(&close_reason) else {
            continue;
        };
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    client.shutdown();
}

async fn pump_frames<C: FeedConnection>(
    connection: &mut C,
    client: &mut StreamClient,
    cancel_token: &CancellationToken,
) -> String {
    loop {
        let frame = tokio::select! {
            _ = cancel_token.cancelled() => return "stream cancelled".to_string(),
            frame = connection.next_frame() => frame,
        };

        match frame {
            Some(Ok(FeedFrame::Payload(mut payload))) => {
                client.on_message(payload.as_mut_slice());
            }
            Some(Ok(FeedFrame::Close)) => return "feed closed the connection".to_string(),
            Some(Err(error)) => {
                client.on_error(&error);
                return format!("link failure: {error}");
            }
            None => return "feed stream ended".to_string(),
        }
    }
}
