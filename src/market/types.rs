use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_TIMEFRAME: Timeframe = Timeframe::M30;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
pub const MIN_RETRY_DELAY_MS: u64 = 500;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const DEFAULT_WINDOW_SIZE: usize = 60;
pub const MIN_WINDOW_SIZE: usize = 10;
pub const MAX_WINDOW_SIZE: usize = 1_000;

const LIVE_INDICATOR_LABEL: &str = "Live Sync";
const RECONNECTING_INDICATOR_LABEL: &str = "Reconnecting...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    pub fn interval_secs(self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        }
    }
}

impl FromStr for Timeframe {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|timeframe| timeframe.as_str() == normalized)
            .ok_or_else(|| AppError::InvalidArgument(format!("unsupported timeframe '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Up,
    Down,
    Bullish,
    Bearish,
    Sideways,
    #[serde(other)]
    Unknown,
}

impl Trend {
    pub fn is_rising(self) -> bool {
        matches!(self, Self::Up | Self::Bullish)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    #[serde(alias = "STRONG BUY")]
    StrongBuy,
    Buy,
    Sell,
    #[serde(alias = "STRONG SELL")]
    StrongSell,
    Hold,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AiPrediction {
    #[serde(default)]
    pub signal: Signal,
    #[serde(default)]
    pub prediction_target: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub bullish_score: Option<f64>,
    #[serde(default)]
    pub bearish_score: Option<f64>,
    #[serde(default)]
    pub bias: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct WhaleAlert {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub amount_usdt: Option<String>,
}

/// Latest known state for one symbol, exactly as the most recent feed message
/// described it.
///
/// Deserializes from the feed's snake_case wire format and serializes to
/// camelCase for UI consumers. Only `symbol` and `current_price` can reject
/// a message; any other field with an unexpected shape decodes as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MarketSnapshot {
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub trend: Option<Trend>,
    #[serde(default, deserialize_with = "lenient_number_or_none")]
    pub rsi: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ai_prediction: Option<AiPrediction>,
    #[serde(default, deserialize_with = "lenient_number_or_none")]
    pub bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number_or_none")]
    pub ask: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number_or_none")]
    pub recommended_buy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number_or_none")]
    pub recommended_sell: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub neural_talk: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub whale_alert: Option<WhaleAlert>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub news: Option<Vec<NewsItem>>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, current_price: Option<f64>) -> Self {
        Self {
            symbol: symbol.into(),
            current_price,
            trend: None,
            rsi: None,
            ai_prediction: None,
            bid: None,
            ask: None,
            recommended_buy: None,
            recommended_sell: None,
            neural_talk: None,
            whale_alert: None,
            news: None,
            timestamp: None,
        }
    }

    /// The current price, or `None` while it is still unknown. Zero is never a
    /// real price.
    pub fn price(&self) -> Option<f64> {
        self.current_price
            .filter(|price| price.is_finite() && *price > 0.0)
    }

    fn validated(mut self) -> Result<Self, AppError> {
        self.symbol = normalize_symbol(&self.symbol)?;

        if let Some(price) = self.current_price {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::InvalidArgument(
                    "current_price must be a finite non-negative number".to_string(),
                ));
            }
        }

        for quote in [
            &mut self.bid,
            &mut self.ask,
            &mut self.recommended_buy,
            &mut self.recommended_sell,
        ] {
            *quote = quote.filter(|price| price.is_finite() && *price >= 0.0);
        }

        self.rsi = self
            .rsi
            .filter(|rsi| rsi.is_finite() && (0.0..=100.0).contains(rsi));
        Ok(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    fn into_number(self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(value)) => Ok(Some(value)),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn lenient_number_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::<D, NumberOrText>(deserializer)?.and_then(NumberOrText::into_number))
}

/// Decodes the field if it has the expected shape and yields `None`
/// otherwise. Malformed JSON still fails the whole message.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<simd_json::OwnedValue>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| simd_json::serde::from_owned_value(value).ok()))
}

/// Like [`lenient`], applied per element so one bad entry only drops itself.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(items) = lenient::<D, Vec<simd_json::OwnedValue>>(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter_map(|item| simd_json::serde::from_owned_value(item).ok())
            .collect(),
    ))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        lenient::<D, NumberOrText>(deserializer)?.map(|value| match value {
            NumberOrText::Number(number) => number.to_string(),
            NumberOrText::Text(text) => text,
        }),
    )
}

pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(
            "symbol must be non-empty alphanumeric ASCII".to_string(),
        ));
    }
    Ok(symbol)
}

pub fn parse_feed_payload(payload: &mut [u8]) -> Result<MarketSnapshot, AppError> {
    let wire: MarketSnapshot = simd_json::serde::from_slice(payload)?;
    wire.validated()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn apply_price(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.high >= self.open.max(self.close)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandleUpdate {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle: Candle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatusSnapshot {
    pub state: ConnectionState,
    pub endpoint: String,
    pub retry_delay_ms: u64,
    pub last_error: Option<String>,
    pub link_failure: bool,
    pub reconnect_attempts: u64,
    pub messages_applied: u64,
    pub decode_failures: u64,
    pub reason: Option<String>,
}

impl StreamStatusSnapshot {
    pub fn idle(endpoint: String, retry_delay_ms: u64) -> Self {
        Self {
            state: ConnectionState::Closed,
            endpoint,
            retry_delay_ms,
            last_error: None,
            link_failure: false,
            reconnect_attempts: 0,
            messages_applied: 0,
            decode_failures: 0,
            reason: Some("stream idle".to_string()),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn indicator_label(&self) -> &'static str {
        if self.is_live() {
            LIVE_INDICATOR_LABEL
        } else {
            RECONNECTING_INDICATOR_LABEL
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartMarketStreamArgs {
    pub endpoint: Option<String>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MarketStreamConfig {
    pub endpoint: String,
    pub retry_delay: Duration,
}

impl StartMarketStreamArgs {
    pub fn normalize(self) -> Result<MarketStreamConfig, AppError> {
        let endpoint = self
            .endpoint
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::InvalidArgument("endpoint must not be empty".to_string()))?;

        let parsed = url::Url::parse(&endpoint)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(AppError::InvalidArgument(format!(
                "endpoint scheme must be ws or wss, got '{}'",
                parsed.scheme()
            )));
        }

        let retry_delay_ms = self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS);
        if !(MIN_RETRY_DELAY_MS..=MAX_RETRY_DELAY_MS).contains(&retry_delay_ms) {
            return Err(AppError::InvalidArgument(format!(
                "retryDelayMs must be between {MIN_RETRY_DELAY_MS} and {MAX_RETRY_DELAY_MS}"
            )));
        }

        Ok(MarketStreamConfig {
            endpoint,
            retry_delay: Duration::from_millis(retry_delay_ms),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStreamSession {
    pub running: bool,
    pub endpoint: String,
    pub retry_delay_ms: u64,
}

impl MarketStreamSession {
    pub fn from_config(config: &MarketStreamConfig) -> Self {
        Self {
            running: true,
            endpoint: config.endpoint.clone(),
            retry_delay_ms: config.retry_delay.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStreamStopResult {
    pub stopped: bool,
}
