//! Synthetic OHLC backfill and live tick folding.
//!
//! Backfill is a random walk seeded from the latest known price; it is not a
//! replay of real history. The open candle is never rolled into a new bucket:
//! every tick updates the last candle regardless of wall-clock time.

use crate::market::types::{Candle, Timeframe};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

pub const FALLBACK_BASE_PRICE: f64 = 95_000.0;
const STEP_VOLATILITY: f64 = 0.005;
const WICK_EXTENSION: f64 = 1.2;

/// Generates `window_size + 1` candles ending at the current bucket.
pub fn generate_series(base_price: f64, timeframe: Timeframe, window_size: usize) -> Vec<Candle> {
    let mut rng = rand::thread_rng();
    generate_series_with(&mut rng, base_price, timeframe, window_size, now_unix_secs())
}

pub fn generate_series_with<R: Rng + ?Sized>(
    rng: &mut R,
    base_price: f64,
    timeframe: Timeframe,
    window_size: usize,
    now_secs: i64,
) -> Vec<Candle> {
    let base = sanitize_base_price(base_price);
    let interval = timeframe.interval_secs();
    let last_open = bucket_open_time(now_secs, interval);
    let first_open = last_open - window_size as i64 * interval;

    let mut candles = Vec::with_capacity(window_size + 1);
    let mut price = base;
    for step in 0..=window_size {
        let open = price;
        let change = (rng.gen::<f64>() - 0.5) * base * STEP_VOLATILITY;
        let close = open + change;
        let excursion = change.abs() * WICK_EXTENSION;
        candles.push(Candle {
            time: first_open + step as i64 * interval,
            open,
            high: open.max(close).max(open + excursion),
            low: open.min(close).min(open - excursion),
            close,
        });
        price = close;
    }

    candles
}

/// Folds `price` into the last candle and returns it. Earlier candles are
/// never touched. Unknown prices (zero, negative, non-finite) are ignored.
pub fn apply_tick(candles: &mut [Candle], price: f64) -> Option<Candle> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let last = candles.last_mut()?;
    last.apply_price(price);
    Some(*last)
}

pub fn bucket_open_time(timestamp_secs: i64, interval_secs: i64) -> i64 {
    if interval_secs <= 0 {
        return timestamp_secs;
    }
    timestamp_secs - timestamp_secs.rem_euclid(interval_secs)
}

fn sanitize_base_price(base_price: f64) -> f64 {
    if base_price.is_finite() && base_price > 0.0 {
        base_price
    } else {
        FALLBACK_BASE_PRICE
    }
}

fn now_unix_secs() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs().min(i64::MAX as u64) as i64,
        Err(_) => 0,
    }
}
