use crate::market::cache::{SnapshotLookup, SymbolCache};
use crate::market::types::{StreamStatusSnapshot, Trend};

pub const PRICE_PLACEHOLDER: &str = "---";

const MICRO_PRICE_THRESHOLD: f64 = 0.1;
const MICRO_PRICE_SYMBOLS: [&str; 2] = ["SHIB", "PEPE"];

/// Display form of a price. Unknown and zero prices render as the placeholder;
/// meme coins and anything under 0.1 keep eight decimals.
pub fn format_price(price: Option<f64>, symbol: &str) -> String {
    let Some(price) = price.filter(|value| value.is_finite() && *value > 0.0) else {
        return PRICE_PLACEHOLDER.to_string();
    };

    let micro_symbol = MICRO_PRICE_SYMBOLS
        .iter()
        .any(|marker| symbol.contains(marker));
    if micro_symbol || price < MICRO_PRICE_THRESHOLD {
        return format!("{price:.8}");
    }

    group_thousands(&format!("{price:.2}"))
}

fn group_thousands(fixed: &str) -> String {
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed, ""));
    let digits = whole.as_bytes();
    let mut grouped = String::with_capacity(fixed.len() + digits.len() / 3);
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(char::from(*digit));
    }
    if !fraction.is_empty() {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

fn trend_marker(trend: Option<Trend>) -> &'static str {
    match trend {
        Some(trend) if trend.is_rising() => "▲",
        Some(Trend::Down | Trend::Bearish) => "▼",
        _ => "·",
    }
}

/// One header line with the connection indicator followed by one row per
/// symbol, in the order given.
pub fn render_watch_board(
    cache: &SymbolCache,
    symbols: &[String],
    status: &StreamStatusSnapshot,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(symbols.len() + 1);
    lines.push(format!(
        "[{}] {} symbols cached",
        status.indicator_label(),
        cache.len()
    ));

    for symbol in symbols {
        let row = match cache.get(symbol) {
            SnapshotLookup::Known(snapshot) => format!(
                "{symbol:<10} {:>18} {}",
                format_price(snapshot.price(), symbol),
                trend_marker(snapshot.trend)
            ),
            SnapshotLookup::Unknown => {
                format!("{symbol:<10} {PRICE_PLACEHOLDER:>18} {}", trend_marker(None))
            }
        };
        lines.push(row);
    }
    lines
}
