use crate::error::AppError;
use crate::market::types::{normalize_symbol, CandleSeries, Timeframe};
use crate::market::MarketEvent;
use crate::state::AppState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectChartArgs {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
}

impl SelectChartArgs {
    pub fn normalize(
        self,
        default_symbol: &str,
        default_timeframe: Timeframe,
    ) -> Result<(String, Timeframe), AppError> {
        let symbol = match self.symbol {
            Some(raw) => normalize_symbol(&raw)?,
            None => default_symbol.to_string(),
        };
        let timeframe = match self.timeframe {
            Some(raw) => raw.parse::<Timeframe>()?,
            None => default_timeframe,
        };
        Ok((symbol, timeframe))
    }
}

/// Points the chart at a (symbol, timeframe) pair. A new pair gets a fresh
/// backfilled series seeded from the cached price and announced as a
/// bootstrap event.
pub fn select_chart(
    state: &AppState,
    args: Option<SelectChartArgs>,
) -> Result<CandleSeries, AppError> {
    let (symbol, timeframe) = args
        .unwrap_or_default()
        .normalize(&state.config.default_symbol, state.config.default_timeframe)?;
    let base_price = state.cache.get(&symbol).price();

    let (regenerated, series) = {
        let mut chart = state.chart.lock();
        let regenerated = chart.select(&symbol, timeframe, base_price);
        let series = chart.series().cloned().ok_or_else(|| {
            AppError::InvalidArgument(format!("no candle series for {symbol}"))
        })?;
        (regenerated, series)
    };

    if regenerated {
        let _ = state
            .events
            .send(MarketEvent::CandlesBootstrap(series.clone()));
    }
    Ok(series)
}

pub fn chart_series(state: &AppState) -> Option<CandleSeries> {
    state.chart.lock().series().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::market::candles::FALLBACK_BASE_PRICE;
    use crate::market::types::MarketSnapshot;

    #[test]
    fn select_defaults_to_configured_pair() {
        let state = AppState::new(DashboardConfig::default());
        let mut events = state.subscribe_events();
        assert!(chart_series(&state).is_none());

        let series = select_chart(&state, None).expect("default selection should succeed");

        assert_eq!(series.symbol, "BTCUSDT");
        assert_eq!(series.timeframe, Timeframe::M30);
        assert_eq!(series.len(), 61);
        assert_eq!(series.candles[0].open, FALLBACK_BASE_PRICE);
        assert_eq!(chart_series(&state), Some(series));
        assert!(matches!(
            events.try_recv(),
            Ok(MarketEvent::CandlesBootstrap(_))
        ));
    }

    #[test]
    fn select_seeds_from_cached_price() {
        let state = AppState::new(DashboardConfig::default());
        state
            .cache
            .upsert("SOLUSDT", MarketSnapshot::new("SOLUSDT", Some(150.0)));

        let series = select_chart(
            &state,
            Some(SelectChartArgs {
                symbol: Some("solusdt".to_string()),
                timeframe: Some("1H".to_string()),
            }),
        )
        .expect("selection should succeed");

        assert_eq!(series.symbol, "SOLUSDT");
        assert_eq!(series.timeframe, Timeframe::H1);
        assert_eq!(series.candles[0].open, 150.0);
    }

    #[test]
    fn reselecting_same_pair_publishes_nothing() {
        let state = AppState::new(DashboardConfig::default());
        select_chart(&state, None).expect("selection should succeed");
        let mut events = state.subscribe_events();

        select_chart(&state, None).expect("reselection should succeed");

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn rejects_unknown_timeframe() {
        let state = AppState::new(DashboardConfig::default());

        let result = select_chart(
            &state,
            Some(SelectChartArgs {
                symbol: None,
                timeframe: Some("2h".to_string()),
            }),
        );

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert!(chart_series(&state).is_none());
    }
}
