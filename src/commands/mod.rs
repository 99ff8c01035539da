pub mod app_info;
pub mod chart;
pub mod health;
pub mod market_stream;
