pub mod binance_futures;
pub mod binance_kline_ws;

pub use binance_futures::{BinanceFuturesClient, BINANCE_FAPI_URL};
pub use binance_kline_ws::{parse_closed_bar, BinanceKlineWebSocket, BINANCE_FSTREAM_URL};
