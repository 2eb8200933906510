//! Market and account data pushed by (or requested from) the trading platform

mod book;
mod snapshot;

pub use book::{BookLevel, MarketData, OrderBook, TradePrint};
pub use snapshot::{AccountInfo, MarketInfo, RefreshSnapshot};
