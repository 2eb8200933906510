use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Side;
use crate::values::{Timestamp, from_epoch_seconds};

/// Single price level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
    /// Number of orders resting at this level
    #[serde(default = "default_count")]
    pub count: u32,
}

impl BookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size,
            count: 1,
        }
    }
}

fn default_count() -> u32 {
    1
}

/// Order book state: bids best-first (descending), asks best-first (ascending)
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: Timestamp,
}

impl OrderBook {
    /// Create a book, sorting both sides best-first
    pub fn new(mut bids: Vec<BookLevel>, mut asks: Vec<BookLevel>, timestamp: Timestamp) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            bids,
            asks,
            timestamp,
        }
    }

    pub fn empty(timestamp: Timestamp) -> Self {
        Self::new(Vec::new(), Vec::new(), timestamp)
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Best ask minus best bid, `None` when either side is empty
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    /// Midpoint of the best levels, `None` when either side is empty
    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / Decimal::TWO)
    }
}

/// A single executed trade
#[derive(Debug, Clone, PartialEq)]
pub struct TradePrint {
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    pub timestamp: Timestamp,
    pub trade_id: Option<String>,
}

/// Latest market data for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub symbol: String,
    /// Top-of-book quote when the platform pushes one directly
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub order_book: OrderBook,
    pub last_trade: Option<TradePrint>,
    pub recent_trades: Vec<TradePrint>,
    pub timestamp: Timestamp,
}

// Lenient wire shapes: every field optional, timestamps as epoch seconds.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawBook {
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
    timestamp: Option<f64>,
}

#[derive(Deserialize)]
struct RawTrade {
    price: Decimal,
    size: Decimal,
    side: Side,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    trade_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMarketData {
    symbol: Option<String>,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
    order_book: Option<RawBook>,
    last_trade: Option<RawTrade>,
    recent_trades: Vec<RawTrade>,
    timestamp: Option<f64>,
    /// MT5 pushes quote time as `time`
    time: Option<f64>,
}

fn timestamp_or_now(secs: Option<f64>) -> Timestamp {
    secs.and_then(from_epoch_seconds).unwrap_or_else(Utc::now)
}

impl From<RawTrade> for TradePrint {
    fn from(raw: RawTrade) -> Self {
        Self {
            price: raw.price,
            size: raw.size,
            side: raw.side,
            timestamp: timestamp_or_now(raw.timestamp),
            trade_id: raw.trade_id,
        }
    }
}

impl MarketData {
    /// Parse a `market_data` payload
    ///
    /// Missing pieces fall back to defaults: symbol `unknown`, empty book,
    /// no trades, current time.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let raw: RawMarketData = serde_json::from_value(value.clone())?;
        let book = raw.order_book.unwrap_or_default();

        Ok(Self {
            symbol: raw.symbol.unwrap_or_else(|| "unknown".to_string()),
            bid: raw.bid,
            ask: raw.ask,
            order_book: OrderBook::new(book.bids, book.asks, timestamp_or_now(book.timestamp)),
            last_trade: raw.last_trade.map(TradePrint::from),
            recent_trades: raw.recent_trades.into_iter().map(TradePrint::from).collect(),
            timestamp: timestamp_or_now(raw.timestamp.or(raw.time)),
        })
    }

    /// Best bid: pushed quote first, then the book
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bid.or_else(|| self.order_book.best_bid().map(|l| l.price))
    }

    /// Best ask: pushed quote first, then the book
    pub fn best_ask(&self) -> Option<Decimal> {
        self.ask.or_else(|| self.order_book.best_ask().map(|l| l.price))
    }

    /// Market data is usable when both sides are quoted
    pub fn is_valid(&self) -> bool {
        self.best_bid().is_some() && self.best_ask().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_book_sorted_best_first() {
        let book = OrderBook::new(
            vec![BookLevel::new(dec!(1.0998), dec!(1)), BookLevel::new(dec!(1.0999), dec!(2))],
            vec![BookLevel::new(dec!(1.1003), dec!(1)), BookLevel::new(dec!(1.1001), dec!(3))],
            Utc::now(),
        );

        assert_eq!(book.best_bid().unwrap().price, dec!(1.0999));
        assert_eq!(book.best_ask().unwrap().price, dec!(1.1001));
        assert_eq!(book.spread(), Some(dec!(0.0002)));
        assert_eq!(book.mid_price(), Some(dec!(1.1000)));
    }

    #[test]
    fn test_empty_book_has_no_spread() {
        let book = OrderBook::empty(Utc::now());
        assert_eq!(book.spread(), None);
        assert_eq!(book.mid_price(), None);
    }

    #[test]
    fn test_parse_full_payload() {
        let value = json!({
            "symbol": "EURUSD",
            "order_book": {
                "bids": [{"price": 1.0999, "size": 2.0, "count": 3}],
                "asks": [{"price": 1.1001, "size": 1.5}],
                "timestamp": 1700000000.0
            },
            "last_trade": {"price": 1.1, "size": 0.5, "side": "buy", "trade_id": "t-1"},
            "recent_trades": [{"price": 1.1, "size": 0.5, "side": "sell"}],
            "timestamp": 1700000000.5
        });

        let md = MarketData::from_value(&value).unwrap();
        assert_eq!(md.symbol, "EURUSD");
        assert_eq!(md.order_book.bids[0].count, 3);
        assert_eq!(md.order_book.asks[0].count, 1);
        assert_eq!(md.last_trade.as_ref().unwrap().trade_id.as_deref(), Some("t-1"));
        assert_eq!(md.recent_trades.len(), 1);
        assert!(md.is_valid());
    }

    #[test]
    fn test_parse_quote_only_payload() {
        let value = json!({"symbol": "GBPUSD", "bid": 1.25, "ask": 1.2502, "spread": 2, "time": 1700000000});
        let md = MarketData::from_value(&value).unwrap();
        assert_eq!(md.best_bid(), Some(dec!(1.25)));
        assert!(md.order_book.bids.is_empty());
        assert!(md.is_valid());
    }

    #[test]
    fn test_parse_empty_payload_uses_defaults() {
        let md = MarketData::from_value(&json!({})).unwrap();
        assert_eq!(md.symbol, "unknown");
        assert!(!md.is_valid());
    }
}
