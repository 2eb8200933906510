use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Quote block of a `refresh` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketInfo {
    pub symbol: Option<String>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
}

/// Account block of a `refresh` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountInfo {
    pub balance: Option<Decimal>,
    pub equity: Option<Decimal>,
    pub margin: Option<Decimal>,
}

/// Market, account and portfolio snapshot returned by the `refresh` command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSnapshot {
    pub market_info: MarketInfo,
    pub account_info: AccountInfo,
    /// Anything else the platform sends (portfolio, positions, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RefreshSnapshot {
    /// Parse the `data` object of a successful refresh response
    pub fn from_data(data: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(data.clone()))
    }

    /// Human-readable lines for display surfaces
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let market = &self.market_info;
        let account = &self.account_info;

        if let Some(symbol) = &market.symbol {
            lines.push(format!("Symbol: {symbol}"));
        }
        if let (Some(bid), Some(ask)) = (market.bid, market.ask) {
            lines.push(format!("Bid: {bid} | Ask: {ask}"));
        }
        if let Some(last) = market.last {
            lines.push(format!("Last price: {last}"));
        }
        if let Some(balance) = account.balance {
            lines.push(format!("Balance: {balance}"));
        }
        if let Some(equity) = account.equity {
            lines.push(format!("Equity: {equity}"));
        }
        if let Some(margin) = account.margin {
            lines.push(format!("Margin: {margin}"));
        }

        if lines.is_empty() {
            lines.push("Market data received but no details available".to_string());
        }
        lines
    }
}
