use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The auction being analyzed.
///
/// Fields arrive as the caller supplied them; range and format checks happen
/// when the context is built, so a bad deadline or non-positive size is a
/// validation error rather than a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BwicDetails {
    #[serde(alias = "bond_cusip")]
    pub cusip: String,
    #[serde(alias = "bond_name")]
    pub name: String,
    /// Face amount in millions.
    pub size: Decimal,
    /// ISO-8601 timestamp. A missing offset is read as UTC.
    pub deadline: String,
    #[serde(default)]
    pub seller: Option<String>,
    /// e.g. "Corporate", "Treasury", "Muni".
    #[serde(default)]
    pub bond_type: Option<String>,
}

/// Last-trade and quote snapshot reported to TRACE.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceData {
    #[serde(default)]
    pub last_trade_price: Option<Decimal>,
    #[serde(default)]
    pub last_trade_size: Option<Decimal>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub volume_30d: Option<Decimal>,
    /// Any other reported fields, carried through to the prompt verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparableTrade {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default, rename = "type")]
    pub trade_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Market backdrop for the auction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    /// Tenor label (e.g. "2Y", "6M") to yield in percent. Must hold at
    /// least one point when given.
    #[serde(default)]
    pub curve_data: Option<BTreeMap<String, Decimal>>,
    #[serde(default)]
    pub trace_data: Option<TraceData>,
    /// Free-form liquidity figures such as `bid_ask_spread`, `daily_volume`.
    #[serde(default)]
    pub liquidity_metrics: Option<BTreeMap<String, Decimal>>,
    #[serde(default)]
    pub comparable_trades: Option<Vec<ComparableTrade>>,
}

/// Outcome of a previous auction in the same or a similar line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoricalBwic {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub winning_bid: Option<Decimal>,
    #[serde(default)]
    pub fair_value_at_time: Option<Decimal>,
    #[serde(default)]
    pub number_of_bids: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Fair-value anchor and auction history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValuationData {
    /// Required; `None` is rejected by the context builder.
    #[serde(default)]
    pub fair_value: Option<Decimal>,
    #[serde(default)]
    pub model_price: Option<Decimal>,
    #[serde(default)]
    pub market_price: Option<Decimal>,
    #[serde(default)]
    pub old_bwics: Option<Vec<HistoricalBwic>>,
}

/// Desk posture. The enumerated fields stay as text here and are checked
/// against `RiskAppetite` / `InventoryLevel` by the context builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderConstraints {
    pub risk_appetite: String,
    pub inventory_level: String,
    #[serde(default)]
    pub max_position_size: Option<Decimal>,
    /// Days.
    #[serde(default)]
    pub target_hold_period: Option<i64>,
}

/// The four records that make up one analysis request. This is also the
/// on-disk input file format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisInput {
    pub bwic: BwicDetails,
    #[serde(default)]
    pub market: MarketContext,
    pub valuation: ValuationData,
    pub constraints: TraderConstraints,
}
