use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fewest scenario rows a usable analysis may carry.
pub const MIN_SCENARIOS: usize = 3;
/// Most scenario rows kept; extra rows are truncated in original order.
pub const MAX_SCENARIOS: usize = 5;

/// Placeholder text for a narrative section the model did not supply.
pub const MISSING_SECTION_MARKER: &str = "[not provided by model]";

/// One row of the bid-scenario table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BidScenario {
    pub bid_price: Decimal,
    /// 0.0 to 1.0.
    pub win_probability_low: Decimal,
    /// 0.0 to 1.0, never below `win_probability_low`.
    pub win_probability_high: Decimal,
    /// Expected P&L if the bid wins, in price points.
    pub expected_pnl: Decimal,
    pub pnl_low: Decimal,
    pub pnl_high: Decimal,
}

impl BidScenario {
    pub fn win_probability_range(&self) -> (Decimal, Decimal) {
        (self.win_probability_low, self.win_probability_high)
    }

    pub fn pnl_range(&self) -> (Decimal, Decimal) {
        (self.pnl_low, self.pnl_high)
    }
}

/// The structured result of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub seller_intent: String,
    #[serde(default)]
    pub urgency_assessment: Option<String>,
    pub auction_dynamics: String,
    /// 3 to 5 rows, ascending by bid price.
    pub scenarios: Vec<BidScenario>,
    pub commentary: String,
    pub risks: Vec<String>,
    /// What could not be recovered from the model's answer. A non-empty list
    /// marks the analysis as partial.
    #[serde(default)]
    pub warnings: Vec<ParseWarning>,
}

impl Analysis {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Report sections, in canonical order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    Summary,
    SellerIntent,
    Urgency,
    AuctionDynamics,
    Scenarios,
    Commentary,
    Risks,
}

impl ReportSection {
    pub const ALL: [ReportSection; 7] = [
        ReportSection::Summary,
        ReportSection::SellerIntent,
        ReportSection::Urgency,
        ReportSection::AuctionDynamics,
        ReportSection::Scenarios,
        ReportSection::Commentary,
        ReportSection::Risks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSection::Summary => "summary",
            ReportSection::SellerIntent => "seller_intent",
            ReportSection::Urgency => "urgency",
            ReportSection::AuctionDynamics => "auction_dynamics",
            ReportSection::Scenarios => "scenarios",
            ReportSection::Commentary => "commentary",
            ReportSection::Risks => "risks",
        }
    }

    /// Heading used in requests and rendered reports.
    pub fn heading(&self) -> &'static str {
        match self {
            ReportSection::Summary => "SUMMARY",
            ReportSection::SellerIntent => "SELLER INTENT & URGENCY",
            ReportSection::Urgency => "URGENCY",
            ReportSection::AuctionDynamics => "AUCTION DYNAMICS",
            ReportSection::Scenarios => "BID SCENARIOS",
            ReportSection::Commentary => "COMMENTARY",
            ReportSection::Risks => "RISKS & CAVEATS",
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal extraction problem. Always surfaced with the analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseWarning {
    pub section: ReportSection,
    pub message: String,
}

impl ParseWarning {
    pub fn new(section: ReportSection, message: impl Into<String>) -> Self {
        Self {
            section,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.section, self.message)
    }
}
