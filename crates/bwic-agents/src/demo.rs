//! Canned model answer for running the whole pipeline without a model service.
//!
//! The text is shaped like a real response so it goes through the same
//! parser; it is written for the Apple 3.5% 2030 sample auction.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::gateway::ModelGateway;
use crate::prompts::ModelRequest;

/// Answers every request with the same text.
#[derive(Debug, Clone)]
pub struct CannedGateway {
    text: String,
}

impl CannedGateway {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for CannedGateway {
    fn default() -> Self {
        Self::new(DEMO_RESPONSE)
    }
}

#[async_trait]
impl ModelGateway for CannedGateway {
    fn name(&self) -> &str {
        "demo"
    }

    async fn invoke(&self, _request: &ModelRequest) -> Result<String, AgentError> {
        Ok(self.text.clone())
    }
}

/// The Apple 3.5% 2030 sample auction. Decimals are quoted so their scale
/// survives into the prompt.
pub const DEMO_INPUT_JSON: &str = r#"{
  "bwic": {
    "cusip": "037833DX5",
    "name": "Apple Inc 3.5% 2030",
    "size": "25.0",
    "deadline": "2024-01-20T14:00:00Z",
    "seller": "Large Asset Manager",
    "bond_type": "Corporate"
  },
  "market": {
    "curve_data": {"2Y": "4.50", "5Y": "4.25", "10Y": "4.00", "30Y": "4.15"},
    "trace_data": {
      "last_trade_price": "100.25",
      "last_trade_size": "5.0",
      "bid": "100.20",
      "ask": "100.30",
      "volume_30d": "150.0"
    },
    "liquidity_metrics": {"bid_ask_spread": "0.10", "daily_volume": "10.0", "days_to_cover": "2.5"},
    "comparable_trades": [
      {"date": "2024-01-15", "size": "20.0", "price": "100.30", "type": "BWIC"},
      {"date": "2024-01-10", "size": "15.0", "price": "100.28", "type": "BWIC"}
    ]
  },
  "valuation": {
    "fair_value": "100.35",
    "model_price": "100.32",
    "market_price": "100.25",
    "old_bwics": [
      {"date": "2024-01-15", "size": "20.0", "winning_bid": "100.28", "fair_value_at_time": "100.30", "number_of_bids": 8},
      {"date": "2024-01-10", "size": "15.0", "winning_bid": "100.25", "fair_value_at_time": "100.28", "number_of_bids": 5}
    ]
  },
  "constraints": {
    "risk_appetite": "Medium",
    "inventory_level": "Low",
    "max_position_size": "30.0",
    "target_hold_period": 5
  }
}"#;

pub const DEMO_RESPONSE: &str = "\
## SUMMARY
Moderate opportunity on $25MM Apple 3.5% 2030. Fair value at 100.35 points to competitive bidding; 100.30-100.32 balances fill odds against edge.

## SELLER INTENT & URGENCY
A large asset manager running $25MM suggests rebalancing or profit-taking rather than distress. Size is 2.5x daily volume and the window is two hours, so the seller wants execution certainty but is not forced.
Urgency: Medium - size and deadline point to balanced urgency; a distressed seller would show larger size or an immediate deadline.

## AUCTION DYNAMICS
Expect 6-8 bidders based on recent history. Likely 2-3 aggressive dealers with light inventory, 3-4 at-market bids and 1-2 opportunistic shots. Crowding risk is modest given size, but Apple paper draws interest and may pull in more bids than the comparables suggest.

## BID SCENARIOS
| Bid Price | Win Probability Range | Expected P&L | P&L Range |
|---|---|---|---|
| 100.28 | 20%-30% | +0.25 | +0.15 to +0.35 |
| 100.30 | 35%-45% | +0.15 | +0.10 to +0.20 |
| 100.32 | 50%-60% | +0.05 | +0.00 to +0.10 |
| 100.35 | 70%-80% | -0.10 | -0.15 to -0.05 |

## COMMENTARY
Bid-ask is tight at 10 cents with about 10MM daily volume. The last two auctions cleared 2-3 cents through fair value with 5-8 bidders.
100.28 (7 cents through fair) rarely wins but carries the best P&L. 100.30 is the balanced level. 100.32 fills more often with thin edge; use it if the desk needs the position. 100.35 is at fair value and only makes sense with a strong view on direction.

## RISKS & CAVEATS
- Adverse selection: the seller may know something the market price does not; 2.5x daily volume raises the information-asymmetry risk.
- Overbidding: only two prior auctions on record, and recent volatility could bring more aggressive bidders than history suggests.
- Liquidity: 2.5 days to cover means a losing position takes time to unwind.
- Model limitations: TRACE last printed 100.25, 10 cents below fair value; check the gap before bidding.
- Timing: a two-hour window limits time for gathering market color.
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, ParseOutcome};

    #[tokio::test]
    async fn canned_gateway_returns_demo_answer() {
        let gateway = CannedGateway::default();
        let request = ModelRequest {
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
        };
        assert_eq!(gateway.invoke(&request).await.unwrap(), DEMO_RESPONSE);
        assert_eq!(gateway.name(), "demo");
    }

    #[test]
    fn demo_input_is_valid() {
        let input: bwic_models::AnalysisInput = serde_json::from_str(DEMO_INPUT_JSON).unwrap();
        assert_eq!(input.bwic.cusip, "037833DX5");
    }

    #[test]
    fn demo_response_parses_cleanly() {
        match parse(DEMO_RESPONSE) {
            ParseOutcome::Parsed(analysis) => {
                assert_eq!(analysis.scenarios.len(), 4);
                assert_eq!(analysis.risks.len(), 5);
                assert!(analysis.urgency_assessment.unwrap().starts_with("Medium"));
            }
            other => panic!("demo response should parse cleanly, got {other:?}"),
        }
    }
}
