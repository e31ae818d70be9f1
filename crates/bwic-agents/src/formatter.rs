use bwic_models::analysis::{Analysis, BidScenario, ReportSection};
use rust_decimal::Decimal;

const WIDTH: usize = 80;

/// Render an analysis as the plain-text desk report.
///
/// Pure: the same analysis always renders to the same text.
pub fn format_analysis(analysis: &Analysis) -> String {
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);
    let mut out: Vec<String> = vec![
        heavy.clone(),
        "BWIC WIN PROBABILITY ANALYSIS".to_string(),
        heavy.clone(),
        "Advisory only: win probabilities are ranges, not certainties. Bid decisions stay with the desk."
            .to_string(),
    ];

    if analysis.is_partial() {
        out.push(String::new());
        out.push("PARTIAL RESULT - parts of the model response could not be recovered:".to_string());
        for warning in &analysis.warnings {
            out.push(format!("  * {warning}"));
        }
    }

    push_section(&mut out, ReportSection::Summary, &analysis.summary);
    push_section(&mut out, ReportSection::SellerIntent, &analysis.seller_intent);
    if let Some(urgency) = &analysis.urgency_assessment {
        out.push(format!("Urgency: {urgency}"));
    }
    push_section(&mut out, ReportSection::AuctionDynamics, &analysis.auction_dynamics);

    out.push(String::new());
    out.push(format!("{}:", ReportSection::Scenarios.heading()));
    out.push(light.clone());
    out.push(table_row(
        "Bid Price",
        "Win Probability Range",
        "Expected P&L",
        "P&L Range",
    ));
    out.push(light.clone());
    for scenario in &analysis.scenarios {
        out.push(scenario_row(scenario));
    }
    out.push(light);

    push_section(&mut out, ReportSection::Commentary, &analysis.commentary);

    out.push(String::new());
    out.push(format!("{}:", ReportSection::Risks.heading()));
    for risk in &analysis.risks {
        out.push(format!("- {risk}"));
    }
    out.push(heavy);

    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn push_section(out: &mut Vec<String>, section: ReportSection, body: &str) {
    out.push(String::new());
    out.push(format!("{}:", section.heading()));
    out.push(body.trim().to_string());
}

fn scenario_row(scenario: &BidScenario) -> String {
    table_row(
        &scenario.bid_price.to_string(),
        &format!(
            "{}%-{}%",
            percent(scenario.win_probability_low),
            percent(scenario.win_probability_high)
        ),
        &signed(scenario.expected_pnl),
        &format!("{} to {}", signed(scenario.pnl_low), signed(scenario.pnl_high)),
    )
}

// Cells are separated by at least two spaces so the table reads back.
fn table_row(bid: &str, probability: &str, pnl: &str, range: &str) -> String {
    format!("{bid:<15}  {probability:<22}  {pnl:<15}  {range}")
        .trim_end()
        .to_string()
}

/// 0.55 -> "55", 0.125 -> "12.5".
pub(crate) fn percent(fraction: Decimal) -> String {
    (fraction * Decimal::ONE_HUNDRED)
        .round_dp(1)
        .normalize()
        .to_string()
}

/// Explicit sign for non-negative values: 0.05 -> "+0.05".
pub(crate) fn signed(value: Decimal) -> String {
    if value.is_sign_negative() && !value.is_zero() {
        value.to_string()
    } else {
        format!("+{}", value.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, ParseOutcome};
    use bwic_models::analysis::ParseWarning;
    use rust_decimal_macros::dec;

    fn analysis() -> Analysis {
        Analysis {
            summary: "Moderate opportunity at 100.30-100.32.".to_string(),
            seller_intent: "Rebalancing, not distressed.".to_string(),
            urgency_assessment: Some("Medium - two hour window".to_string()),
            auction_dynamics: "Six to eight bidders expected.".to_string(),
            scenarios: vec![
                BidScenario {
                    bid_price: dec!(100.28),
                    win_probability_low: dec!(0.20),
                    win_probability_high: dec!(0.30),
                    expected_pnl: dec!(0.25),
                    pnl_low: dec!(0.15),
                    pnl_high: dec!(0.35),
                },
                BidScenario {
                    bid_price: dec!(100.30),
                    win_probability_low: dec!(0.35),
                    win_probability_high: dec!(0.45),
                    expected_pnl: dec!(0.15),
                    pnl_low: dec!(0.10),
                    pnl_high: dec!(0.20),
                },
                BidScenario {
                    bid_price: dec!(100.35),
                    win_probability_low: dec!(0.70),
                    win_probability_high: dec!(0.80),
                    expected_pnl: dec!(-0.10),
                    pnl_low: dec!(-0.15),
                    pnl_high: dec!(-0.05),
                },
            ],
            commentary: "100.30 balances fill odds and edge.".to_string(),
            risks: vec![
                "Adverse selection if we win at 100.35".to_string(),
                "Thin auction history".to_string(),
            ],
            warnings: vec![],
        }
    }

    #[test]
    fn renders_all_sections_in_order() {
        let text = format_analysis(&analysis());
        let order = [
            "BWIC WIN PROBABILITY ANALYSIS",
            "SUMMARY:",
            "SELLER INTENT & URGENCY:",
            "Urgency: Medium - two hour window",
            "AUCTION DYNAMICS:",
            "BID SCENARIOS:",
            "COMMENTARY:",
            "RISKS & CAVEATS:",
        ];
        let mut last = 0;
        for marker in order {
            let at = text[last..]
                .find(marker)
                .unwrap_or_else(|| panic!("{marker} missing or out of order"));
            last += at + marker.len();
        }
        let rows: Vec<Vec<&str>> = text
            .lines()
            .map(|l| l.split("  ").map(str::trim).filter(|c| !c.is_empty()).collect())
            .collect();
        assert!(rows.contains(&vec!["100.28", "20%-30%", "+0.25", "+0.15 to +0.35"]));
        assert!(rows.contains(&vec!["100.35", "70%-80%", "-0.10", "-0.15 to -0.05"]));
        assert!(text.contains("- Thin auction history"));
        assert!(!text.contains("PARTIAL RESULT"));
    }

    #[test]
    fn rendering_is_stable() {
        let a = analysis();
        assert_eq!(format_analysis(&a), format_analysis(&a.clone()));
    }

    #[test]
    fn partial_results_are_flagged() {
        let mut a = analysis();
        a.warnings
            .push(ParseWarning::new(ReportSection::Risks, "risks section missing"));
        let text = format_analysis(&a);
        assert!(text.contains("PARTIAL RESULT"));
        assert!(text.contains("[risks] risks section missing"));
    }

    #[test]
    fn report_reads_back_through_parser() {
        let original = analysis();
        let text = format_analysis(&original);
        let parsed = match parse(&text) {
            ParseOutcome::Parsed(a) => a,
            other => panic!("expected a clean parse, got {other:?}"),
        };
        assert_eq!(parsed.scenarios, original.scenarios);
        assert_eq!(parsed.risks, original.risks);
        assert_eq!(parsed.summary, original.summary);
        assert_eq!(parsed.urgency_assessment, original.urgency_assessment);
    }

    #[test]
    fn number_helpers() {
        assert_eq!(percent(dec!(0.55)), "55");
        assert_eq!(percent(dec!(0.125)), "12.5");
        assert_eq!(percent(dec!(1)), "100");
        assert_eq!(signed(dec!(0.05)), "+0.05");
        assert_eq!(signed(dec!(-0.02)), "-0.02");
        assert_eq!(signed(dec!(0.00)), "+0.00");
    }
}
