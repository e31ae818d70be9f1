use std::collections::BTreeMap;
use std::fmt::Display;

use bwic_models::analysis::{ReportSection, MAX_SCENARIOS, MIN_SCENARIOS};
use chrono::SecondsFormat;
use rust_decimal::Decimal;

use crate::context::AnalysisContext;
use crate::formatter::signed;

const NOT_PROVIDED: &str = "Not provided";

/// A compiled request for the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

pub fn system_prompt() -> String {
    "You are an expert fixed income trader with deep knowledge of BWIC auctions, market \
     microstructure, and dealer behavior. You express win probabilities as ranges, never as \
     certainties, and you never recommend automating bidding decisions."
        .to_string()
}

/// Render a context into a request. Equal contexts give byte-identical
/// requests: every collection is emitted in a fixed order and no clock or
/// random value is read here.
pub fn compile(ctx: &AnalysisContext) -> ModelRequest {
    let mut lines: Vec<String> = vec![
        "You are analyzing a BWIC (Bid Wanted In Competition) auction. Estimate the probability \
         that our bid wins across several bid scenarios, with reasoning a trading desk can use."
            .to_string(),
        String::new(),
    ];

    push_bwic(&mut lines, ctx);
    push_market(&mut lines, ctx);
    push_valuation(&mut lines, ctx);
    push_constraints(&mut lines, ctx);
    push_instructions(&mut lines);

    ModelRequest {
        system_prompt: system_prompt(),
        user_prompt: lines.join("\n"),
    }
}

fn push_bwic(lines: &mut Vec<String>, ctx: &AnalysisContext) {
    let timing = ctx.timing();
    lines.push("BWIC DETAILS:".to_string());
    lines.push(format!("- Bond: {} ({})", ctx.name(), ctx.cusip()));
    lines.push(format!("- Size: ${}MM", ctx.size_mm()));
    lines.push(format!(
        "- Deadline: {}",
        timing.deadline.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    if timing.elapsed {
        lines.push(
            "- Time remaining: ELAPSED (the deadline has passed; treat this as a post-deadline review)"
                .to_string(),
        );
    } else {
        lines.push(format!(
            "- Time remaining: {}",
            format_minutes(timing.minutes_remaining)
        ));
    }
    lines.push(format!("- Seller: {}", ctx.seller().unwrap_or(NOT_PROVIDED)));
    lines.push(format!("- Bond type: {}", ctx.bond_type().unwrap_or(NOT_PROVIDED)));
    let urgency_basis = match ctx.size_ratio() {
        Some(ratio) => format!(" (size is {}x typical market size)", ratio.normalize()),
        None => String::new(),
    };
    lines.push(format!("- Derived urgency: {}{}", ctx.urgency(), urgency_basis));
    lines.push(String::new());
}

fn push_market(lines: &mut Vec<String>, ctx: &AnalysisContext) {
    lines.push("MARKET CONTEXT:".to_string());

    if ctx.curve().is_empty() {
        lines.push(format!("- Yield curve: {NOT_PROVIDED}"));
    } else {
        lines.push("- Yield curve (tenor: yield %):".to_string());
        for point in ctx.curve() {
            lines.push(format!("  - {}: {}", point.tenor, point.yield_pct));
        }
        if let (Some(slope), Some(short), Some(long)) =
            (ctx.curve_slope_bp(), ctx.curve().first(), ctx.curve().last())
        {
            lines.push(format!(
                "- Curve slope ({} minus {}): {}bp",
                long.tenor,
                short.tenor,
                slope.normalize()
            ));
        }
    }

    match ctx.trace() {
        Some(trace) => {
            lines.push("- TRACE data:".to_string());
            let known = [
                ("last_trade_price", trace.last_trade_price),
                ("last_trade_size", trace.last_trade_size),
                ("bid", trace.bid),
                ("ask", trace.ask),
                ("volume_30d", trace.volume_30d),
            ];
            for (key, value) in known {
                if let Some(v) = value {
                    lines.push(format!("  - {key}: {v}"));
                }
            }
            for (key, value) in &trace.extra {
                lines.push(format!("  - {key}: {value}"));
            }
            if let Some(width) = ctx.bid_ask_width() {
                lines.push(format!("  - bid/ask width: {width}"));
            }
        }
        None => lines.push(format!("- TRACE data: {NOT_PROVIDED}")),
    }

    if ctx.liquidity().is_empty() {
        lines.push(format!("- Liquidity metrics: {NOT_PROVIDED}"));
    } else {
        lines.push("- Liquidity metrics:".to_string());
        for (key, value) in ctx.liquidity() {
            lines.push(format!("  - {key}: {value}"));
        }
    }

    let trades = ctx.comparable_trades();
    if trades.is_empty() {
        lines.push(format!("- Comparable trades: {NOT_PROVIDED}"));
    } else {
        lines.push(format!("- Comparable trades ({}):", trades.len()));
        for (i, trade) in trades.iter().enumerate() {
            let fields = [
                field("date", trade.date.as_ref()),
                field("size", trade.size.as_ref()),
                field("price", trade.price.as_ref()),
                field("type", trade.trade_type.as_ref()),
            ];
            lines.push(format!(
                "  {}. {}",
                i + 1,
                record_line(&fields, &trade.extra)
            ));
        }
    }
    lines.push(String::new());
}

fn push_valuation(lines: &mut Vec<String>, ctx: &AnalysisContext) {
    lines.push("VALUATION:".to_string());
    lines.push(format!("- Fair value: {}", ctx.fair_value()));
    lines.push(format!("- Model price: {}", or_not_provided(ctx.model_price())));
    lines.push(format!("- Market price: {}", or_not_provided(ctx.market_price())));
    if let Some(diff) = ctx.fair_vs_market() {
        lines.push(format!("- Fair value minus market price: {}", signed(diff)));
    }
    if let Some(diff) = ctx.fair_vs_model() {
        lines.push(format!("- Fair value minus model price: {}", signed(diff)));
    }

    let history = ctx.history();
    if history.is_empty() {
        lines.push(format!("- Historical BWICs: {NOT_PROVIDED}"));
    } else {
        lines.push(format!("- Historical BWICs ({}):", history.len()));
        for (i, past) in history.iter().enumerate() {
            let fields = [
                field("date", past.date.as_ref()),
                field("size", past.size.as_ref()),
                field("winning_bid", past.winning_bid.as_ref()),
                field("fair_value_at_time", past.fair_value_at_time.as_ref()),
                field("number_of_bids", past.number_of_bids.as_ref()),
            ];
            lines.push(format!("  {}. {}", i + 1, record_line(&fields, &past.extra)));
        }
        if let Some(stats) = ctx.history_stats() {
            if let Some(avg) = stats.avg_winning_bid_vs_fair {
                lines.push(format!(
                    "- Average winning bid minus fair value at the time: {}",
                    signed(avg.normalize())
                ));
            }
            if let Some(avg) = stats.avg_bidders {
                lines.push(format!("- Average number of bids: {}", avg.normalize()));
            }
        }
    }
    lines.push(String::new());
}

fn push_constraints(lines: &mut Vec<String>, ctx: &AnalysisContext) {
    lines.push("TRADER CONSTRAINTS:".to_string());
    lines.push(format!("- Risk appetite: {}", ctx.risk_appetite().as_str()));
    lines.push(format!("- Inventory level: {}", ctx.inventory_level().as_str()));
    lines.push(format!(
        "- Max position size: {}",
        or_not_provided(ctx.max_position_size())
    ));
    lines.push(format!(
        "- Target hold period: {}",
        ctx.target_hold_days()
            .map(|d| format!("{d} days"))
            .unwrap_or_else(|| NOT_PROVIDED.to_string())
    ));
    lines.push(String::new());
}

fn push_instructions(lines: &mut Vec<String>) {
    lines.push("YOUR ANALYSIS SHOULD:".to_string());
    lines.push(
        "1. Interpret seller intent and urgency: why the seller is running this BWIC and what \
         size, timing and market conditions signal."
            .to_string(),
    );
    lines.push(
        "2. Reason about auction dynamics: expected competition, dealer shading or aggressive \
         bidding, crowding, and how inventory positioning shapes other bids."
            .to_string(),
    );
    lines.push(format!(
        "3. Evaluate {MIN_SCENARIOS} to {MAX_SCENARIOS} bid scenarios at different price levels, \
         each with a win probability range, the expected P&L if won, and a P&L range."
    ));
    lines.push(String::new());

    lines.push(
        "OUTPUT FORMAT (use these headings exactly, each on its own line, in this order):"
            .to_string(),
    );
    lines.push(format!("## {}", ReportSection::Summary.heading()));
    lines.push("One or two lines: the opportunity and the key takeaway.".to_string());
    lines.push(format!("## {}", ReportSection::SellerIntent.heading()));
    lines.push(
        "One paragraph on seller motivation. End it with a line of the form \
         `Urgency: <Low|Medium|High> - <reason>`."
            .to_string(),
    );
    lines.push(format!("## {}", ReportSection::AuctionDynamics.heading()));
    lines.push("One paragraph on competition, dealer behavior and crowding.".to_string());
    lines.push(format!("## {}", ReportSection::Scenarios.heading()));
    lines.push(format!(
        "A pipe-delimited table with exactly these four columns and {MIN_SCENARIOS} to \
         {MAX_SCENARIOS} rows, ascending by bid price:"
    ));
    lines.push("| Bid Price | Win Probability Range | Expected P&L | P&L Range |".to_string());
    lines.push("|---|---|---|---|".to_string());
    lines.push("| 100.10 | 55%-65% | +0.05 | -0.02 to +0.12 |".to_string());
    lines.push("(That row only illustrates the format; do not copy its numbers.)".to_string());
    lines.push(format!("## {}", ReportSection::Commentary.heading()));
    lines.push("Why these levels, market dynamics, tactical considerations.".to_string());
    lines.push(format!("## {}", ReportSection::Risks.heading()));
    lines.push(
        "One risk per line, each starting with \"- \": adverse selection, overbidding, market \
         and liquidity risk, model limitations and data gaps."
            .to_string(),
    );
    lines.push(String::new());

    lines.push("RULES:".to_string());
    lines.push("- Do NOT recommend automating bids or bidding decisions.".to_string());
    lines.push(
        "- Do NOT claim certainty. Every win probability is a low-high range such as 20%-30%, \
         never a point estimate."
            .to_string(),
    );
    lines.push(
        "- Expected P&L and P&L range are in price points if the bid wins; write ranges low to high."
            .to_string(),
    );
    lines.push(
        "- Use only the data above. Name data gaps instead of guessing values.".to_string(),
    );
    lines.push("- Be concise, factual and desk-relevant; use trader language.".to_string());
}

fn field<T: Display>(key: &'static str, value: Option<&T>) -> Option<String> {
    value.map(|v| format!("{key}={v}"))
}

fn record_line(fields: &[Option<String>], extra: &BTreeMap<String, serde_json::Value>) -> String {
    let mut parts: Vec<String> = fields.iter().flatten().cloned().collect();
    parts.extend(extra.iter().map(|(k, v)| format!("{k}={v}")));
    if parts.is_empty() {
        "(no fields)".to_string()
    } else {
        parts.join(" ")
    }
}

fn or_not_provided(value: Option<Decimal>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_PROVIDED.to_string())
}

fn format_minutes(minutes: i64) -> String {
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("{days}d {hours}h {mins:02}m")
    } else {
        format!("{hours}h {mins:02}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use crate::test_support::sample_input;
    use bwic_models::bwic_input::HistoricalBwic;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn context() -> AnalysisContext {
        let input = sample_input();
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        ContextBuilder::default()
            .build_at(
                input.bwic,
                input.market,
                input.valuation,
                input.constraints,
                now,
            )
            .unwrap()
    }

    #[test]
    fn compile_is_deterministic() {
        let ctx = context();
        let first = compile(&ctx);
        let second = compile(&ctx.clone());
        assert_eq!(first, second);
        assert_eq!(first.user_prompt.as_bytes(), second.user_prompt.as_bytes());
    }

    #[test]
    fn embeds_curve_and_fair_value_verbatim() {
        let prompt = compile(&context()).user_prompt;
        for point in ["2Y: 4.50", "5Y: 4.25", "10Y: 4.00", "30Y: 4.15"] {
            assert!(prompt.contains(point), "missing curve point {point}");
        }
        assert!(prompt.contains("Fair value: 100.35"));
        assert!(prompt.contains("Curve slope (30Y minus 2Y): -35bp"));
    }

    #[test]
    fn curve_in_maturity_order() {
        let prompt = compile(&context()).user_prompt;
        let two = prompt.find("2Y: 4.50").unwrap();
        let five = prompt.find("5Y: 4.25").unwrap();
        let ten = prompt.find("10Y: 4.00").unwrap();
        let thirty = prompt.find("30Y: 4.15").unwrap();
        assert!(two < five && five < ten && ten < thirty);
    }

    #[test]
    fn embeds_trace_history_and_comparables() {
        let prompt = compile(&context()).user_prompt;
        assert!(prompt.contains("last_trade_price: 100.25"));
        assert!(prompt.contains("bid/ask width: 0.10"));
        assert!(prompt.contains("Comparable trades (2):"));
        assert!(prompt.contains("date=2024-01-15 size=20.0 price=100.30 type=BWIC"));
        assert!(prompt.contains("Historical BWICs (2):"));
        assert!(prompt.contains("winning_bid=100.28 fair_value_at_time=100.30 number_of_bids=8"));
        assert!(prompt.contains("Average winning bid minus fair value at the time: -0.025"));
        assert!(prompt.contains("Time remaining: 2h 00m"));
    }

    #[test]
    fn states_output_format_and_rules() {
        let prompt = compile(&context()).user_prompt;
        for section in ReportSection::ALL {
            if section == ReportSection::Urgency {
                continue;
            }
            assert!(
                prompt.contains(&format!("## {}", section.heading())),
                "missing heading for {section}"
            );
        }
        assert!(prompt.contains("| Bid Price | Win Probability Range | Expected P&L | P&L Range |"));
        assert!(prompt.contains("Do NOT recommend automating"));
        assert!(prompt.contains("Do NOT claim certainty"));
    }

    #[test]
    fn missing_optional_data_is_stated() {
        let mut input = sample_input();
        input.market.trace_data = None;
        input.market.liquidity_metrics = None;
        input.market.comparable_trades = None;
        input.valuation.old_bwics = None;
        input.valuation.model_price = None;
        input.bwic.seller = None;
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        let ctx = ContextBuilder::default()
            .build_at(input.bwic, input.market, input.valuation, input.constraints, now)
            .unwrap();
        let prompt = compile(&ctx).user_prompt;
        assert!(prompt.contains("- TRACE data: Not provided"));
        assert!(prompt.contains("- Historical BWICs: Not provided"));
        assert!(prompt.contains("- Model price: Not provided"));
        assert!(prompt.contains("- Seller: Not provided"));
    }

    #[test]
    fn history_extra_fields_are_carried() {
        let mut input = sample_input();
        input.valuation.old_bwics = Some(vec![HistoricalBwic {
            winning_bid: Some(dec!(99.90)),
            extra: BTreeMap::from([("cover".to_string(), serde_json::json!(99.85))]),
            ..Default::default()
        }]);
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        let ctx = ContextBuilder::default()
            .build_at(input.bwic, input.market, input.valuation, input.constraints, now)
            .unwrap();
        let prompt = compile(&ctx).user_prompt;
        assert!(prompt.contains("1. winning_bid=99.90 cover=99.85"));
    }

    #[test]
    fn minutes_formatting() {
        assert_eq!(format_minutes(120), "2h 00m");
        assert_eq!(format_minutes(45), "0h 45m");
        assert_eq!(format_minutes(60 * 24 * 2 + 61), "2d 1h 01m");
    }
}
