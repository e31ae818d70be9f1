use std::collections::BTreeMap;
use std::fmt;

use bwic_models::bwic_input::{
    AnalysisInput, BwicDetails, ComparableTrade, HistoricalBwic, MarketContext, TraceData,
    TraderConstraints, ValuationData,
};
use bwic_models::config::{AnalysisConfig, DeadlinePolicy};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RiskAppetite {
    Low,
    Medium,
    High,
}

impl RiskAppetite {
    const ALL: [RiskAppetite; 3] = [RiskAppetite::Low, RiskAppetite::Medium, RiskAppetite::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskAppetite::Low => "Low",
            RiskAppetite::Medium => "Medium",
            RiskAppetite::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum InventoryLevel {
    Low,
    Medium,
    High,
    Full,
}

impl InventoryLevel {
    const ALL: [InventoryLevel; 4] = [
        InventoryLevel::Low,
        InventoryLevel::Medium,
        InventoryLevel::High,
        InventoryLevel::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryLevel::Low => "Low",
            InventoryLevel::Medium => "Medium",
            InventoryLevel::High => "High",
            InventoryLevel::Full => "Full",
        }
    }
}

/// How pressed the seller appears, from time left and size.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
            Urgency::Critical => "Critical",
        }
    }

    /// One step up, stopping at High. Only an elapsed deadline is Critical.
    fn escalate(self) -> Self {
        match self {
            Urgency::Low => Urgency::Medium,
            Urgency::Medium | Urgency::High => Urgency::High,
            Urgency::Critical => Urgency::Critical,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minutes left below which urgency is High.
const HIGH_URGENCY_MINUTES: i64 = 60;
/// Minutes left below which urgency is at least Medium.
const MEDIUM_URGENCY_MINUTES: i64 = 240;
/// Size relative to typical market size that escalates urgency by one step.
const SIZE_PRESSURE_RATIO: Decimal = Decimal::TWO;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurvePoint {
    pub tenor: String,
    /// Approximate maturity in days, used only for ordering.
    pub maturity_days: u32,
    pub yield_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeadlineTiming {
    pub deadline: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    /// Zero once elapsed.
    pub minutes_remaining: i64,
    pub elapsed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryStats {
    pub count: usize,
    /// Mean of `winning_bid - fair_value_at_time` over auctions reporting both.
    pub avg_winning_bid_vs_fair: Option<Decimal>,
    pub avg_bidders: Option<Decimal>,
}

/// Validated, normalized view of one analysis request.
///
/// Only [`ContextBuilder`] constructs it; it is read-only afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisContext {
    cusip: String,
    name: String,
    size_mm: Decimal,
    seller: Option<String>,
    bond_type: Option<String>,
    timing: DeadlineTiming,
    urgency: Urgency,
    size_ratio: Option<Decimal>,

    curve: Vec<CurvePoint>,
    curve_slope_bp: Option<Decimal>,
    trace: Option<TraceData>,
    bid_ask_width: Option<Decimal>,
    liquidity: BTreeMap<String, Decimal>,
    comparable_trades: Vec<ComparableTrade>,

    fair_value: Decimal,
    model_price: Option<Decimal>,
    market_price: Option<Decimal>,
    history: Vec<HistoricalBwic>,
    history_stats: Option<HistoryStats>,

    risk_appetite: RiskAppetite,
    inventory_level: InventoryLevel,
    max_position_size: Option<Decimal>,
    target_hold_days: Option<u32>,
}

impl AnalysisContext {
    pub fn cusip(&self) -> &str {
        &self.cusip
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn size_mm(&self) -> Decimal {
        self.size_mm
    }
    pub fn seller(&self) -> Option<&str> {
        self.seller.as_deref()
    }
    pub fn bond_type(&self) -> Option<&str> {
        self.bond_type.as_deref()
    }
    pub fn timing(&self) -> &DeadlineTiming {
        &self.timing
    }
    pub fn urgency(&self) -> Urgency {
        self.urgency
    }
    /// Auction size over typical market size (daily volume when known).
    pub fn size_ratio(&self) -> Option<Decimal> {
        self.size_ratio
    }
    /// Sorted by maturity, shortest first.
    pub fn curve(&self) -> &[CurvePoint] {
        &self.curve
    }
    /// Longest minus shortest tenor yield, in basis points.
    pub fn curve_slope_bp(&self) -> Option<Decimal> {
        self.curve_slope_bp
    }
    pub fn trace(&self) -> Option<&TraceData> {
        self.trace.as_ref()
    }
    pub fn bid_ask_width(&self) -> Option<Decimal> {
        self.bid_ask_width
    }
    pub fn liquidity(&self) -> &BTreeMap<String, Decimal> {
        &self.liquidity
    }
    pub fn comparable_trades(&self) -> &[ComparableTrade] {
        &self.comparable_trades
    }
    pub fn fair_value(&self) -> Decimal {
        self.fair_value
    }
    pub fn model_price(&self) -> Option<Decimal> {
        self.model_price
    }
    pub fn market_price(&self) -> Option<Decimal> {
        self.market_price
    }
    pub fn fair_vs_market(&self) -> Option<Decimal> {
        self.market_price.map(|m| self.fair_value - m)
    }
    pub fn fair_vs_model(&self) -> Option<Decimal> {
        self.model_price.map(|m| self.fair_value - m)
    }
    pub fn history(&self) -> &[HistoricalBwic] {
        &self.history
    }
    pub fn history_stats(&self) -> Option<&HistoryStats> {
        self.history_stats.as_ref()
    }
    pub fn risk_appetite(&self) -> RiskAppetite {
        self.risk_appetite
    }
    pub fn inventory_level(&self) -> InventoryLevel {
        self.inventory_level
    }
    pub fn max_position_size(&self) -> Option<Decimal> {
        self.max_position_size
    }
    pub fn target_hold_days(&self) -> Option<u32> {
        self.target_hold_days
    }
}

/// Merges the four input records into an [`AnalysisContext`].
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: AnalysisConfig,
}

impl ContextBuilder {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn deadline_policy(&self) -> DeadlinePolicy {
        self.config.deadline_policy
    }

    pub fn build(&self, input: AnalysisInput) -> Result<AnalysisContext, AgentError> {
        self.build_at(
            input.bwic,
            input.market,
            input.valuation,
            input.constraints,
            Utc::now(),
        )
    }

    /// Build against an explicit clock.
    pub fn build_at(
        &self,
        bwic: BwicDetails,
        market: MarketContext,
        valuation: ValuationData,
        constraints: TraderConstraints,
        now: DateTime<Utc>,
    ) -> Result<AnalysisContext, AgentError> {
        let cusip = bwic.cusip.trim().to_string();
        if cusip.is_empty() {
            return Err(AgentError::validation("cusip", "must not be empty"));
        }
        if bwic.size <= Decimal::ZERO {
            return Err(AgentError::validation(
                "size",
                format!("must be positive, got {}", bwic.size),
            ));
        }

        let deadline = parse_deadline(&bwic.deadline).ok_or_else(|| {
            AgentError::validation(
                "deadline",
                format!("`{}` is not an ISO-8601 timestamp", bwic.deadline),
            )
        })?;
        let timing = self.deadline_timing(deadline, now)?;

        let fair_value = valuation
            .fair_value
            .ok_or_else(|| AgentError::validation("fair_value", "is required"))?;

        let risk_appetite = parse_enumerated(
            "risk_appetite",
            &constraints.risk_appetite,
            &RiskAppetite::ALL,
            RiskAppetite::as_str,
        )?;
        let inventory_level = parse_enumerated(
            "inventory_level",
            &constraints.inventory_level,
            &InventoryLevel::ALL,
            InventoryLevel::as_str,
        )?;

        if let Some(max) = constraints.max_position_size {
            if max <= Decimal::ZERO {
                return Err(AgentError::validation(
                    "max_position_size",
                    format!("must be positive, got {max}"),
                ));
            }
        }
        let target_hold_days = match constraints.target_hold_period {
            None => None,
            Some(days) if days > 0 => Some(u32::try_from(days).map_err(|_| {
                AgentError::validation("target_hold_period", format!("{days} days is out of range"))
            })?),
            Some(days) => {
                return Err(AgentError::validation(
                    "target_hold_period",
                    format!("must be a positive number of days, got {days}"),
                ))
            }
        };

        let curve = match &market.curve_data {
            Some(points) if points.is_empty() => {
                return Err(AgentError::validation(
                    "curve_data",
                    "must hold at least one tenor when given",
                ))
            }
            Some(points) => normalize_curve(points)?,
            None => Vec::new(),
        };
        let curve_slope_bp = match (curve.first(), curve.last()) {
            (Some(short), Some(long)) if curve.len() >= 2 => {
                Some((long.yield_pct - short.yield_pct) * Decimal::ONE_HUNDRED)
            }
            _ => None,
        };

        let bid_ask_width = market
            .trace_data
            .as_ref()
            .and_then(|t| Some(t.ask? - t.bid?));
        let liquidity = market.liquidity_metrics.unwrap_or_default();

        let size_ratio = liquidity
            .get("daily_volume")
            .copied()
            .filter(|v| *v > Decimal::ZERO)
            .or(Some(self.config.typical_size_mm).filter(|v| *v > Decimal::ZERO))
            .map(|typical| (bwic.size / typical).round_dp(2));

        let urgency = classify_urgency(&timing, size_ratio);

        let history = valuation.old_bwics.unwrap_or_default();
        let history_stats = summarize_history(&history);

        debug!(
            cusip = %cusip,
            urgency = %urgency,
            minutes_remaining = timing.minutes_remaining,
            curve_points = curve.len(),
            "Analysis context built"
        );

        Ok(AnalysisContext {
            cusip,
            name: bwic.name.trim().to_string(),
            size_mm: bwic.size,
            seller: non_blank(bwic.seller),
            bond_type: non_blank(bwic.bond_type),
            timing,
            urgency,
            size_ratio,
            curve,
            curve_slope_bp,
            trace: market.trace_data,
            bid_ask_width,
            liquidity,
            comparable_trades: market.comparable_trades.unwrap_or_default(),
            fair_value,
            model_price: valuation.model_price,
            market_price: valuation.market_price,
            history,
            history_stats,
            risk_appetite,
            inventory_level,
            max_position_size: constraints.max_position_size,
            target_hold_days,
        })
    }

    fn deadline_timing(
        &self,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DeadlineTiming, AgentError> {
        let elapsed = deadline <= now;
        if elapsed {
            match self.config.deadline_policy {
                DeadlinePolicy::Reject => {
                    return Err(AgentError::validation(
                        "deadline",
                        format!(
                            "{} has already passed (as of {})",
                            deadline.to_rfc3339(),
                            now.to_rfc3339()
                        ),
                    ));
                }
                DeadlinePolicy::Warn => {
                    warn!(
                        deadline = %deadline.to_rfc3339(),
                        "BWIC deadline has passed; analyzing at maximal urgency"
                    );
                }
            }
        }

        Ok(DeadlineTiming {
            deadline,
            as_of: now,
            minutes_remaining: if elapsed {
                0
            } else {
                (deadline - now).num_minutes()
            },
            elapsed,
        })
    }
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp (read as UTC).
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_enumerated<T: Copy>(
    field: &str,
    raw: &str,
    allowed: &[T],
    label: fn(&T) -> &'static str,
) -> Result<T, AgentError> {
    let wanted = raw.trim();
    allowed
        .iter()
        .find(|v| label(*v).eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| {
            let names: Vec<&str> = allowed.iter().map(label).collect();
            AgentError::validation(
                field,
                format!("`{raw}` is not one of {}", names.join(", ")),
            )
        })
}

/// Tenor label to an approximate day count: "3M" -> 90, "10Y" -> 3650.
fn tenor_days(label: &str) -> Option<u32> {
    let label = label.trim().to_ascii_uppercase();
    let unit = label.chars().last()?;
    let count: u32 = label[..label.len() - unit.len_utf8()].trim().parse().ok()?;
    if count == 0 {
        return None;
    }
    let per_unit = match unit {
        'D' => 1,
        'W' => 7,
        'M' => 30,
        'Y' => 365,
        _ => return None,
    };
    count.checked_mul(per_unit)
}

fn normalize_curve(curve_data: &BTreeMap<String, Decimal>) -> Result<Vec<CurvePoint>, AgentError> {
    let mut points = Vec::with_capacity(curve_data.len());
    for (tenor, yield_pct) in curve_data {
        let maturity_days = tenor_days(tenor).ok_or_else(|| {
            AgentError::validation("curve_data", format!("unrecognized tenor `{tenor}`"))
        })?;
        if let Some(dup) = points
            .iter()
            .find(|p: &&CurvePoint| p.maturity_days == maturity_days)
        {
            return Err(AgentError::validation(
                "curve_data",
                format!("tenors `{}` and `{tenor}` name the same maturity", dup.tenor),
            ));
        }
        points.push(CurvePoint {
            tenor: tenor.trim().to_string(),
            maturity_days,
            yield_pct: *yield_pct,
        });
    }
    points.sort_by_key(|p| p.maturity_days);
    Ok(points)
}

fn classify_urgency(timing: &DeadlineTiming, size_ratio: Option<Decimal>) -> Urgency {
    if timing.elapsed {
        return Urgency::Critical;
    }
    let by_time = if timing.minutes_remaining < HIGH_URGENCY_MINUTES {
        Urgency::High
    } else if timing.minutes_remaining < MEDIUM_URGENCY_MINUTES {
        Urgency::Medium
    } else {
        Urgency::Low
    };
    match size_ratio {
        Some(ratio) if ratio >= SIZE_PRESSURE_RATIO => by_time.escalate(),
        _ => by_time,
    }
}

fn summarize_history(history: &[HistoricalBwic]) -> Option<HistoryStats> {
    if history.is_empty() {
        return None;
    }
    let diffs: Vec<Decimal> = history
        .iter()
        .filter_map(|h| Some(h.winning_bid? - h.fair_value_at_time?))
        .collect();
    let bidders: Vec<Decimal> = history
        .iter()
        .filter_map(|h| h.number_of_bids.map(Decimal::from))
        .collect();
    Some(HistoryStats {
        count: history.len(),
        avg_winning_bid_vs_fair: mean(&diffs),
        avg_bidders: mean(&bidders),
    })
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let total: Decimal = values.iter().copied().sum();
    Some((total / Decimal::from(values.len())).round_dp(4))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
