//! Loading configuration and analysis inputs for the command line.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use bwic_models::bwic_input::AnalysisInput;
use bwic_models::config::BwicConfig;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// Read a TOML config file. `None` means all defaults.
pub fn load_config(path: Option<&Path>) -> Result<BwicConfig> {
    let Some(path) = path else {
        return Ok(BwicConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Parse one analysis request from JSON text.
pub fn parse_input(json: &str) -> Result<AnalysisInput> {
    serde_json::from_str(json).context("Failed to parse analysis input JSON")
}

/// Parse a batch: a JSON array of requests, or a single request.
pub fn parse_batch(json: &str) -> Result<Vec<AnalysisInput>> {
    let value: Value = serde_json::from_str(json).context("Failed to parse batch JSON")?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .with_context(|| format!("Batch entry {} is not a valid analysis input", i + 1))
            })
            .collect(),
        single => Ok(vec![serde_json::from_value(single)
            .context("Batch file is neither an array nor a single analysis input")?]),
    }
}

pub fn load_input(path: &Path) -> Result<AnalysisInput> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    parse_input(&text)
}

pub fn load_batch(path: &Path) -> Result<Vec<AnalysisInput>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch: {}", path.display()))?;
    parse_batch(&text)
}

/// A deadline argument: `+90m`, `+2h`, `+1d` relative to `now`, or an
/// ISO-8601 timestamp passed through unchanged.
pub fn parse_deadline_arg(raw: &str, now: DateTime<Utc>) -> Result<String> {
    let raw = raw.trim();
    let Some(offset) = raw.strip_prefix('+') else {
        if bwic_agents::context::parse_deadline(raw).is_none() {
            bail!("deadline `{raw}` is neither +N[m|h|d] nor an ISO-8601 timestamp");
        }
        return Ok(raw.to_string());
    };

    let unit = offset
        .chars()
        .last()
        .ok_or_else(|| anyhow!("empty relative deadline"))?;
    let count: i64 = offset[..offset.len() - unit.len_utf8()]
        .parse()
        .with_context(|| format!("relative deadline `{raw}` needs a whole number"))?;
    let delta = match unit.to_ascii_lowercase() {
        'm' => Duration::try_minutes(count),
        'h' => Duration::try_hours(count),
        'd' => Duration::try_days(count),
        other => bail!("relative deadline unit `{other}` is not one of m, h, d"),
    };
    let deadline = delta
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| anyhow!("relative deadline `{raw}` is out of range"))?;
    Ok(deadline.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Curve points as `2Y:4.5,5Y:4.2`.
pub fn parse_curve(raw: &str) -> Result<BTreeMap<String, Decimal>> {
    let mut curve = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tenor, value) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("curve point `{pair}` should look like 5Y:4.25"))?;
        let yield_pct = Decimal::from_str(value.trim())
            .with_context(|| format!("curve point `{pair}` has a non-numeric yield"))?;
        if curve.insert(tenor.trim().to_string(), yield_pct).is_some() {
            bail!("tenor `{}` given twice", tenor.trim());
        }
    }
    Ok(curve)
}
