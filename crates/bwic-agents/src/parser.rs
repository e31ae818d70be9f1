use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use bwic_models::analysis::{
    Analysis, BidScenario, ParseWarning, ReportSection, MAX_SCENARIOS, MIN_SCENARIOS,
    MISSING_SECTION_MARKER,
};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::formatter::percent;

/// Result of reading a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Every section recovered cleanly.
    Parsed(Analysis),
    /// Usable, but `Analysis::warnings` lists what was lost or repaired.
    Partial(Analysis),
    /// No usable scenario table could be recovered.
    Unparseable {
        reason: String,
        warnings: Vec<ParseWarning>,
    },
}

impl ParseOutcome {
    pub fn warnings(&self) -> &[ParseWarning] {
        match self {
            ParseOutcome::Parsed(a) | ParseOutcome::Partial(a) => &a.warnings,
            ParseOutcome::Unparseable { warnings, .. } => warnings,
        }
    }

    pub fn into_result(self) -> Result<Analysis, AgentError> {
        match self {
            ParseOutcome::Parsed(a) | ParseOutcome::Partial(a) => Ok(a),
            ParseOutcome::Unparseable { reason, warnings } => {
                if warnings.is_empty() {
                    Err(AgentError::Parse(reason))
                } else {
                    let details: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
                    Err(AgentError::Parse(format!("{reason}; {}", details.join("; "))))
                }
            }
        }
    }
}

/// Extract an [`Analysis`] from free-form model text.
///
/// Markdown-ish reports are split on their section headings. A response
/// that is a JSON object with a scenario array is read field by field
/// instead. Either way the scenario cells go through the same number
/// handling.
pub fn parse(raw: &str) -> ParseOutcome {
    let outcome = match sections_from_json(raw) {
        Some(sections) => assemble(sections, Vec::new()),
        None => {
            let (sections, warnings) = split_sections(raw);
            if sections.is_empty() {
                ParseOutcome::Unparseable {
                    reason: "no recognizable report sections in model response".to_string(),
                    warnings,
                }
            } else {
                assemble(sections, warnings)
            }
        }
    };

    for w in outcome.warnings() {
        warn!(section = %w.section, "{}", w.message);
    }
    outcome
}

type Sections = BTreeMap<ReportSection, Vec<String>>;

const HEADING_ALIASES: &[(&str, ReportSection)] = &[
    ("summary", ReportSection::Summary),
    ("executive summary", ReportSection::Summary),
    ("seller intent", ReportSection::SellerIntent),
    ("seller intent and urgency", ReportSection::SellerIntent),
    ("seller motivation", ReportSection::SellerIntent),
    ("urgency", ReportSection::Urgency),
    ("urgency assessment", ReportSection::Urgency),
    ("auction dynamics", ReportSection::AuctionDynamics),
    ("bid scenarios", ReportSection::Scenarios),
    ("bid scenarios table", ReportSection::Scenarios),
    ("bid scenario table", ReportSection::Scenarios),
    ("scenario table", ReportSection::Scenarios),
    ("scenarios", ReportSection::Scenarios),
    ("bid strategies", ReportSection::Scenarios),
    ("scenario analysis", ReportSection::Scenarios),
    ("commentary", ReportSection::Commentary),
    ("risks", ReportSection::Risks),
    ("risks and caveats", ReportSection::Risks),
    ("risk", ReportSection::Risks),
    ("caveats", ReportSection::Risks),
    ("risk factors", ReportSection::Risks),
    ("key risks", ReportSection::Risks),
];

fn split_sections(raw: &str) -> (Sections, Vec<ParseWarning>) {
    let mut sections = Sections::new();
    let mut warnings = Vec::new();
    let mut current: Option<ReportSection> = None;
    let mut discarded = 0usize;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || is_rule(trimmed) {
            continue;
        }

        if let Some((section, rest)) = detect_heading(trimmed) {
            if sections.contains_key(&section) && current != Some(section) {
                warnings.push(ParseWarning::new(
                    section,
                    format!(
                        "duplicate {} section merged into the first",
                        section.heading()
                    ),
                ));
            }
            // A one-line `Urgency: ...` inside another section does not end it.
            let inline_urgency =
                section == ReportSection::Urgency && !rest.is_empty() && current.is_some();
            let body = sections.entry(section).or_default();
            if !rest.is_empty() {
                body.push(rest);
            }
            if !inline_urgency {
                current = Some(section);
            }
            continue;
        }

        match current {
            Some(section) => sections.entry(section).or_default().push(line.to_string()),
            None if !trimmed.is_empty() => discarded += 1,
            None => {}
        }
    }

    if discarded > 0 {
        debug!(lines = discarded, "Discarded text before the first section heading");
    }
    (sections, warnings)
}

/// A heading is a line naming a known section, alone or followed by
/// `: content`. Inline form needs markdown decoration or an all-caps label,
/// except for `Urgency:`.
fn detect_heading(line: &str) -> Option<(ReportSection, String)> {
    if line.is_empty() || bullet_regex().is_match(line) {
        return None;
    }

    if let Some(section) = section_for(&clean_label(line)) {
        return Some((section, String::new()));
    }

    let (head, rest) = line.split_once(':')?;
    let section = section_for(&clean_label(head))?;
    let decorated = line.starts_with('#') || line.starts_with("**") || line.starts_with("__");
    let letters: Vec<char> = head.chars().filter(|c| c.is_alphabetic()).collect();
    let all_caps = !letters.is_empty() && letters.iter().all(|c| c.is_uppercase());
    if decorated || all_caps || section == ReportSection::Urgency {
        let rest = rest.trim().trim_start_matches(['*', '_']).trim();
        Some((section, rest.to_string()))
    } else {
        None
    }
}

fn section_for(label: &str) -> Option<ReportSection> {
    let key = normalize_label(label);
    HEADING_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, section)| *section)
}

/// Strip markdown decoration, numbering, a trailing colon and a trailing
/// parenthetical: `## 3. Bid Scenarios (Table):` -> `Bid Scenarios`.
fn clean_label(raw: &str) -> String {
    let decoration: &[char] = &['#', '*', '_', ' ', '\t'];
    let mut label = raw
        .trim()
        .trim_start_matches(decoration)
        .trim_end_matches(decoration)
        .trim_end_matches(':')
        .trim_end_matches(decoration)
        .to_string();

    if let Some(m) = numbering_regex().find(&label) {
        label = label[m.end()..].to_string();
    }
    if label.ends_with(')') {
        if let Some(open) = label.rfind('(') {
            label.truncate(open);
        }
    }
    label.trim().trim_end_matches(':').trim().to_string()
}

/// Lowercase words only: `Seller Intent & Urgency` -> `seller intent and urgency`.
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| matches!(c, '-' | '=' | '_' | '*' | ' '))
}

fn bullet_regex() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| Regex::new(r"^(?:[-*•+]|\d+[.)])\s+").expect("valid regex"))
}

fn numbering_regex() -> &'static Regex {
    static NUMBERING: OnceLock<Regex> = OnceLock::new();
    NUMBERING.get_or_init(|| Regex::new(r"^\d+[.)]\s*").expect("valid regex"))
}

fn field_regex() -> &'static Regex {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    FIELD.get_or_init(|| {
        Regex::new(
            r"(?P<lo>[-+]?\d+(?:\.\d+)?)(?P<lo_pct>\s*%)?(?:(?P<sep>\s*\bto\b\s*|\s+-\s+|-)(?P<hi>[-+]?\d+(?:\.\d+)?)(?P<hi_pct>\s*%)?)?",
        )
        .expect("valid regex")
    })
}

fn thousands_regex() -> &'static Regex {
    static THOUSANDS: OnceLock<Regex> = OnceLock::new();
    THOUSANDS.get_or_init(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+\b").expect("valid regex"))
}

fn cell_split_regex() -> &'static Regex {
    static CELLS: OnceLock<Regex> = OnceLock::new();
    CELLS.get_or_init(|| Regex::new(r"\t+|\s{2,}").expect("valid regex"))
}

fn assemble(mut sections: Sections, mut warnings: Vec<ParseWarning>) -> ParseOutcome {
    let Some(table) = sections.remove(&ReportSection::Scenarios) else {
        return ParseOutcome::Unparseable {
            reason: "no bid scenario table found".to_string(),
            warnings,
        };
    };
    let scenarios = match extract_scenarios(&table, &mut warnings) {
        Ok(rows) => rows,
        Err(reason) => return ParseOutcome::Unparseable { reason, warnings },
    };

    let summary = narrative(&mut sections, ReportSection::Summary, &mut warnings);
    let seller_intent = narrative(&mut sections, ReportSection::SellerIntent, &mut warnings);
    let auction_dynamics = narrative(&mut sections, ReportSection::AuctionDynamics, &mut warnings);
    let commentary = narrative(&mut sections, ReportSection::Commentary, &mut warnings);
    let urgency_assessment = sections
        .remove(&ReportSection::Urgency)
        .map(|lines| join_narrative(&lines))
        .filter(|text| !text.is_empty());
    let risks = extract_risks(sections.remove(&ReportSection::Risks), &mut warnings);

    let analysis = Analysis {
        summary,
        seller_intent,
        urgency_assessment,
        auction_dynamics,
        scenarios,
        commentary,
        risks,
        warnings,
    };
    if analysis.is_partial() {
        ParseOutcome::Partial(analysis)
    } else {
        ParseOutcome::Parsed(analysis)
    }
}

fn narrative(
    sections: &mut Sections,
    section: ReportSection,
    warnings: &mut Vec<ParseWarning>,
) -> String {
    let text = match sections.remove(&section) {
        Some(lines) => {
            let text = join_narrative(&lines);
            if text.is_empty() {
                warnings.push(ParseWarning::new(section, format!("{} section is empty", section.heading())));
            }
            text
        }
        None => {
            warnings.push(ParseWarning::new(section, format!("{} section not found", section.heading())));
            String::new()
        }
    };
    if text.is_empty() {
        MISSING_SECTION_MARKER.to_string()
    } else {
        text
    }
}

/// Trimmed lines, paragraph breaks kept as a single blank line.
fn join_narrative(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn extract_risks(lines: Option<Vec<String>>, warnings: &mut Vec<ParseWarning>) -> Vec<String> {
    let Some(lines) = lines else {
        warnings.push(ParseWarning::new(
            ReportSection::Risks,
            format!("{} section not found", ReportSection::Risks.heading()),
        ));
        return Vec::new();
    };

    let mut risks: Vec<String> = Vec::new();
    for line in &lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_bullet = bullet_regex().is_match(trimmed);
        let indented = line.starts_with(char::is_whitespace);
        match risks.last_mut() {
            Some(previous) if indented && !is_bullet => {
                previous.push(' ');
                previous.push_str(trimmed);
            }
            _ => {
                let text = bullet_regex().replace(trimmed, "").trim().to_string();
                if !text.is_empty() {
                    risks.push(text);
                }
            }
        }
    }

    if risks.is_empty() {
        warnings.push(ParseWarning::new(
            ReportSection::Risks,
            format!("{} section is empty", ReportSection::Risks.heading()),
        ));
    }
    risks
}

/// Undo typographic substitutions models like to make in numbers, and drop
/// markdown emphasis so a bolded row reads like any other.
fn normalize_numbers(text: &str) -> String {
    let text = text
        .replace(['\u{2212}', '\u{2013}', '\u{2014}'], "-")
        .replace(['*', '_', '`', '$'], "");
    thousands_regex()
        .replace_all(&text, |caps: &regex::Captures| caps[0].replace(',', ""))
        .replace(',', " ")
}

fn extract_scenarios(
    lines: &[String],
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<BidScenario>, String> {
    let lines: Vec<String> = lines.iter().map(|l| normalize_numbers(l)).collect();
    let rows = table_rows(&lines);

    let mut scenarios = Vec::new();
    for (index, cells) in rows.iter().enumerate() {
        match parse_row(cells, warnings) {
            Ok(scenario) => scenarios.push(scenario),
            Err(problem) => warnings.push(ParseWarning::new(
                ReportSection::Scenarios,
                format!("row {} skipped: {problem}", index + 1),
            )),
        }
    }

    if scenarios.len() > MAX_SCENARIOS {
        warnings.push(ParseWarning::new(
            ReportSection::Scenarios,
            format!(
                "{} scenarios supplied; kept the first {MAX_SCENARIOS}",
                scenarios.len()
            ),
        ));
        scenarios.truncate(MAX_SCENARIOS);
    }
    if scenarios.len() < MIN_SCENARIOS {
        return Err(format!(
            "only {} usable bid scenarios (need at least {MIN_SCENARIOS})",
            scenarios.len()
        ));
    }
    scenarios.sort_by(|a, b| a.bid_price.cmp(&b.bid_price));
    Ok(scenarios)
}

/// Positions of the four scenario columns, read from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    bid: usize,
    probability: usize,
    pnl: usize,
    range: usize,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let labels: Vec<String> = cells.iter().map(|c| c.to_lowercase()).collect();
        let find = |matches: fn(&str) -> bool| labels.iter().position(|l| matches(l));

        let columns = Columns {
            bid: find(|l| l.contains("bid") && !is_probability_label(l))?,
            probability: find(is_probability_label)?,
            pnl: find(|l| is_pnl_label(l) && !l.contains("range"))?,
            range: find(|l| l.contains("range") && !is_probability_label(l))?,
        };
        let mut positions = [columns.bid, columns.probability, columns.pnl, columns.range];
        positions.sort_unstable();
        positions.windows(2).all(|w| w[0] != w[1]).then_some(columns)
    }

    fn pick(&self, cells: &[String]) -> Option<Vec<String>> {
        [self.bid, self.probability, self.pnl, self.range]
            .iter()
            .map(|&i| cells.get(i).cloned())
            .collect()
    }
}

fn is_probability_label(label: &str) -> bool {
    label.contains("prob") || label.contains("win")
}

fn is_pnl_label(label: &str) -> bool {
    ["p&l", "pnl", "p/l", "profit"].iter().any(|k| label.contains(k))
}

/// Candidate data rows, each starting at the bid price. Header and separator
/// rows are dropped. When a header names the columns, cells are taken by
/// position under it; otherwise leading label cells are skipped.
fn table_rows(lines: &[String]) -> Vec<Vec<String>> {
    let pipe_mode = lines.iter().any(|l| l.matches('|').count() >= 3);
    let split_mode = !pipe_mode
        && lines
            .iter()
            .any(|l| cell_split_regex().split(l.trim()).count() >= 4);

    let mut columns: Option<Columns> = None;
    let mut rows = Vec::new();
    for line in lines {
        let line = line.trim();
        let cells: Vec<String> = if pipe_mode {
            if !line.contains('|') {
                continue;
            }
            line.trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect()
        } else if split_mode {
            cell_split_regex()
                .split(line)
                .map(|c| c.trim().to_string())
                .collect()
        } else {
            // Free text: one row per line with at least four numeric fields.
            let line = bullet_regex().replace(line, "");
            let fields: Vec<String> = field_regex()
                .find_iter(&line)
                .map(|m| m.as_str().to_string())
                .collect();
            if fields.len() >= 4 {
                rows.push(fields);
            }
            continue;
        };

        if !cells.iter().any(|c| starts_numeric(c)) {
            if columns.is_none() {
                columns = Columns::from_header(&cells);
            }
            if line.chars().any(|c| c.is_ascii_digit()) {
                rows.push(vec![line.to_string()]);
            }
            continue;
        }

        let picked = columns.and_then(|cols| cols.pick(&cells));
        rows.push(picked.unwrap_or_else(|| data_cells(cells)));
    }
    rows
}

/// Cells from the first numeric one on, past a leading `1.`/`#2` style
/// row counter when the row is wider than the table.
fn data_cells(cells: Vec<String>) -> Vec<String> {
    let mut data: Vec<String> = cells
        .into_iter()
        .skip_while(|c| !starts_numeric(c))
        .collect();
    if data.len() > 4 && is_row_counter(&data[0]) {
        data.remove(0);
    }
    data
}

fn is_row_counter(cell: &str) -> bool {
    let digits = cell.trim_start_matches('#').trim_end_matches(['.', ')']);
    !digits.is_empty()
        && digits.len() <= 2
        && digits.chars().all(|c| c.is_ascii_digit())
}

fn starts_numeric(cell: &str) -> bool {
    let rest = cell.trim_start_matches(['+', '-', '~', ' ']);
    rest.starts_with(|c: char| c.is_ascii_digit())
}

struct Field {
    lo: Decimal,
    hi: Option<Decimal>,
    percent: bool,
}

/// A number or range filling the cell. Any further figure in the cell makes
/// it ambiguous, so it is rejected rather than guessed at.
fn parse_field(cell: &str, what: &str) -> Result<Field, String> {
    let not_numeric = || format!("{what} `{cell}` is not a number or range");
    let caps = field_regex().captures(cell).ok_or_else(not_numeric)?;
    let whole = caps.get(0).ok_or_else(not_numeric)?;
    if cell[whole.end()..].chars().any(|c| c.is_ascii_digit()) {
        return Err(format!("{what} `{cell}` holds more than one figure"));
    }
    let lo = caps
        .name("lo")
        .and_then(|m| number(m.as_str()))
        .ok_or_else(not_numeric)?;
    let hi = match caps.name("hi") {
        Some(m) => Some(number(m.as_str()).ok_or_else(not_numeric)?),
        None => None,
    };
    Ok(Field {
        lo,
        hi,
        percent: caps.name("lo_pct").is_some() || caps.name("hi_pct").is_some(),
    })
}

fn number(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim_start_matches('+')).ok()
}

fn parse_row(cells: &[String], warnings: &mut Vec<ParseWarning>) -> Result<BidScenario, String> {
    if cells.len() < 4 {
        return Err(format!(
            "expected 4 columns, found {} in `{}`",
            cells.len(),
            cells.join(" | ")
        ));
    }
    let (bid_cell, prob_cell, pnl_cell, range_cell) = (&cells[0], &cells[1], &cells[2], &cells[3]);

    let bid = single_value(bid_cell, "bid price")?;
    if bid <= Decimal::ZERO {
        return Err(format!("bid price {bid} is not positive"));
    }
    let prob = parse_field(prob_cell, "win probability")?;
    let expected_pnl = single_value(pnl_cell, "expected P&L")?;
    let range = parse_field(range_cell, "P&L range")?;

    let as_percent =
        prob.percent || prob.lo > Decimal::ONE || prob.hi.is_some_and(|hi| hi > Decimal::ONE);
    let mut lo = unit_probability(prob.lo, as_percent, bid, warnings);
    let mut hi = match prob.hi {
        Some(raw) => unit_probability(raw, as_percent, bid, warnings),
        None => {
            note(
                warnings,
                bid,
                format!("single win probability `{prob_cell}` read as a zero-width range"),
            );
            lo
        }
    };
    if lo > hi {
        note(
            warnings,
            bid,
            format!(
                "win probability range {}%-{}% was inverted; swapped",
                percent(lo),
                percent(hi)
            ),
        );
        std::mem::swap(&mut lo, &mut hi);
    }

    let (mut pnl_low, mut pnl_high) = match range.hi {
        Some(hi) => (range.lo, hi),
        None => {
            note(
                warnings,
                bid,
                format!("single P&L `{range_cell}` read as a zero-width range"),
            );
            (range.lo, range.lo)
        }
    };
    if pnl_low > pnl_high {
        note(
            warnings,
            bid,
            format!("P&L range {pnl_low} to {pnl_high} was inverted; swapped"),
        );
        std::mem::swap(&mut pnl_low, &mut pnl_high);
    }

    Ok(BidScenario {
        bid_price: bid,
        win_probability_low: lo,
        win_probability_high: hi,
        expected_pnl,
        pnl_low,
        pnl_high,
    })
}

fn note(warnings: &mut Vec<ParseWarning>, bid: Decimal, message: String) {
    warnings.push(ParseWarning::new(
        ReportSection::Scenarios,
        format!("bid {bid}: {message}"),
    ));
}

/// Scale to [0, 1] and clamp, warning when the value had to move.
fn unit_probability(
    raw: Decimal,
    as_percent: bool,
    bid: Decimal,
    warnings: &mut Vec<ParseWarning>,
) -> Decimal {
    let value = if as_percent {
        raw / Decimal::ONE_HUNDRED
    } else {
        raw
    };
    let clamped = value.clamp(Decimal::ZERO, Decimal::ONE);
    if clamped != value {
        note(
            warnings,
            bid,
            format!(
                "win probability {}% clamped to {}%",
                percent(value),
                percent(clamped)
            ),
        );
    }
    clamped
}

fn single_value(cell: &str, what: &str) -> Result<Decimal, String> {
    let field = parse_field(cell, what)?;
    if field.hi.is_some() {
        return Err(format!("{what} `{cell}` must be a single value"));
    }
    Ok(field.lo)
}

/// Read a JSON answer into the same section layout the text path produces.
/// Returns `None` unless the response holds an object with a scenario array.
fn sections_from_json(raw: &str) -> Option<Sections> {
    let json_str = extract_json(raw).ok()?;
    let value: Value = serde_json::from_str(&json_str).ok()?;
    let rows = value
        .get("bid_scenarios")
        .or_else(|| value.get("scenarios"))?
        .as_array()?;

    let mut sections = Sections::new();
    let narrative_keys = [
        ("summary", ReportSection::Summary),
        ("seller_intent", ReportSection::SellerIntent),
        ("urgency_assessment", ReportSection::Urgency),
        ("auction_dynamics", ReportSection::AuctionDynamics),
        ("commentary", ReportSection::Commentary),
    ];
    for (key, section) in narrative_keys {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            sections.insert(section, text.lines().map(str::to_string).collect());
        }
    }

    let table = rows
        .iter()
        .map(|row| {
            let cells = [
                json_text(&row["bid_price"]),
                json_range(row, "win_probability_range", "win_probability_low", "win_probability_high"),
                json_text(&row["expected_pnl"]),
                json_range(row, "expected_pnl_range", "pnl_low", "pnl_high"),
            ];
            format!("| {} |", cells.join(" | "))
        })
        .collect();
    sections.insert(ReportSection::Scenarios, table);

    let risks = value.get("risks_caveats").or_else(|| value.get("risks"));
    match risks {
        Some(Value::String(text)) => {
            sections.insert(ReportSection::Risks, text.lines().map(str::to_string).collect());
        }
        Some(Value::Array(items)) => {
            let lines = items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| format!("- {}", s.trim()))
                .collect();
            sections.insert(ReportSection::Risks, lines);
        }
        _ => {}
    }

    debug!(rows = rows.len(), "Read model response as JSON");
    Some(sections)
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

fn json_range(row: &Value, combined: &str, low: &str, high: &str) -> String {
    match (&row[combined], &row[low], &row[high]) {
        (Value::Null, Value::Null, Value::Null) => "N/A".to_string(),
        (Value::Null, lo, Value::Null) => json_text(lo),
        (Value::Null, lo, hi) => format!("{} to {}", json_text(lo), json_text(hi)),
        (text, _, _) => json_text(text),
    }
}

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}
