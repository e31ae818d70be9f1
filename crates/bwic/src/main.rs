use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bwic::agents::demo::{CannedGateway, DEMO_INPUT_JSON};
use bwic::agents::registry::model_ids;
use bwic::agents::{format_analysis, AgentError, AnalysisPipeline, ErrorKind};
use bwic::input::{load_batch, load_config, load_input, parse_curve, parse_deadline_arg, parse_input};
use bwic::models::bwic_input::{
    AnalysisInput, BwicDetails, MarketContext, TraderConstraints, ValuationData,
};
use bwic::models::config::{Credentials, DeadlinePolicy};
use chrono::Utc;
use clap::builder::PossibleValuesParser;
use clap::{ArgGroup, Parser};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bwic",
    about = "BWIC win-probability analysis (advisory only)",
    group(ArgGroup::new("source").required(true).args(["input", "batch", "bond", "interactive", "demo"]))
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analyze one auction from a JSON file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Analyze every auction in a JSON array file, concurrently
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Prompt for auction details on the terminal
    #[arg(long)]
    interactive: bool,

    /// Run on the sample auction with a canned answer; no model service needed
    #[arg(long)]
    demo: bool,

    /// Bond name (quick mode)
    #[arg(long)]
    bond: Option<String>,

    /// Bond CUSIP (quick mode)
    #[arg(long, requires = "bond")]
    cusip: Option<String>,

    /// Size in millions (quick mode)
    #[arg(long, requires = "bond")]
    size: Option<Decimal>,

    /// Deadline: +90m, +2h, +1d or an ISO-8601 timestamp (quick mode)
    #[arg(long, requires = "bond")]
    deadline: Option<String>,

    /// Fair value (quick mode); the analysis is rejected without one
    #[arg(long, requires = "bond")]
    fair_value: Option<Decimal>,

    /// Yield curve as 2Y:4.5,5Y:4.25 (quick mode)
    #[arg(long, requires = "bond")]
    curve: Option<String>,

    #[arg(long, requires = "bond")]
    seller: Option<String>,

    #[arg(long, requires = "bond")]
    bond_type: Option<String>,

    /// Low, Medium or High (quick mode)
    #[arg(long, default_value = "Medium")]
    risk_appetite: String,

    /// Low, Medium, High or Full (quick mode)
    #[arg(long, default_value = "Medium")]
    inventory_level: String,

    /// Model to use; overrides the config file
    #[arg(short, long, value_parser = PossibleValuesParser::new(model_ids()))]
    model: Option<String>,

    /// Analyze even if the deadline has passed
    #[arg(long)]
    allow_elapsed_deadline: bool,

    /// Emit the analysis as JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON log lines on stderr
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Analysis failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Respects RUST_LOG; defaults to `info`.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// 2 validation, 3 fatal, 4 parse, 5 transient, 1 anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AgentError>())
        .map(|agent_err| match agent_err.kind() {
            ErrorKind::Validation => 2,
            ErrorKind::Fatal => 3,
            ErrorKind::Parse => 4,
            ErrorKind::Transient => 5,
        })
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.allow_elapsed_deadline {
        config.analysis.deadline_policy = DeadlinePolicy::Warn;
    }

    let pipeline = if cli.demo {
        info!("Demo mode: using canned model answer");
        bwic::pipeline_with_gateway(Arc::new(CannedGateway::default()), &config)
    } else {
        let credentials = Credentials::from_lookup(|name| std::env::var(name).ok());
        bwic::build_pipeline(cli.model.as_deref(), &config, &credentials)?
    };

    if let Some(path) = &cli.batch {
        let inputs = load_batch(path)?;
        return run_batch(Arc::new(pipeline), inputs, &cli).await;
    }

    let input = if cli.demo {
        demo_input()?
    } else if let Some(path) = &cli.input {
        load_input(path)?
    } else if cli.interactive {
        prompt_input()?
    } else {
        quick_input(&cli)?
    };

    let analysis = pipeline.analyze(input).await?;
    let rendered = if cli.json {
        serde_json::to_string_pretty(&analysis)?
    } else {
        format_analysis(&analysis)
    };
    emit(&rendered, &cli)
}

async fn run_batch(
    pipeline: Arc<AnalysisPipeline>,
    inputs: Vec<AnalysisInput>,
    cli: &Cli,
) -> Result<()> {
    let cusips: Vec<String> = inputs.iter().map(|i| i.bwic.cusip.clone()).collect();
    info!(count = inputs.len(), "Starting batch");
    let results = pipeline.analyze_batch(inputs).await;

    let mut first_error: Option<AgentError> = None;
    let mut text = String::new();
    let mut entries = Vec::new();
    for (cusip, result) in cusips.into_iter().zip(results) {
        match result {
            Ok(analysis) => {
                text.push_str(&format!("CUSIP {cusip}\n{}\n", format_analysis(&analysis)));
                entries.push(json!({"cusip": cusip, "analysis": analysis}));
            }
            Err(err) => {
                text.push_str(&format!("CUSIP {cusip}\nFAILED: {err}\n\n"));
                entries.push(json!({"cusip": cusip, "error": err.to_string()}));
                first_error.get_or_insert(err);
            }
        }
    }

    let rendered = if cli.json {
        serde_json::to_string_pretty(&entries)?
    } else {
        text
    };
    emit(&rendered, cli)?;

    match first_error {
        Some(err) => Err(anyhow::Error::new(err).context("At least one batch entry failed")),
        None => Ok(()),
    }
}

fn emit(rendered: &str, cli: &Cli) -> Result<()> {
    match &cli.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!(path = %path.display(), "Analysis written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// The bundled sample auction, deadline two hours out.
fn demo_input() -> Result<AnalysisInput> {
    let mut input = parse_input(DEMO_INPUT_JSON)?;
    input.bwic.deadline = parse_deadline_arg("+2h", Utc::now())?;
    Ok(input)
}

fn quick_input(cli: &Cli) -> Result<AnalysisInput> {
    let bond = cli.bond.clone().ok_or_else(|| anyhow!("--bond is required"))?;
    let cusip = cli.cusip.clone().ok_or_else(|| anyhow!("--cusip is required with --bond"))?;
    let size = cli.size.ok_or_else(|| anyhow!("--size is required with --bond"))?;
    let deadline = cli
        .deadline
        .as_deref()
        .ok_or_else(|| anyhow!("--deadline is required with --bond"))?;

    Ok(AnalysisInput {
        bwic: BwicDetails {
            cusip,
            name: bond,
            size,
            deadline: parse_deadline_arg(deadline, Utc::now())?,
            seller: cli.seller.clone(),
            bond_type: cli.bond_type.clone(),
        },
        market: MarketContext {
            curve_data: cli.curve.as_deref().map(parse_curve).transpose()?,
            ..Default::default()
        },
        valuation: ValuationData {
            fair_value: cli.fair_value,
            ..Default::default()
        },
        constraints: TraderConstraints {
            risk_appetite: cli.risk_appetite.clone(),
            inventory_level: cli.inventory_level.clone(),
            max_position_size: None,
            target_hold_period: None,
        },
    })
}

fn prompt_input() -> Result<AnalysisInput> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut ask = |label: &str, default: Option<&str>| -> Result<String> {
        match default {
            Some(d) if !d.is_empty() => eprint!("{label} [{d}]: "),
            _ => eprint!("{label}: "),
        }
        std::io::stderr().flush()?;
        let answer = lines
            .next()
            .transpose()?
            .map(|l| l.trim().to_string())
            .unwrap_or_default();
        match (answer.is_empty(), default) {
            (true, Some(d)) => Ok(d.to_string()),
            (true, None) => bail!("{label} is required"),
            (false, _) => Ok(answer),
        }
    };

    let name = ask("Bond name", None)?;
    let cusip = ask("CUSIP", None)?;
    let size: Decimal = ask("Size ($MM)", None)?
        .parse()
        .context("Size must be a number")?;
    let deadline = parse_deadline_arg(&ask("Deadline (+2h or ISO-8601)", Some("+2h"))?, Utc::now())?;
    let fair_value: Decimal = ask("Fair value", None)?
        .parse()
        .context("Fair value must be a number")?;
    let curve = parse_curve(&ask("Yield curve, blank for none (2Y:4.5,5Y:4.25)", Some(""))?)?;
    let risk_appetite = ask("Risk appetite (Low/Medium/High)", Some("Medium"))?;
    let inventory_level = ask("Inventory level (Low/Medium/High/Full)", Some("Medium"))?;

    Ok(AnalysisInput {
        bwic: BwicDetails {
            cusip,
            name,
            size,
            deadline,
            seller: None,
            bond_type: None,
        },
        market: MarketContext {
            curve_data: Some(curve).filter(|c| !c.is_empty()),
            ..Default::default()
        },
        valuation: ValuationData {
            fair_value: Some(fair_value),
            ..Default::default()
        },
        constraints: TraderConstraints {
            risk_appetite,
            inventory_level,
            max_position_size: None,
            target_hold_period: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwic::agents::demo::DEMO_RESPONSE;
    use bwic::agents::test_support::FixtureGateway;
    use bwic::models::config::BwicConfig;
    use bwic::models::Analysis;

    #[test]
    fn exit_codes_follow_error_kind() {
        let validation = anyhow::Error::new(AgentError::validation("size", "must be positive"));
        assert_eq!(exit_code(&validation), 2);
        let wrapped = anyhow::Error::new(AgentError::Parse("no table".into())).context("analysis");
        assert_eq!(exit_code(&wrapped), 4);
        assert_eq!(exit_code(&anyhow::Error::new(AgentError::Cancelled)), 5);
        assert_eq!(exit_code(&anyhow!("bad file")), 1);
    }

    #[test]
    fn quick_mode_builds_input() {
        let cli = Cli::parse_from([
            "bwic", "--bond", "UST 10Y", "--cusip", "912828XZ8", "--size", "50", "--deadline",
            "+2h", "--fair-value", "99.75", "--curve", "2Y:4.5,10Y:4.0",
        ]);
        let input = quick_input(&cli).unwrap();
        assert_eq!(input.bwic.name, "UST 10Y");
        assert_eq!(input.market.curve_data.map(|c| c.len()), Some(2));
        assert_eq!(input.constraints.risk_appetite, "Medium");
    }

    #[test]
    fn quick_mode_needs_all_fields() {
        let cli = Cli::parse_from(["bwic", "--bond", "UST 10Y", "--cusip", "912828XZ8"]);
        assert!(quick_input(&cli).is_err());
    }

    #[tokio::test]
    async fn quick_mode_without_fair_value_is_rejected() {
        let cli = Cli::parse_from([
            "bwic", "--bond", "UST 10Y", "--cusip", "912828XZ8", "--size", "50", "--deadline",
            "+2h",
        ]);
        let gateway = FixtureGateway::always(DEMO_RESPONSE);
        let pipeline =
            bwic::pipeline_with_gateway(Arc::new(gateway.clone()), &BwicConfig::default());
        let err = pipeline.analyze(quick_input(&cli).unwrap()).await.unwrap_err();
        assert_eq!(exit_code(&anyhow::Error::new(err)), 2);
        assert_eq!(gateway.calls(), 0);
    }

    #[test]
    fn sources_are_exclusive_and_required() {
        assert!(Cli::try_parse_from(["bwic"]).is_err());
        assert!(Cli::try_parse_from(["bwic", "--demo", "--input", "x.json"]).is_err());
        assert!(Cli::try_parse_from(["bwic", "--demo", "--model", "gpt-99"]).is_err());
        assert!(Cli::try_parse_from(["bwic", "--demo", "--model", "gemini-2.5-flash"]).is_ok());
    }

    #[test]
    fn demo_input_has_future_deadline() {
        let input = demo_input().unwrap();
        let deadline = bwic::agents::context::parse_deadline(&input.bwic.deadline).unwrap();
        assert!(deadline > Utc::now());
    }

    #[tokio::test]
    async fn demo_pipeline_end_to_end() {
        let pipeline = bwic::pipeline_with_gateway(
            Arc::new(CannedGateway::default()),
            &BwicConfig::default(),
        );
        let analysis: Analysis = pipeline.analyze(demo_input().unwrap()).await.unwrap();
        assert!(format_analysis(&analysis).contains("100.35"));
    }
}
