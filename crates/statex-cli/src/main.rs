use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sha2::{Digest, Sha256};
use statex_core::{
    CheckRequest, CheckResult, Checker, ExplicitBuilder, ExplicitGraph, ExplorationChecker,
    LivenessChecker, PropertyType, Reason, ReasonKind, SafetyChecker, SearchConfig, SearchOrder,
    Stats, Status,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statex")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log progress to stderr (-v for info, -vv for debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Enumerate the reachable state space.
    Explore(ExploreArgs),
    /// Check a property of the state space.
    Check(CheckArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long, default_value_t = 1, value_parser = parse_workers)]
    workers: usize,

    #[arg(long, value_enum, default_value = "bfs")]
    order: OrderArg,

    #[arg(long)]
    partitioned: bool,

    #[arg(long)]
    max_states: Option<usize>,
}

#[derive(Args)]
struct ExploreArgs {
    #[command(flatten)]
    search: SearchArgs,

    file: PathBuf,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long, value_enum)]
    property: PropertyArg,

    #[command(flatten)]
    search: SearchArgs,

    #[arg(long)]
    context_switch_bound: Option<u32>,

    #[arg(long)]
    por: bool,

    file: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Bfs,
    Dfs,
}

#[derive(Clone, Copy, ValueEnum)]
enum PropertyArg {
    Deadlock,
    Goal,
    Liveness,
}

fn parse_workers(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("--workers must be at least 1".to_string()),
        Ok(workers) => Ok(workers),
        Err(err) => Err(err.to_string()),
    }
}

impl From<OrderArg> for SearchOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Bfs => SearchOrder::Bfs,
            OrderArg::Dfs => SearchOrder::Dfs,
        }
    }
}

impl From<PropertyArg> for PropertyType {
    fn from(property: PropertyArg) -> Self {
        match property {
            PropertyArg::Deadlock => PropertyType::Deadlock,
            PropertyArg::Goal => PropertyType::Goal,
            PropertyArg::Liveness => PropertyType::Liveness,
        }
    }
}

impl SearchArgs {
    fn config(&self) -> SearchConfig {
        SearchConfig {
            workers: self.workers,
            order: self.order.into(),
            partitioned: self.partitioned,
            max_states: self.max_states,
            ..SearchConfig::default()
        }
    }
}

#[derive(Serialize)]
struct ResultJson {
    schema_version: String,
    tool: ToolInfo,
    invocation: Invocation,
    inputs: Vec<InputInfo>,
    status: Status,
    exit_code: i32,
    started_at: String,
    finished_at: String,
    duration_ms: u64,
    checks: Vec<CheckResult>,
}

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    version: String,
    git_sha: String,
}

#[derive(Serialize)]
struct Invocation {
    command: String,
    args: Vec<String>,
    format: String,
    config: SearchConfig,
}

#[derive(Serialize)]
struct InputInfo {
    path: String,
    sha256: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tool error: {err:#}");
            2
        }
    };
    std::process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let started_at = Utc::now();
    let timer = Instant::now();

    let (status, exit_code, check, inputs, invocation) = execute(&cli);

    let finished_at = Utc::now();
    let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);

    let result = ResultJson {
        schema_version: "0.1".to_string(),
        tool: ToolInfo {
            name: "statex".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: std::env::var("STATEX_GIT_SHA").unwrap_or_else(|_| "UNKNOWN".to_string()),
        },
        invocation,
        inputs,
        status,
        exit_code,
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        duration_ms,
        checks: vec![check],
    };

    match cli.format {
        OutputFormat::Json => emit_json(&result, cli.output.as_deref()),
        OutputFormat::Text => emit_text(&result, cli.output.as_deref()),
    }?;

    Ok(exit_code)
}

fn execute(cli: &Cli) -> (Status, i32, CheckResult, Vec<InputInfo>, Invocation) {
    let (command, file, config, check) = match &cli.command {
        Command::Explore(args) => {
            let request = CheckRequest::new(args.search.config());
            let check = run_checker(&args.file, &request, "explore", &ExplorationChecker);
            ("explore", &args.file, request.config, check)
        }
        Command::Check(args) => {
            let mut config = args.search.config();
            config.property = args.property.into();
            config.context_switch_bound = args.context_switch_bound;
            config.por = args.por;
            let request = CheckRequest::new(config);
            let check = match args.property {
                PropertyArg::Liveness => run_checker(&args.file, &request, "check", &LivenessChecker),
                PropertyArg::Deadlock | PropertyArg::Goal => {
                    run_checker(&args.file, &request, "check", &SafetyChecker)
                }
            };
            ("check", &args.file, request.config, check)
        }
    };
    let inputs = build_inputs(std::slice::from_ref(file));

    let status = check.status.clone();
    let exit_code = match status {
        Status::Pass => 0,
        Status::Fail => 1,
        Status::Error => 2,
        Status::Inconclusive => 3,
        Status::OutOfMemory => 5,
    };

    let invocation = Invocation {
        command: command.to_string(),
        args: vec![file.to_string_lossy().to_string()],
        format: match cli.format {
            OutputFormat::Json => "json".to_string(),
            OutputFormat::Text => "text".to_string(),
        },
        config,
    };

    (status, exit_code, check, inputs, invocation)
}

fn run_checker<C>(file: &Path, request: &CheckRequest, name: &str, checker: &C) -> CheckResult
where
    C: Checker<ExplicitBuilder>,
{
    let builder = match load_graph(file) {
        Ok(builder) => builder,
        Err(message) => {
            return error_check(name, request, ReasonKind::InvalidInput, message);
        }
    };
    debug!(path = %file.display(), "graph loaded");
    let mut check = checker.check(request, &builder);
    check.name = name.to_string();
    check
}

fn load_graph(path: &Path) -> Result<ExplicitBuilder, String> {
    let source = fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let graph: ExplicitGraph =
        serde_json::from_str(&source).map_err(|err| format!("{}: {err}", path.display()))?;
    ExplicitBuilder::new(&graph).map_err(|err| format!("{}: {err}", path.display()))
}

fn build_inputs(paths: &[PathBuf]) -> Vec<InputInfo> {
    paths
        .iter()
        .map(|path| InputInfo {
            path: path.to_string_lossy().to_string(),
            sha256: compute_sha256(path).unwrap_or_else(|_| "UNKNOWN".to_string()),
        })
        .collect()
}

fn compute_sha256(path: &Path) -> Result<String, String> {
    let data = fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn error_check(name: &str, request: &CheckRequest, kind: ReasonKind, message: String) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        property: request.property,
        target: request.target.clone(),
        status: Status::Error,
        reason: Some(Reason {
            kind,
            message: Some(message),
        }),
        counterexample: None,
        stats: Some(Stats::default()),
    }
}

fn emit_json(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let payload = serde_json::to_string_pretty(result).context("serialize result json")?;
    if let Some(path) = output {
        write_atomic(path, payload.as_bytes())?;
        return Ok(());
    }

    println!("{payload}");
    Ok(())
}

fn emit_text(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let mut summary = format!(
        "status={} exit_code={}",
        status_label(&result.status),
        result.exit_code
    );
    for check in &result.checks {
        if let Some(stats) = &check.stats {
            if let (Some(states), Some(transitions)) = (stats.states, stats.transitions) {
                summary.push_str(&format!(" states={states} transitions={transitions}"));
            }
        }
        if let Some(reason) = &check.reason {
            if let Some(message) = &reason.message {
                summary.push_str(&format!("\nreason: {message}"));
            }
        }
        if let Some(counterexample) = &check.counterexample {
            summary.push_str(&format!(
                "\ncounterexample: {}",
                counterexample.states.join(" -> ")
            ));
            if let Some(start) = counterexample.cycle_start {
                summary.push_str(&format!(" (cycle from step {start})"));
            }
        }
    }
    if let Some(path) = output {
        write_atomic(path, summary.as_bytes())?;
        return Ok(());
    }
    println!("{summary}");
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("rename {}", path.display()))?;
    Ok(())
}

fn status_label(status: &Status) -> &'static str {
    match status {
        Status::Pass => "pass",
        Status::Fail => "fail",
        Status::Inconclusive => "inconclusive",
        Status::OutOfMemory => "out_of_memory",
        Status::Error => "error",
    }
}
