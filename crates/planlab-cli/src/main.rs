use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use planlab_core::{record_to_json, Record, RunStore};
use planlab_report::{
    by_domain, default_attributes, AbsoluteFormat, AbsoluteReport, Attribute,
    DomainComparisonReport, OracleReport, ReportError, ScatterFormat, ScatterMode, ScatterReport,
};
use planlab_runner::{
    archive_experiment, default_archive_path, default_eval_dir, eval_store_path, FetchFilter,
    LoadedExperiment, RunOptions,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "planlab", version, about = "Planner experiment harness")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a template experiment definition.
    Init {
        #[arg(default_value = "experiment.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    Describe {
        experiment: PathBuf,
        #[arg(long)]
        json: bool,
    },
    SchemaValidate {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Run every algorithm on every problem of the suite.
    Run {
        experiment: PathBuf,
        #[arg(long)]
        exp_dir: Option<PathBuf>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Parse run logs into properties files.
    Parse {
        experiment: PathBuf,
        #[arg(long)]
        exp_dir: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },
    /// Parse a single log file and print the resulting record.
    Extract {
        log: PathBuf,
        #[arg(long = "parser", default_value = "planner")]
        parsers: Vec<String>,
        #[arg(long)]
        exit_code: Option<i64>,
    },
    /// Gather parsed runs into an eval directory.
    Fetch {
        #[arg(long = "source", required = true)]
        sources: Vec<PathBuf>,
        /// Defaults to `<first source>-eval`.
        #[arg(long)]
        eval_dir: Option<PathBuf>,
        /// remove-revision[:REVS], rename:ALGO=NEW, evaluations-per-time
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Supplies revisions for a bare remove-revision filter.
        #[arg(long)]
        experiment: Option<PathBuf>,
        #[arg(long)]
        merge: bool,
        #[arg(long)]
        json: bool,
    },
    Archive {
        exp_dir: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Args)]
struct ReportInput {
    /// Eval directory or its properties.json.
    #[arg(long)]
    eval: PathBuf,
    #[arg(long = "algorithm")]
    algorithms: Vec<String>,
    /// Write to this path instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScatterModeArg {
    Pair,
    Oracle,
    OracleFirstAsThird,
}

impl From<ScatterModeArg> for ScatterMode {
    fn from(value: ScatterModeArg) -> Self {
        match value {
            ScatterModeArg::Pair => ScatterMode::Pair,
            ScatterModeArg::Oracle => ScatterMode::Oracle,
            ScatterModeArg::OracleFirstAsThird => ScatterMode::OracleFirstAsThird,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScatterFormatArg {
    Dat,
    Tex,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AbsoluteFormatArg {
    Html,
    Tex,
}

#[derive(Subcommand)]
enum ReportCommand {
    Oracle {
        #[command(flatten)]
        input: ReportInput,
    },
    Compare {
        #[command(flatten)]
        input: ReportInput,
        #[arg(long, default_value = "coverage")]
        attribute: String,
    },
    Scatter {
        #[command(flatten)]
        input: ReportInput,
        #[arg(long)]
        attribute: String,
        #[arg(long, value_enum, default_value = "pair")]
        mode: ScatterModeArg,
        #[arg(long, value_enum, default_value = "dat")]
        format: ScatterFormatArg,
        /// Colour points by domain.
        #[arg(long)]
        by_domain: bool,
    },
    Absolute {
        #[command(flatten)]
        input: ReportInput,
        #[arg(long = "attribute")]
        attributes: Vec<String>,
        #[arg(long, value_enum, default_value = "html")]
        format: AbsoluteFormatArg,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                let (code, details) = classify_error(&err);
                emit_json(&json_error(code, err.to_string(), details));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Init { path, force } => {
            if !force && path.exists() {
                return Err(anyhow!(
                    "init file already exists (use --force): {}",
                    path.display()
                ));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, planlab_runner::EXPERIMENT_TEMPLATE)?;
            println!("wrote: {}", path.display());
            println!("next: planlab describe {}", path.display());
        }
        Commands::Describe { experiment, json } => {
            let summary = planlab_runner::describe_experiment(&experiment)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&summary)
                })));
            }
            print_summary(&summary);
        }
        Commands::SchemaValidate { schema, file, json } => {
            let compiled = planlab_runner::compile_schema(&schema)?;
            let value = planlab_runner::load_document(&file)?;
            let errors = planlab_runner::schema_errors(&compiled, &value);
            if !errors.is_empty() {
                if json {
                    emit_json(&json_error(
                        "schema_invalid",
                        format!("{} does not match {}", file.display(), schema),
                        json!({ "errors": errors }),
                    ));
                } else {
                    for e in &errors {
                        eprintln!("schema error: {}", e);
                    }
                }
                std::process::exit(1);
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "schema-validate",
                    "valid": true,
                    "schema": schema
                })));
            }
            println!("ok");
        }
        Commands::Run {
            experiment,
            exp_dir,
            force,
            json,
        } => {
            let exp = LoadedExperiment::load(&experiment)?;
            let exp_dir = exp_dir.unwrap_or_else(|| exp.default_exp_dir());
            let summary = planlab_runner::run_experiment(&exp, &exp_dir, &RunOptions { force })?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "exp_dir": summary.exp_dir.display().to_string(),
                    "total": summary.total,
                    "executed": summary.executed,
                    "skipped": summary.skipped,
                    "nonzero_exit": summary.nonzero_exit
                })));
            }
            println!("exp_dir: {}", summary.exp_dir.display());
            println!("runs: {}", summary.total);
            println!("executed: {}", summary.executed);
            println!("skipped: {}", summary.skipped);
            println!("nonzero_exit: {}", summary.nonzero_exit);
        }
        Commands::Parse {
            experiment,
            exp_dir,
            strict,
            json,
        } => {
            let exp = LoadedExperiment::load(&experiment)?;
            let exp_dir = exp_dir.unwrap_or_else(|| exp.default_exp_dir());
            let summary = planlab_runner::parse_runs(&exp_dir, &exp.definition.parsers, strict)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "parse",
                    "exp_dir": exp_dir.display().to_string(),
                    "result": planlab_runner::steps::summary_to_json(&summary)
                })));
            }
            println!("parsed: {}", summary.parsed);
            println!("failed: {}", summary.failures.len());
            for f in &summary.failures {
                println!("  {}: {}", f.run, f.message);
            }
        }
        Commands::Extract {
            log,
            parsers,
            exit_code,
        } => {
            let bytes = std::fs::read(&log)
                .with_context(|| format!("reading {}", log.display()))?;
            let record = extract_log(&String::from_utf8_lossy(&bytes), &parsers, exit_code)?;
            println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
        }
        Commands::Fetch {
            sources,
            eval_dir,
            filters,
            experiment,
            merge,
            json,
        } => {
            let revisions = match &experiment {
                Some(path) => LoadedExperiment::load(path)?.definition.revisions,
                None => Vec::new(),
            };
            let filters = filters
                .iter()
                .map(|f| {
                    f.parse::<FetchFilter>()
                        .map(|filter| filter.with_default_revisions(&revisions))
                })
                .collect::<Result<Vec<_>>>()?;
            let eval_dir = match (eval_dir, sources.first()) {
                (Some(dir), _) => dir,
                (None, Some(first)) => default_eval_dir(first),
                (None, None) => return Err(anyhow!("fetch needs at least one --source")),
            };
            let summary = planlab_runner::fetch(&sources, &eval_dir, &filters, merge)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "fetch",
                    "eval_dir": summary.eval_dir.display().to_string(),
                    "filters": filters.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
                    "fetched": summary.fetched,
                    "dropped": summary.dropped,
                    "total": summary.total
                })));
            }
            println!("eval_dir: {}", summary.eval_dir.display());
            println!("fetched: {}", summary.fetched);
            println!("dropped: {}", summary.dropped);
            println!("total: {}", summary.total);
        }
        Commands::Archive { exp_dir, out, json } => {
            let out = out.unwrap_or_else(|| default_archive_path(&exp_dir));
            let result = archive_experiment(&exp_dir, &out)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "archive",
                    "archive": result.archive.display().to_string(),
                    "files": result.files
                })));
            }
            println!("archive: {}", result.archive.display());
            println!("files: {}", result.files);
        }
        Commands::Report(report) => return run_report(report),
    }
    Ok(None)
}

/// Without an exit code there is nothing to classify, so `error` stays unset.
fn extract_log(text: &str, parsers: &[String], exit_code: Option<i64>) -> Result<Record> {
    let mut extractor = planlab_parser::combined(parsers)?;
    let mut seed = Record::new();
    match exit_code {
        Some(code) => {
            seed.insert("planner_exit_code".to_string(), code.into());
        }
        None => extractor = extractor.without_derived("classify_exit_code"),
    }
    Ok(extractor.extract(text, seed)?)
}

fn load_eval(path: &Path) -> Result<RunStore> {
    let file = if path.is_dir() {
        eval_store_path(path)
    } else {
        path.to_path_buf()
    };
    Ok(RunStore::load(&file)?)
}

/// Prints `text` or writes it to `out`.
fn deliver(text: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
            println!("wrote: {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run_report(command: ReportCommand) -> Result<Option<Value>> {
    match command {
        ReportCommand::Oracle { input } => {
            let store = load_eval(&input.eval)?;
            let report = OracleReport::new(input.algorithms);
            let table = report.compute(&store)?;
            if input.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "report oracle",
                    "table": serde_json::to_value(&table)?
                })));
            }
            deliver(&report.render(&table), input.out.as_deref())?;
        }
        ReportCommand::Compare { input, attribute } => {
            let store = load_eval(&input.eval)?;
            let mut report = DomainComparisonReport::new(input.algorithms);
            report.attribute = attribute;
            let table = report.compute(&store)?;
            if input.json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "report compare",
                    "table": serde_json::to_value(&table)?
                })));
            }
            deliver(&report.render(&table), input.out.as_deref())?;
        }
        ReportCommand::Scatter {
            input,
            attribute,
            mode,
            format,
            by_domain: color_by_domain,
        } => {
            let store = load_eval(&input.eval)?;
            let mut report = ScatterReport::new(input.algorithms, attribute, mode.into());
            if color_by_domain {
                report = report.with_categorizer(by_domain());
            }
            if input.json {
                let points = report.points(&store)?;
                return Ok(Some(json!({
                    "ok": true,
                    "command": "report scatter",
                    "points": serde_json::to_value(&points)?
                })));
            }
            let out = input
                .out
                .ok_or_else(|| anyhow!("report scatter needs --out"))?;
            let format = match format {
                ScatterFormatArg::Dat => ScatterFormat::Dat,
                ScatterFormatArg::Tex => ScatterFormat::Tex,
            };
            let written = report.write(&store, &out, format)?;
            println!("wrote: {}", written.display());
        }
        ReportCommand::Absolute {
            input,
            attributes,
            format,
        } => {
            let store = load_eval(&input.eval)?;
            let attributes: Vec<Attribute> = if attributes.is_empty() {
                default_attributes()
            } else {
                attributes.iter().map(|a| Attribute::named(a)).collect()
            };
            let report = AbsoluteReport::new(input.algorithms, attributes);
            if input.json {
                let tables = report.compute(&store)?;
                return Ok(Some(json!({
                    "ok": true,
                    "command": "report absolute",
                    "tables": serde_json::to_value(&tables)?
                })));
            }
            let format = match format {
                AbsoluteFormatArg::Html => AbsoluteFormat::Html,
                AbsoluteFormatArg::Tex => AbsoluteFormat::Tex,
            };
            match input.out {
                Some(out) => {
                    let written = report.write(&store, &out, format)?;
                    println!("wrote: {}", written.display());
                }
                None => {
                    let tables = report.compute(&store)?;
                    let text = match format {
                        AbsoluteFormat::Html => report.render_html(&tables),
                        AbsoluteFormat::Tex => report.render_tex(&tables),
                    };
                    println!("{}", text);
                }
            }
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn classify_error(err: &anyhow::Error) -> (&'static str, Value) {
    if let Some(report) = err.downcast_ref::<ReportError>() {
        return match report {
            ReportError::UnknownAlgorithms { missing, known } => (
                "unknown_algorithms",
                json!({ "missing": missing, "known": known }),
            ),
            ReportError::AlgorithmCount { expected, got, .. } => (
                "algorithm_count",
                json!({ "expected": expected, "got": got }),
            ),
            _ => ("report_failed", json!({})),
        };
    }
    if let Some(parse) = err.downcast_ref::<planlab_parser::ParseError>() {
        if let planlab_parser::ParseError::Coercion {
            field, raw, line, ..
        } = parse
        {
            return (
                "parse_failed",
                json!({ "field": field, "raw": raw, "line": line }),
            );
        }
        return ("parse_failed", json!({}));
    }
    ("command_failed", json!({}))
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Describe { json, .. }
        | Commands::SchemaValidate { json, .. }
        | Commands::Run { json, .. }
        | Commands::Parse { json, .. }
        | Commands::Fetch { json, .. }
        | Commands::Archive { json, .. } => *json,
        Commands::Report(report) => match report {
            ReportCommand::Oracle { input }
            | ReportCommand::Compare { input, .. }
            | ReportCommand::Scatter { input, .. }
            | ReportCommand::Absolute { input, .. } => input.json,
        },
        Commands::Init { .. } | Commands::Extract { .. } => false,
    }
}

fn summary_to_json(summary: &planlab_runner::ExperimentSummary) -> Value {
    json!({
        "experiment": summary.exp_id,
        "name": summary.name,
        "digest": summary.digest,
        "planner": summary.planner_command,
        "time_limit_seconds": summary.time_limit_seconds,
        "memory_limit_mb": summary.memory_limit_mb,
        "benchmarks_dir": summary.benchmarks_dir.display().to_string(),
        "suite": summary.suite,
        "tasks": summary.task_count,
        "algorithms": summary.algorithms,
        "total_runs": summary.total_runs,
        "parsers": summary.parsers
    })
}

fn print_summary(summary: &planlab_runner::ExperimentSummary) {
    println!("experiment: {}", summary.exp_id);
    if !summary.name.is_empty() {
        println!("name: {}", summary.name);
    }
    println!("digest: {}", summary.digest);
    println!("planner: {:?}", summary.planner_command);
    println!(
        "time_limit_seconds: {}",
        summary
            .time_limit_seconds
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "memory_limit_mb: {}",
        summary
            .memory_limit_mb
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!("benchmarks_dir: {}", summary.benchmarks_dir.display());
    println!("suite: {}", summary.suite.join(", "));
    println!("tasks: {}", summary.task_count);
    println!("algorithms: {}", summary.algorithms.join(", "));
    println!("total_runs: {}", summary.total_runs);
    println!("parsers: {}", summary.parsers.join(", "));
}
