//! Expiring PDF Tool - Command-line interface
//!
//! Prepares documents that only open within a validity window, renders the
//! gate script on its own, and replays the gate against a simulated viewer.

use std::path::{Path, PathBuf};
use std::process;

use chrono::{Offset, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use pdfgate::config::{split_file_list, ProtectOptions, DEFAULT_MASK_LAYERS};
use pdfgate::gate::{parse_timestamp, GateOutcome, OptionalContentGroup, RunGuard, SimulatedHost};
use pdfgate::protect::initial_layer_states;
use pdfgate::{render_open_action_script, run_batch, DocumentProtector, Error, Result};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let log_level = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level);

    if let Err(e) = run(&matches).await {
        error!("❌ {}", e);
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("protect", sub)) => protect(sub).await,
        Some(("batch", sub)) => batch(sub).await,
        Some(("script", sub)) => script(sub),
        Some(("simulate", sub)) => simulate(sub),
        _ => Err(Error::ConfigError("no subcommand given".into())),
    }
}

async fn protect(matches: &ArgMatches) -> Result<()> {
    let mut options = load_options(matches)?;
    if let Some(input) = matches.get_one::<String>("input") {
        options.input = Some(PathBuf::from(input));
    }
    if let Some(output) = matches.get_one::<String>("output") {
        options.output = Some(PathBuf::from(output));
    }

    let input = options
        .input
        .clone()
        .ok_or_else(|| Error::InvalidConfiguration("no input file given".into()))?;
    let output = options.output.clone().unwrap_or_else(|| default_output(&input));

    if !input.exists() {
        return Err(Error::InvalidConfiguration(format!(
            "input file does not exist: {}",
            input.display()
        )));
    }

    display_config_summary(&options);
    let protector = DocumentProtector::new(options)?;
    let started = std::time::Instant::now();
    let report = protector.protect_file(&input, &output).await?;

    info!("✅ Protected {} pages in {:.2?}", report.pages, started.elapsed());
    if let Some(written) = report.output {
        if written != output {
            warn!("⚠️  {} exists, wrote {} instead", output.display(), written.display());
        }
        println!("{}", written.display());
    }
    Ok(())
}

async fn batch(matches: &ArgMatches) -> Result<()> {
    let mut options = load_options(matches)?;
    if let Some(lists) = matches.get_many::<String>("files") {
        options.files = lists.flat_map(|raw| split_file_list(raw)).collect();
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        options.output_dir = Some(PathBuf::from(dir));
    }
    let jobs = matches.get_one::<usize>("jobs").copied();

    display_config_summary(&options);
    let report = run_batch(options, jobs).await?;

    info!(
        "📊 {}/{} files protected in {:.2?}",
        report.succeeded, report.total, report.elapsed
    );
    for output in report.outputs.iter().filter_map(|r| r.output.as_ref()) {
        println!("{}", output.display());
    }
    match report.first_error {
        Some((path, e)) => Err(Error::ConfigError(format!(
            "{} of {} files failed; first failure {}: {}",
            report.total - report.succeeded,
            report.total,
            path.display(),
            e
        ))),
        None => Ok(()),
    }
}

fn script(matches: &ArgMatches) -> Result<()> {
    let options = load_options(matches)?;
    options.validate()?;
    println!("{}", render_open_action_script(&options.gate()?));
    Ok(())
}

fn simulate(matches: &ArgMatches) -> Result<()> {
    let options = load_options(matches)?;
    let gate = options.gate()?;

    let now_literal = matches
        .get_one::<String>("now")
        .ok_or_else(|| Error::InvalidConfiguration("--now is required".into()))?;
    let now = parse_timestamp(now_literal, &Utc.fix())?;

    let layers = match matches.get_many::<String>("layer") {
        Some(values) => values.map(|value| parse_layer(value)).collect::<Result<Vec<_>>>()?,
        None => initial_layer_states(&options, 1),
    };

    let mut host = SimulatedHost::new(now);
    if !matches.get_flag("no-ocgs") {
        host = if matches.get_flag("global-only") {
            host.with_global_layers(layers)
        } else {
            host.with_layers(layers)
        };
    }
    if matches.get_flag("no-close") {
        host = host.without_document_close().without_global_close();
    }
    if matches.get_flag("no-alert") {
        host = host.without_alert();
    }

    let outcome = gate.run(&mut RunGuard::new(), &mut host);
    println!("outcome: {}", describe(&outcome));
    for alert in host.alerts() {
        println!("alert: {}", alert);
    }
    for (scope, discard) in host.close_calls() {
        println!("close: {:?} (discard changes: {})", scope, discard);
    }
    for layer in host.layers() {
        println!("layer: {} = {}", layer.name, if layer.visible { "on" } else { "off" });
    }
    Ok(())
}

fn describe(outcome: &GateOutcome) -> String {
    match outcome {
        GateOutcome::AlreadyRan => "already ran".to_string(),
        GateOutcome::Authorized { hidden } => format!("authorized ({} layers hidden)", hidden),
        GateOutcome::Denied(denial) => format!(
            "denied ({} layers hidden, message shown: {}, close: {:?})",
            denial.hidden, denial.alerted, denial.close
        ),
        GateOutcome::Failed { diagnostic, denial } => match denial {
            Some(_) => format!("failed closed: {}", diagnostic),
            None => format!("failed: {}", diagnostic),
        },
    }
}

/// `name=on|off`, or a bare name meaning "on".
fn parse_layer(value: &str) -> Result<OptionalContentGroup> {
    let (name, state) = match value.split_once('=') {
        Some((name, state)) => (name.trim(), state.trim()),
        None => (value.trim(), "on"),
    };
    let visible = match state.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => {
            return Err(Error::InvalidConfiguration(format!(
                "layer state must be on or off, got {:?}",
                other
            )))
        }
    };
    if name.is_empty() {
        return Err(Error::InvalidConfiguration(format!("empty layer name in {:?}", value)));
    }
    Ok(OptionalContentGroup::new(name, visible))
}

/// Config file first, then the window flags on top.
fn load_options(matches: &ArgMatches) -> Result<ProtectOptions> {
    let mut options = match matches.get_one::<String>("config") {
        Some(path) => ProtectOptions::load(path)?,
        None => ProtectOptions::default(),
    };

    if let Some(start) = matches.get_one::<String>("start") {
        options.start_time = Some(start.clone());
    }
    if let Some(end) = matches.get_one::<String>("end") {
        options.end_time = Some(end.clone());
    }
    if let Some(text) = matches.get_one::<String>("expired-text") {
        options.expired_text = text.clone();
    }
    if let Some(text) = matches.get_one::<String>("unsupported-text") {
        options.unsupported_text = text.clone();
    }
    if let Some(text) = matches.get_one::<String>("checking-notice") {
        options.checking_notice = Some(text.clone());
    }
    if let Some(count) = matches.get_one::<usize>("mask-layers") {
        options.mask_layers = *count;
    }
    Ok(options)
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_protected.pdf", stem))
}

fn window_args(command: Command) -> Command {
    command
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Configuration file (JSON/YAML)"))

        .arg(Arg::new("start")
            .short('s')
            .long("start")
            .value_name("TIME")
            .help("Start of the validity window (RFC 3339, local date-time, or date)"))

        .arg(Arg::new("end")
            .short('e')
            .long("end")
            .value_name("TIME")
            .help("End of the validity window"))

        .arg(Arg::new("expired-text")
            .long("expired-text")
            .value_name("TEXT")
            .help("Message shown when the document is opened outside the window"))

        .arg(Arg::new("unsupported-text")
            .long("unsupported-text")
            .value_name("TEXT")
            .help("Notice drawn for viewers that cannot run the gate"))

        .arg(Arg::new("checking-notice")
            .long("checking-notice")
            .value_name("TEXT")
            .help("Message shown before the window is checked"))

        .arg(Arg::new("mask-layers")
            .long("mask-layers")
            .value_name("N")
            .value_parser(clap::value_parser!(usize))
            .help(format!("White cover layers per page (default {})", DEFAULT_MASK_LAYERS)))
}

fn build_cli() -> Command {
    Command::new("pdfgate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prepare PDF documents that only open within a validity window")
        .subcommand_required(true)
        .arg_required_else_help(true)

        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .value_name("LEVEL")
            .value_parser(["error", "warn", "info", "debug", "trace"])
            .default_value("info")
            .global(true)
            .help("Set logging verbosity"))

        .subcommand(window_args(Command::new("protect")
            .about("Protect a single document")
            .arg(Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Input PDF file path"))
            .arg(Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output PDF file path"))))

        .subcommand(window_args(Command::new("batch")
            .about("Protect several documents into one directory")
            .arg(Arg::new("files")
                .short('f')
                .long("files")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Input files, separated by ';' or ','; may be repeated"))
            .arg(Arg::new("output-dir")
                .short('d')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory receiving the protected files"))
            .arg(Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Files processed concurrently (default: CPU count)"))))

        .subcommand(window_args(Command::new("script")
            .about("Print the open-action script for a window")))

        .subcommand(window_args(Command::new("simulate")
            .about("Run the gate against a simulated viewer")
            .arg(Arg::new("now")
                .short('n')
                .long("now")
                .value_name("TIME")
                .required(true)
                .help("Viewer clock; its offset is the viewer's local offset"))
            .arg(Arg::new("layer")
                .short('l')
                .long("layer")
                .value_name("NAME=on|off")
                .action(ArgAction::Append)
                .help("Layer present in the viewer; defaults to the page-1 layers"))
            .arg(Arg::new("no-ocgs")
                .long("no-ocgs")
                .action(ArgAction::SetTrue)
                .help("Viewer exposes no layer accessor"))
            .arg(Arg::new("global-only")
                .long("global-only")
                .action(ArgAction::SetTrue)
                .conflicts_with("no-ocgs")
                .help("Layer accessor only exists in global scope"))
            .arg(Arg::new("no-close")
                .long("no-close")
                .action(ArgAction::SetTrue)
                .help("Viewer cannot close documents"))
            .arg(Arg::new("no-alert")
                .long("no-alert")
                .action(ArgAction::SetTrue)
                .help("Viewer cannot show alerts"))))
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("pdfgate={}", level)))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn display_config_summary(options: &ProtectOptions) {
    info!("📋 Configuration Summary:");
    if let Some(input) = &options.input {
        info!("   Input:  {}", input.display());
    }
    if !options.files.is_empty() {
        info!("   Files:  {}", options.files.len());
    }
    info!(
        "   Window: {} .. {}",
        options.start_time.as_deref().unwrap_or("(open)"),
        options.end_time.as_deref().unwrap_or("(open)")
    );
    info!("   Mask layers per page: {}", options.mask_layers);
    if options.expired_text.is_empty() {
        info!("   Expiry message: (none)");
    }
}
