use anyhow::Result;
use cflimits::aws::{format_api_error, CloudFrontApi, CloudFrontClient, FixtureConnection};
use cflimits::config::{parse_limit_override, Config};
use cflimits::report::{self, OutputFormat};
use cflimits::service::CloudFrontService;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Check AWS CloudFront usage against service quotas
#[derive(Parser, Debug)]
#[command(name = "cflimits", version = cflimits::VERSION, about, long_about = None)]
struct Args {
    /// Endpoint answering CloudFront list operations with JSON
    #[arg(long)]
    endpoint: Option<String>,

    /// Replay recorded responses from a JSON or YAML file instead of calling the API
    #[arg(long, value_name = "FILE")]
    fixtures: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default warning threshold percentage
    #[arg(short = 'W', long)]
    warning_threshold: Option<u32>,

    /// Default critical threshold percentage
    #[arg(short = 'C', long)]
    critical_threshold: Option<u32>,

    /// Override a limit value, e.g. -L "Distributions per AWS account=500"
    #[arg(short = 'L', long = "limit", value_name = "NAME=VALUE", value_parser = parse_limit_override)]
    limits: Vec<(String, u64)>,

    /// List all known limits and their effective values
    #[arg(short = 'l', long)]
    list_limits: bool,

    /// Show current usage for all limits
    #[arg(short = 'u', long)]
    show_usage: bool,

    /// Print the IAM policy needed to check usage
    #[arg(long)]
    iam_policy: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cflimits started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cflimits").join("cflimits.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cflimits").join("cflimits.log");
    }
    PathBuf::from("cflimits.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match &args.fixtures {
        Some(path) => match FixtureConnection::load(path) {
            Ok(conn) => run(conn, &args, &config).await,
            Err(e) => Err(e),
        },
        None => {
            let endpoint = config.effective_endpoint(args.endpoint.as_deref());
            match CloudFrontClient::new(&endpoint, config.token.as_deref()) {
                Ok(client) => {
                    tracing::info!("Using endpoint: {}", client.endpoint());
                    run(client, &args, &config).await
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {}", format_api_error(&err));
            ExitCode::from(3)
        }
    }
}

/// Run the requested action; exit code 2 for criticals, 1 for warnings only
async fn run<C: CloudFrontApi>(conn: C, args: &Args, config: &Config) -> Result<ExitCode> {
    let mut service = CloudFrontService::new(
        conn,
        config.effective_warning_threshold(args.warning_threshold),
        config.effective_critical_threshold(args.critical_threshold),
    );

    for (name, value) in &config.limit_overrides {
        service.set_limit_override(name, *value)?;
    }
    for (name, value) in &args.limits {
        service.set_limit_override(name, *value)?;
    }
    for (name, thresholds) in &config.threshold_overrides {
        service.set_threshold_override(name, thresholds.warning, thresholds.critical)?;
    }

    if args.iam_policy {
        emit(report::render_iam_policy(&service.required_iam_permissions())?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.list_limits {
        emit(report::render_limits(service.get_limits(), args.format)?);
        return Ok(ExitCode::SUCCESS);
    }

    service.find_usage().await?;
    let checked_at = chrono::Utc::now();

    if args.show_usage {
        emit(report::render_usage(service.get_limits(), checked_at, args.format)?);
        return Ok(ExitCode::SUCCESS);
    }

    let problems = service.check_thresholds();
    emit(report::render_problems(&problems, checked_at, args.format)?);

    let criticals = problems.values().any(|l| !l.get_criticals().is_empty());
    tracing::info!(
        "{} limits at or above threshold (critical: {})",
        problems.len(),
        criticals
    );

    Ok(if criticals {
        ExitCode::from(2)
    } else if problems.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn emit(output: String) {
    if output.ends_with('\n') {
        print!("{}", output);
    } else {
        println!("{}", output);
    }
}
