use anyhow::{Context, Result};
use cap::config::Config;
use cap::jobs::{JobStatus, Orchestrator, OrchestratorSettings, SubmitError, SubmitRequest};
use cap::limits::DescriptorStore;
use cap::query_log::{JsonlQueryLog, QueryLogSink};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use uuid::Uuid;

/// How often `query` polls job status
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Cloud account limits aggregator
#[derive(Parser, Debug)]
#[command(name = "cap", version, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Product/descriptor file (JSON or YAML) replacing the built-in set
    #[arg(long, global = true)]
    descriptors: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect limits and usage for a tenant
    Query {
        /// Tenant (DDI) to query
        #[arg(short, long)]
        ddi: String,

        /// Auth token (falls back to CAP_TOKEN)
        #[arg(short, long)]
        token: Option<String>,

        /// Region to query
        #[arg(short, long)]
        region: Option<String>,

        /// Products to query (db names); defaults to every active product
        #[arg(short, long, value_delimiter = ',')]
        products: Vec<String>,

        /// Recorded as the submitter in the query log
        #[arg(long)]
        user: Option<String>,
    },
    /// List configured products and their limit descriptors
    Products {
        /// Write the definitions to a JSON file instead of printing them
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show recorded query logs
    Logs {
        /// Only show this log
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Persist default settings
    Config {
        /// Default region for queries
        #[arg(long)]
        region: Option<String>,
    },
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
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
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

    tracing::info!("cap started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cap").join("cap.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cap").join("cap.log");
    }
    PathBuf::from("cap.log")
}

fn load_store(args: &Args, config: &Config) -> Result<DescriptorStore> {
    match args.descriptors.as_ref().or(config.descriptor_file.as_ref()) {
        Some(path) => DescriptorStore::load_file(path),
        None => Ok(DescriptorStore::embedded().clone()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::load();

    match &args.command {
        Command::Query {
            ddi,
            token,
            region,
            products,
            user,
        } => {
            let token = match token.clone().or_else(|| std::env::var("CAP_TOKEN").ok()) {
                Some(token) => token,
                None => anyhow::bail!("No token given. Use --token or set CAP_TOKEN"),
            };
            let store = Arc::new(load_store(&args, &config)?);
            let products = if products.is_empty() {
                store
                    .products()
                    .iter()
                    .filter(|p| p.active)
                    .map(|p| p.db_name.clone())
                    .collect()
            } else {
                products.clone()
            };

            let sink: Arc<dyn QueryLogSink> =
                Arc::new(JsonlQueryLog::new(&config.effective_query_log_path()));
            let orchestrator = Orchestrator::new(OrchestratorSettings::from(&config), store, sink)?;

            let request = SubmitRequest {
                ddi: ddi.clone(),
                token,
                region: config.effective_region(region.as_deref()),
                products,
                submitted_by: user.clone(),
            };

            let submission = match orchestrator.submit(request).await {
                Ok(submission) => submission,
                Err(SubmitError::Other(e)) => return Err(e),
                Err(e) => {
                    print_json(&json!({ "message": e.to_string() }))?;
                    return Ok(ExitCode::FAILURE);
                }
            };

            let job_ids: Vec<Uuid> = submission.tasks.values().copied().collect();
            let statuses = orchestrator.wait_all(&job_ids, POLL_INTERVAL).await?;

            let mut failed = false;
            let jobs: serde_json::Map<String, serde_json::Value> = submission
                .tasks
                .iter()
                .map(|(product, job_id)| {
                    let status = statuses.get(job_id).cloned().unwrap_or(JobStatus::Pending);
                    failed |= matches!(status, JobStatus::Failure { .. });
                    Ok((product.clone(), serde_json::to_value(status)?))
                })
                .collect::<Result<_>>()?;

            print_json(&json!({ "log_id": submission.log_id, "jobs": jobs }))?;
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Command::Products { export } => {
            let store = load_store(&args, &config)?;
            match export {
                Some(path) => {
                    store.save_file(path)?;
                    eprintln!("Wrote {} product(s) to {}", store.products().len(), path.display());
                }
                None => print_json(&store.to_config())?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Logs { id } => {
            let sink = JsonlQueryLog::new(&config.effective_query_log_path());
            match id {
                Some(id) => match sink.get(*id).await? {
                    Some(log) => print_json(&log)?,
                    None => {
                        eprintln!("No query log {} in {}", id, sink.path().display());
                        return Ok(ExitCode::FAILURE);
                    }
                },
                None => print_json(&sink.list().await?)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { region } => {
            if let Some(region) = region {
                config.set_region(region).context("Failed to save config")?;
            }
            print_json(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
