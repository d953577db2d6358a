use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdc_harvest::config::{
    find_config_file, load_config, write_default_config, Config, LOCAL_CONFIG_FILE,
};
use pdc_harvest::harvest::{
    fan_out, fan_out_settled, fetch_all, HarvestError, Harvester, OffsetTemplate,
};
use pdc_harvest::models::{DownloadOutcome, DownloadTask, Query, UntypedResponse};
use pdc_harvest::utils::PersistentCache;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Placeholder replaced by each unit in a fan-out template
const UNIT_PLACEHOLDER: &str = "{unit}";

/// PDC Harvest - Rate-limited, cached GraphQL harvesting for the Proteomic Data Commons
#[derive(Parser, Debug)]
#[command(name = "pdc-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rate-limited, cached GraphQL harvesting and bounded downloads", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bypass cached results (fresh results are still written back)
    #[arg(long, global = true, default_value_t = false)]
    refresh: bool,

    /// GraphQL endpoint to query
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Minimum seconds between dispatched queries
    #[arg(long, global = true)]
    interval: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single query and print its result as JSON
    #[command(alias = "q")]
    Query {
        /// GraphQL query text, or @path to read it from a file
        query: String,
    },

    /// Run one query per unit concurrently
    #[command(name = "fan-out", alias = "f")]
    FanOut {
        /// Query template; every {unit} is replaced by the unit (text or @path)
        template: String,

        /// Units of work, e.g. study ids
        #[arg(required = true)]
        units: Vec<String>,

        /// Report each unit's failure instead of aborting on the first one
        #[arg(long)]
        keep_going: bool,
    },

    /// Fetch every page of an offset-paginated query
    #[command(alias = "p")]
    Paginate {
        /// Query template with an {offset} placeholder (text or @path)
        query: String,

        /// Field under `data` holding each page's items
        #[arg(long, short)]
        field: String,
    },

    /// Download files under the configured concurrency ceiling
    #[command(alias = "d")]
    Download {
        /// URL of a single file to download
        #[arg(required_unless_present = "manifest")]
        url: Option<String>,

        /// Where to save the single file (default: download directory + URL file name)
        #[arg(long, short, requires = "url")]
        output: Option<PathBuf>,

        /// JSON manifest: a list of {"url": ..., "destination": ...} tasks
        #[arg(long, short, conflicts_with = "url")]
        manifest: Option<PathBuf>,

        /// Directory relative destinations are resolved against
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Maximum number of simultaneous transfers
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Manage the query cache
    Cache {
        /// Subcommand
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage configuration
    Config {
        /// Subcommand
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show cache location and statistics
    Status,

    /// Remove every cached query result
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Destination (default: ./pdc-harvest.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    let mut config = load_config(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;
    apply_overrides(&mut config, &cli);

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    let json_logs = cli.json_logs || config.logging.json;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("pdc_harvest={}", env_filter)),
        ))
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match run(cli, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            match e.downcast_ref::<HarvestError>() {
                Some(harvest) => eprintln!("{}: {}", harvest.kind(), harvest),
                None => eprintln!("Error: {:#}", e),
            }
            std::process::exit(1);
        }
    }
}

/// Command-line flags take precedence over file and environment settings
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.http.endpoint = endpoint.clone();
    }
    if let Some(interval) = cli.interval {
        config.rate_limits.interval_seconds = interval;
    }
    if let Some(timeout) = cli.timeout {
        config.http.timeout_seconds = timeout;
    }
    if let Commands::Download {
        max_concurrent: Some(max),
        ..
    } = &cli.command
    {
        config.downloads.max_concurrent = *max;
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Query { query } => {
            let harvester = Harvester::from_config(&config)?;
            let query: Query<UntypedResponse> =
                Query::new(read_query_text(&query)?).refresh(cli.refresh);

            let result = harvester.executor().execute(&query).await?;
            print_json(&result)?;
        }

        Commands::FanOut {
            template,
            units,
            keep_going,
        } => {
            let harvester = Harvester::from_config(&config)?;
            let executor = harvester.executor();
            let template = read_query_text(&template)?;
            let refresh = cli.refresh;

            let run_unit = |unit: &String| {
                let query: Query<UntypedResponse> =
                    Query::new(expand_unit(&template, unit)).refresh(refresh);
                async move { executor.execute(&query).await }
            };

            if keep_going {
                let results = fan_out_settled(&units, run_unit).await;
                let mut failed = 0;
                let output: Vec<Value> = units
                    .iter()
                    .zip(results)
                    .map(|(unit, result)| match result {
                        Ok(value) => json!({ "unit": unit, "result": value }),
                        Err(e) => {
                            failed += 1;
                            json!({ "unit": unit, "error": e.kind(), "message": e.to_string() })
                        }
                    })
                    .collect();
                print_json(&output)?;
                if failed > 0 {
                    bail!("{} of {} units failed", failed, units.len());
                }
            } else {
                let results = fan_out(&units, run_unit).await?;
                let output: Vec<Value> = units
                    .iter()
                    .zip(results)
                    .map(|(unit, value)| json!({ "unit": unit, "result": value }))
                    .collect();
                print_json(&output)?;
            }
        }

        Commands::Paginate { query, field } => {
            let harvester = Harvester::from_config(&config)?;
            let template =
                OffsetTemplate::new(read_query_text(&query)?, field).refresh(cli.refresh);

            let items = fetch_all(harvester.executor(), &template).await?;
            if !cli.quiet {
                eprintln!("Fetched {} items", items.len());
            }
            print_json(&items)?;
        }

        Commands::Download {
            url,
            output,
            manifest,
            dir,
            ..
        } => {
            let harvester = Harvester::from_config(&config)?;
            let base = dir.unwrap_or_else(|| config.downloads.directory.clone());

            let tasks = match (manifest, url) {
                (Some(manifest), _) => read_manifest(&manifest)?,
                (None, Some(url)) => {
                    let destination = match output {
                        Some(path) => path,
                        None => PathBuf::from(file_name_from_url(&url)?),
                    };
                    vec![DownloadTask::new(url, destination)]
                }
                (None, None) => bail!("Either a URL or --manifest is required"),
            };
            let tasks: Vec<DownloadTask> =
                tasks.into_iter().map(|t| t.rooted_at(&base)).collect();

            let results = harvester.downloader().download_all(tasks.clone()).await;

            let mut failed = 0;
            for (task, result) in tasks.iter().zip(&results) {
                match result {
                    Ok(DownloadOutcome::Downloaded { bytes }) => {
                        if !cli.quiet {
                            println!("downloaded  {} ({} bytes)", task.destination.display(), bytes);
                        }
                    }
                    Ok(DownloadOutcome::Skipped) => {
                        if !cli.quiet {
                            println!("skipped     {}", task.destination.display());
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("failed      {}: {}", task.destination.display(), e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} downloads failed", failed, tasks.len());
            }
        }

        Commands::Cache { command } => {
            let cache = PersistentCache::from_config(&config.cache)?;

            match command {
                CacheCommands::Status => {
                    let stats = cache.stats()?;
                    println!("Directory: {}", stats.cache_dir.display());
                    println!("Entries: {}", stats.entries);
                    println!("Total size: {} KB", stats.size_bytes / 1024);
                }
                CacheCommands::Clear => {
                    if !cli.quiet {
                        eprintln!("Clearing cached query results...");
                    }
                    let removed = cache.clear_all()?;
                    if !cli.quiet {
                        eprintln!("Cache cleared ({} entries removed).", removed);
                    }
                }
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Init { path, force } => {
                let path = path.unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));
                write_default_config(&path, force)?;
                if !cli.quiet {
                    eprintln!("Wrote default configuration to {}", path.display());
                }
            }
            ConfigCommands::Show => {
                print!("{}", config.to_toml()?);
            }
        },
    }

    Ok(())
}

/// Query text from the argument itself, or from a file when it starts with `@`
fn read_query_text(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query from {}", path)),
        None => Ok(arg.to_string()),
    }
}

fn expand_unit(template: &str, unit: &str) -> String {
    template.replace(UNIT_PLACEHOLDER, unit)
}

fn read_manifest(path: &Path) -> Result<Vec<DownloadTask>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid download manifest {}", path.display()))
}

/// Last path segment of `url`, without any query string or fragment
fn file_name_from_url(url: &str) -> Result<String> {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => bail!("Cannot derive a file name from {}; pass --output", url),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
