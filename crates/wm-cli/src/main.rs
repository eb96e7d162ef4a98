//! CLI entry point for the WebDAV media scanner.
//!
//! Scans WebDAV shares over HTTP or through a local mount, serves repeated
//! requests from the on-disk cache, and can rescan configured servers on a
//! schedule.
//!
//! # Usage
//!
//! ```bash
//! wm-scan [OPTIONS] <COMMAND>
//!
//! # Scan two paths over HTTP
//! wm-scan scan --server https://dav.example/remote.php/dav/files/alice --user alice /photos /videos
//!
//! # Same scan through a mounted share
//! wm-scan scan --server https://dav.example --user alice --mount /mnt/dav /photos
//!
//! # Show cached results for a server
//! wm-scan cache summary --server https://dav.example --user alice
//!
//! # Rescan every configured server until interrupted
//! wm-scan --config wm-scan.json schedule
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wm_core::{Config, ScanSettings, ScanTrigger};
use wm_scanner::{
    Credentials, DEFAULT_REQUEST_TIMEOUT, HttpDavConnector, RescanScheduler, RoutingConnector,
    ScanOrchestrator,
};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Scans WebDAV shares for image and video files.
#[derive(Parser)]
#[command(name = "wm-scan", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    #[arg(short, long, global = true, env = "WM_SCAN_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Directory for the scan cache and scan logs (overrides the config).
    #[arg(long, global = true, env = "WM_SCAN_DATA_DIR")]
    data_dir: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Server selection shared by every per-target command.
#[derive(Args)]
struct Target {
    /// Server base URL.
    #[arg(short, long)]
    server: String,

    /// Username on the server.
    #[arg(short, long)]
    user: String,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan one or more paths and print the combined counts.
    Scan {
        #[command(flatten)]
        target: Target,

        /// Password on the server. Falls back to the configured server entry.
        #[arg(long, env = "WM_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Local directory the share is mounted at (overrides the config).
        #[arg(short, long)]
        mount: Option<Utf8PathBuf>,

        /// Remote root paths to scan.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Ignore and replace cached results.
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        budgets: Budgets,
    },

    /// Show the cached result and running task for a path.
    Peek {
        #[command(flatten)]
        target: Target,

        /// Remote path.
        path: String,
    },

    /// Inspect or prune cached scans.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print recent scan log records for a path.
    Logs {
        #[command(flatten)]
        target: Target,

        /// Remote path.
        path: String,

        /// Maximum number of records.
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Rescan every configured server on the configured interval.
    Schedule,
}

/// Cache subcommands.
#[derive(Subcommand)]
enum CacheAction {
    /// Per-path counts of every cached scan for a server.
    Summary {
        #[command(flatten)]
        target: Target,
    },

    /// Delete the cached scan of a path.
    Delete {
        #[command(flatten)]
        target: Target,

        /// Remote path.
        path: String,
    },
}

/// Walk budget overrides. Unset fields keep the configured value.
#[derive(Args)]
struct Budgets {
    /// Directories listed concurrently per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Deepest directory level to descend into (root is 0).
    #[arg(long)]
    max_depth: Option<u32>,

    /// Stop after this many media files.
    #[arg(long)]
    max_files: Option<usize>,

    /// Wall-clock budget of the walk in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Budgets {
    fn apply(&self, mut settings: ScanSettings) -> ScanSettings {
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(max_depth) = self.max_depth {
            settings.max_depth = max_depth;
        }
        if let Some(max_files) = self.max_files {
            settings.max_files = max_files;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        settings
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file if one was given, then applies CLI
/// overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).wrap_err_with(|| format!("Failed to load {path}"))?,
        None => Config::default(),
    };

    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir.clone_from(data_dir);
    }

    Ok(config)
}

/// Creates the scan service. Servers with a configured mount (or the
/// ad-hoc one) are listed through it, every other server over HTTP.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the data directory
/// cannot be opened.
fn create_service(
    config: &Config,
    extra_mount: Option<(&str, Utf8PathBuf)>,
) -> color_eyre::Result<ScanOrchestrator<RoutingConnector>> {
    let http = HttpDavConnector::new(DEFAULT_REQUEST_TIMEOUT)
        .wrap_err("Failed to build HTTP client")?;
    let mut connector = RoutingConnector::from_servers(&config.servers, http);
    if let Some((server, root)) = extra_mount {
        connector.mounts_mut().add_mount(server, root);
    }

    ScanOrchestrator::from_config(connector, config)
        .wrap_err_with(|| format!("Failed to open data directory {}", config.storage.data_dir))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Scans `paths` one after another and prints the combined summary.
///
/// # Errors
///
/// Returns an error if no password is available or any path fails.
async fn run_scan(
    config: &Config,
    target: &Target,
    password: Option<String>,
    mount: Option<Utf8PathBuf>,
    paths: &[String],
    force: bool,
    budgets: &Budgets,
) -> color_eyre::Result<()> {
    let password = password
        .or_else(|| {
            config
                .server(&target.server, &target.user)
                .map(|server| server.password.clone())
        })
        .ok_or_else(|| eyre!("No password given and {} is not configured", target.server))?;

    let settings = budgets.apply(config.scan);
    settings.validate()?;

    let service = create_service(config, mount.map(|root| (target.server.as_str(), root)))?;
    let credentials = Credentials::new(target.server.as_str(), target.user.as_str(), password);
    let trigger = if force {
        ScanTrigger::Forced
    } else {
        ScanTrigger::Manual
    };

    info!(server = %target.server, paths = paths.len(), force, "Starting scan");
    let summary = service
        .run_scan_paths(&credentials, paths, settings, force, trigger)
        .await?;

    print_json(&summary)
}

/// Prints the cached entry and running task for a path.
fn run_peek(config: &Config, target: &Target, path: &str) -> color_eyre::Result<()> {
    let service = create_service(config, None)?;
    let credentials = Credentials::new(target.server.as_str(), target.user.as_str(), "");
    print_json(&service.peek(&credentials, path))
}

fn run_cache(config: &Config, action: &CacheAction) -> color_eyre::Result<()> {
    let service = create_service(config, None)?;

    match action {
        CacheAction::Summary { target } => {
            print_json(&service.cache_summary(&target.server, &target.user))
        }
        CacheAction::Delete { target, path } => {
            #[derive(Serialize)]
            struct Deleted<'a> {
                path: &'a str,
                deleted: bool,
            }

            let deleted = service.delete_cache_entry(&target.server, &target.user, path)?;
            print_json(&Deleted { path, deleted })
        }
    }
}

fn run_logs(config: &Config, target: &Target, path: &str, limit: usize) -> color_eyre::Result<()> {
    let service = create_service(config, None)?;
    let records = service.logs(&target.server, &target.user, path, limit)?;
    print_json(&records)
}

/// Runs the rescan scheduler and task sweeper until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if no servers are configured or signal handlers cannot
/// be installed.
async fn run_schedule(config: &Config) -> color_eyre::Result<()> {
    if config.servers.is_empty() {
        return Err(eyre!("No servers configured; pass --config"));
    }

    let service = create_service(config, None)?;
    let cancel = CancellationToken::new();

    let sweeper = service.registry().spawn_sweeper(cancel.child_token());
    let scheduler = RescanScheduler::new(service.clone(), config).spawn(cancel.child_token());

    info!(
        servers = config.servers.len(),
        interval_secs = config.schedule.interval_secs,
        "Scheduler running"
    );

    wait_for_shutdown().await?;
    info!("Shutting down");
    cancel.cancel();

    let (scheduler, sweeper) = tokio::join!(scheduler, sweeper);
    if let Err(e) = scheduler {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    if let Err(e) = sweeper {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    print_json(&service.stats())
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix.
async fn wait_for_shutdown() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Writes `value` as pretty JSON to stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Install color-eyre before anything can fail
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let config = build_config(&cli)?;

    match cli.command {
        Commands::Scan {
            target,
            password,
            mount,
            paths,
            force,
            budgets,
        } => run_scan(&config, &target, password, mount, &paths, force, &budgets).await,
        Commands::Peek { target, path } => run_peek(&config, &target, &path),
        Commands::Cache { action } => run_cache(&config, &action),
        Commands::Logs {
            target,
            path,
            limit,
        } => run_logs(&config, &target, &path, limit),
        Commands::Schedule => run_schedule(&config).await,
    }
}
