// SPDX-License-Identifier: MIT
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use kioskd::browser::control::DevToolsClient;
use kioskd::browser::navigate::Navigator;
use kioskd::browser::supervisor::{BrowserSupervisor, SupervisorTiming, DEBUG_PORT};
use kioskd::cli::{self, client::GatewayClient};
use kioskd::config::validate::generate_api_key;
use kioskd::config::ConfigStore;
use kioskd::gateway::{self, DEFAULT_API_PORT};
use kioskd::playlist::cursor::Cursor;
use kioskd::playlist::scheduler::SchedulerTiming;
use kioskd::playlist::PlaylistManager;
use kioskd::registry::FileProcessRegistry;
use kioskd::retry::RetryConfig;
use kioskd::AppContext;

#[derive(Parser)]
#[command(
    name = "kioskd",
    about = "Kiosk appliance control daemon: playlist cycling, remote navigation, browser supervision",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for config, backups, pid files, and diagnostics
    #[arg(long, env = "KIOSKD_DATA_DIR", default_value = "/var/lib/kioskd")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KIOSKD_LOG", default_value = "info")]
    log: String,

    /// Write logs to this file. Defaults to {data_dir}/logs/kioskd.log when
    /// serving; CLI subcommands log to stderr only.
    #[arg(long, env = "KIOSKD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default when no subcommand given): launch the
    /// browser, start the health loop and gateway, resume cycling.
    Serve,
    /// Appliance status: current URL, orientation, playlist, browser state.
    Status,
    /// Print the current single-display URL.
    GetUrl,
    /// Set the display URL and navigate the live browser to it.
    SetUrl { url: String },
    /// Print the current display orientation.
    GetOrientation,
    /// Set display orientation (normal|left|right|inverted).
    SetOrientation { orientation: String },
    /// Playlist operations.
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },
    /// Control the kiosk browser systemd unit.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Print the tail of the daemon log.
    Logs {
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },
    /// Generate and store a fresh API key. Works while the gateway is down;
    /// remote callers must be given the new key.
    RegenKey,
}

#[derive(Subcommand)]
enum PlaylistAction {
    /// List entries with the active index.
    Show,
    /// Add a URL to the playlist.
    Add {
        url: String,
        /// Seconds to display this entry (defaults to the playlist default)
        #[arg(long)]
        display_time: Option<i64>,
        /// Human label (defaults to the URL host)
        #[arg(long)]
        title: Option<String>,
        /// Replace the whole playlist instead of appending
        #[arg(long)]
        replace: bool,
    },
    /// Remove the entry at a zero-based index.
    Remove { index: usize },
    /// Replace the playlist with these URLs and enable cycling.
    Replace { urls: Vec<String> },
    /// Enable cycling.
    Enable,
    /// Disable cycling.
    Disable,
    /// Remove all entries and stop cycling.
    Clear,
}

#[derive(Subcommand)]
enum ServiceAction {
    Start,
    Stop,
    Restart,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        None | Some(Command::Serve) => {
            let log_file = args
                .log_file
                .clone()
                .unwrap_or_else(|| args.data_dir.join("logs").join("kioskd.log"));
            let _guard = setup_logging(&args.log, &log_file);
            run_server(args.data_dir, log_file).await?;
        }
        Some(Command::RegenKey) => {
            setup_stderr_logging(&args.log);
            regen_key(&args.data_dir).await?;
        }
        Some(command) => {
            setup_stderr_logging(&args.log);
            let client = client_for(&args.data_dir).await?;
            match command {
                Command::Status => cli::status(&client).await?,
                Command::GetUrl => cli::get_url(&client).await?,
                Command::SetUrl { url } => cli::set_url(&client, &url).await?,
                Command::GetOrientation => cli::get_orientation(&client).await?,
                Command::SetOrientation { orientation } => {
                    cli::set_orientation(&client, &orientation).await?
                }
                Command::Playlist { action } => match action {
                    PlaylistAction::Show => cli::playlist_show(&client).await?,
                    PlaylistAction::Add {
                        url,
                        display_time,
                        title,
                        replace,
                    } => cli::playlist_add(&client, &url, display_time, title, replace).await?,
                    PlaylistAction::Remove { index } => {
                        cli::playlist_remove(&client, index).await?
                    }
                    PlaylistAction::Replace { urls } => {
                        cli::playlist_replace(&client, &urls).await?
                    }
                    PlaylistAction::Enable => cli::playlist_enable(&client).await?,
                    PlaylistAction::Disable => cli::playlist_disable(&client).await?,
                    PlaylistAction::Clear => cli::playlist_clear(&client).await?,
                },
                Command::Service { action } => {
                    let verb = match action {
                        ServiceAction::Start => "start",
                        ServiceAction::Stop => "stop",
                        ServiceAction::Restart => "restart",
                    };
                    cli::service(&client, verb).await?
                }
                Command::Logs { lines } => cli::logs(&client, lines).await?,
                Command::Serve | Command::RegenKey => unreachable!(),
            }
        }
    }

    Ok(())
}

/// Build a gateway client from the stored port and API key.
async fn client_for(data_dir: &PathBuf) -> Result<GatewayClient> {
    let store = ConfigStore::open(data_dir).context("failed to open config store")?;
    let config = store.document().await;
    let port = if config.api.port == 0 {
        DEFAULT_API_PORT
    } else {
        config.api.port
    };
    let client = GatewayClient::new(port, config.api.api_key)?;
    if !client.is_reachable().await {
        anyhow::bail!(
            "no gateway answering on port {port}; start the daemon with `kioskd serve`"
        );
    }
    Ok(client)
}

async fn regen_key(data_dir: &PathBuf) -> Result<()> {
    let store = ConfigStore::open(data_dir).context("failed to open config store")?;
    let key = generate_api_key();
    store
        .set_value("api.api_key", serde_json::Value::String(key.clone()))
        .await
        .context("failed to store new api key")?;
    println!("{key}");
    Ok(())
}

async fn run_server(data_dir: PathBuf, log_path: PathBuf) -> Result<()> {
    let store = Arc::new(ConfigStore::open(&data_dir).context("failed to open config store")?);
    let registry = Arc::new(FileProcessRegistry::new(&data_dir)?);
    let cursor = Arc::new(Cursor::new(&data_dir)?);

    let supervisor = Arc::new(
        BrowserSupervisor::new(
            store.clone(),
            registry.clone(),
            data_dir.clone(),
            log_path.clone(),
            SupervisorTiming::default(),
        )
        .context("browser supervisor init failed")?,
    );
    let control = Arc::new(DevToolsClient::new(DEBUG_PORT));
    let navigator = Arc::new(Navigator::new(control, supervisor.clone()));
    let playlist = Arc::new(PlaylistManager::new(
        store.clone(),
        cursor,
        navigator.clone(),
        registry.clone(),
        SchedulerTiming::default(),
    ));

    // Bring the browser up at the stored URL. A launch failure is not fatal
    // here, the health loop keeps retrying.
    let config = store.document().await;
    if let Err(e) = supervisor.launch(&config.kiosk.url).await {
        warn!(error = %e, "initial browser launch failed");
    }
    tokio::spawn(supervisor.clone().run_health_loop());

    // Resume cycling if it was enabled when the daemon last stopped.
    if config.playlist.enabled && config.playlist.urls.len() > 1 {
        if let Err(e) = playlist.enable().await {
            warn!(error = %e, "could not resume playlist cycling");
        } else {
            info!(entries = config.playlist.urls.len(), "resumed playlist cycling");
        }
    }

    let ctx = Arc::new(AppContext {
        store,
        playlist,
        navigator,
        registry,
        data_dir,
        log_path,
        started_at: std::time::Instant::now(),
        service_retry: RetryConfig::default(),
    });
    gateway::start_server(ctx).await
}

/// Initialize the tracing subscriber: stderr plus a non-blocking file writer.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
/// If the log directory cannot be created, falls back to stderr-only logging
/// with a warning, never panics.
fn setup_logging(
    log_level: &str,
    log_file: &std::path::Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let dir = log_file.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = log_file
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("kioskd.log"));

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e}, falling back to stderr",
            dir.display()
        );
        setup_stderr_logging(log_level);
        return None;
    }

    // Fixed filename; rotation is the OS's job (logrotate).
    let appender = tracing_appender::rolling::never(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Some(guard)
}

fn setup_stderr_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
