use axum::{
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
// Daemonize is Unix-only.
#[cfg(unix)]
use daemonize::Daemonize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, RwLock};
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::cobalt::CobaltClient;
use crate::config::{load_config, Config};
use crate::coordinator::DownloadCoordinator;
use crate::oembed::OEmbedClient;

// --- Modules ---
pub mod cobalt;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod janitor;
pub mod models;
pub mod oembed;
pub mod resolver;
pub mod ytdlp;

// --- State Type Aliases ---
pub type ConfigState = Arc<RwLock<Config>>;
pub type CoordinatorState = Arc<RwLock<Arc<DownloadCoordinator>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigState,
    pub coordinator: CoordinatorState,
}

// --- Command-Line Argument Parsing ---
#[derive(Parser, Debug)]
#[command(author, version, about = "A YouTube download backend.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manages the server process.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Print the video id extracted from a YouTube link.
    Resolve {
        url: String,
    },
    /// Ask the conversion service for every quality of a video and print the results.
    Probe {
        url: String,
        /// Conversion API to query instead of the configured one. Repeat to compare instances.
        #[arg(long = "api")]
        apis: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ServerAction {
    /// Start the server as a background process.
    Start,
    /// Stop the background server process.
    Stop,
    /// Restart the background server process.
    Restart,
    /// Run the server in the foreground.
    Run,
    /// Check the status of the background server process.
    Status,
}

// --- Main Application Logic ---
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Server { action } => match action {
            ServerAction::Start => start_server()?,
            ServerAction::Stop => stop_server()?,
            ServerAction::Restart => {
                stop_server()?;
                std::thread::sleep(std::time::Duration::from_secs(1));
                start_server()?;
            }
            ServerAction::Run => run_server().await?,
            ServerAction::Status => check_status()?,
        },
        Commands::Resolve { url } => resolve(url)?,
        Commands::Probe { url, apis } => probe(url, apis).await?,
    }

    Ok(())
}

/// Wires the HTTP upstream clients and the fallback catalogue from configuration.
pub fn build_coordinator(config: &Config) -> anyhow::Result<DownloadCoordinator> {
    let timeout = config.request_timeout();
    Ok(DownloadCoordinator::new(
        Arc::new(CobaltClient::new(&config.cobalt_api_url, timeout)?),
        Arc::new(OEmbedClient::new(&config.oembed_url, timeout)?),
        config.fallback.clone(),
        timeout,
    ))
}

// --- Server Action Functions ---

/// The core function that runs the Axum web server.
async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = load_config().await?;
    let coordinator = build_coordinator(&config)?;

    let download_dir = PathBuf::from(&config.download_directory);
    fs::create_dir_all(&download_dir)?;

    let state = AppState {
        config: Arc::new(RwLock::new(config)),
        coordinator: Arc::new(RwLock::new(Arc::new(coordinator))),
    };
    tokio::spawn(janitor::run(state.config.clone()));
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("{}:{}", host, port_str);
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/video-info", post(handlers::video_info))
        .route("/api/download", post(handlers::request_download))
        .route("/api/direct-links", post(handlers::direct_links))
        .route("/api/fallback-services", post(handlers::fallback_services))
        .route("/api/local/video-info", post(handlers::local_video_info))
        .route("/api/local/download", post(handlers::local_download))
        .route("/api/file/*path", get(handlers::get_file))
        .route("/config", get(handlers::get_config).post(handlers::update_config))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state);
    tracing::info!("Starting server in foreground, listening on {}", addr);
    tracing::info!("Download directory: {}", download_dir.display());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Starts the server as a background process using platform-specific logic.
fn start_server() -> anyhow::Result<()> {
    if is_running()? {
        println!("Server is already running.");
        return Ok(());
    }

    let pid_file = get_pid_path()?;
    let myself = env::current_exe()?;
    println!("Starting server in the background...");

    #[cfg(unix)]
    {
        let daemonize = Daemonize::new().pid_file(&pid_file);
        match daemonize.start() {
            Ok(_) => {
                // Detached process: re-launch ourselves with `server run`.
                Command::new(&myself).arg("server").arg("run").spawn()?;
            }
            Err(e) => eprintln!("Error, failed to daemonize: {}", e),
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;

        let child = Command::new(&myself)
            .arg("server")
            .arg("run")
            .creation_flags(CREATE_NO_WINDOW)
            .spawn()?;

        fs::write(&pid_file, child.id().to_string())?;
    }

    println!("Server started successfully. PID file at: {}", pid_file.display());
    Ok(())
}

/// Stops the background server process.
fn stop_server() -> anyhow::Result<()> {
    let pid_file = get_pid_path()?;
    if !pid_file.exists() {
        println!("Server is not running (no PID file).");
        return Ok(());
    }
    let pid_str = fs::read_to_string(&pid_file)?;
    let pid: u32 = pid_str.trim().parse()?;
    let s = System::new_all();
    if let Some(process) = s.process(Pid::from_u32(pid)) {
        println!("Stopping server process with PID: {}", pid);
        process.kill();
    } else {
        println!("Process with PID {} not found. It may have already stopped.", pid);
    }
    fs::remove_file(&pid_file)?;
    println!("Server stopped.");
    Ok(())
}

/// Checks if the server process is running.
fn check_status() -> anyhow::Result<()> {
    if is_running()? {
        let pid_str = fs::read_to_string(get_pid_path()?)?;
        println!("Server is running with PID: {}", pid_str.trim());
    } else {
        println!("Server is not running.");
    }
    Ok(())
}

// --- Diagnostic Commands ---

fn resolve(url: &str) -> anyhow::Result<()> {
    let reference = resolver::resolve_video_id(url)
        .ok_or_else(|| anyhow::anyhow!("Not a supported YouTube link: {}", url))?;
    println!("{}", reference.id);
    Ok(())
}

/// Checks that each conversion service answers for a real video. Without
/// `--api` flags only the configured instance is queried.
async fn probe(url: &str, apis: &[String]) -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = load_config().await?;
    let reference = resolver::resolve_video_id(url)
        .ok_or_else(|| anyhow::anyhow!("Not a supported YouTube link: {}", url))?;

    for target in conversion_targets(&config, apis) {
        let coordinator = build_coordinator(&target)?;
        println!("Probing {} for video {}", target.cobalt_api_url, reference.id);
        let links = coordinator.list_direct_download_links(&reference, &CancellationToken::new()).await;
        for link in links.video.iter().chain(links.audio.iter()) {
            println!("  {:>8} {}  {}", link.quality.as_str(), link.format, link.url);
        }

        if links.is_empty() {
            println!("No direct links. Fallback pages:");
            for is_audio in [false, true] {
                for service in coordinator.list_fallback_services(&reference, is_audio) {
                    println!("  {:<16} {}", service.name, service.url);
                }
            }
        }
    }
    Ok(())
}

/// One configuration per conversion API, in the order given.
fn conversion_targets(config: &Config, apis: &[String]) -> Vec<Config> {
    if apis.is_empty() {
        return vec![config.clone()];
    }
    apis.iter()
        .map(|api| Config { cobalt_api_url: api.clone(), ..config.clone() })
        .collect()
}

// --- Helper Functions ---

/// Gets the path for the server's PID file.
fn get_pid_path() -> anyhow::Result<PathBuf> {
    let project_dirs = config::project_dirs()?;
    let data_dir = project_dirs.data_local_dir();
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("server.pid"))
}

/// Checks if the server is running by checking the PID file and the process list.
fn is_running() -> anyhow::Result<bool> {
    let pid_file = get_pid_path()?;
    if !pid_file.exists() {
        return Ok(false);
    }
    let pid_str = fs::read_to_string(pid_file)?;
    let pid: u32 = pid_str.trim().parse()?;
    let s = System::new_all();
    Ok(s.process(Pid::from_u32(pid)).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_flags_repeat_and_default_to_config() {
        let cli = Cli::try_parse_from([
            "yt_fetch",
            "probe",
            "https://youtu.be/jNQXAC9IVRw",
            "--api",
            "https://one.example/",
            "--api",
            "https://two.example/",
        ])
        .unwrap();
        let Commands::Probe { apis, .. } = cli.command else {
            panic!("expected a diagnostic subcommand");
        };

        let config = Config::default();
        let targets = conversion_targets(&config, &apis);
        let urls: Vec<&str> = targets.iter().map(|c| c.cobalt_api_url.as_str()).collect();
        assert_eq!(urls, vec!["https://one.example/", "https://two.example/"]);
        assert_eq!(targets[1].fallback, config.fallback);

        let defaults = conversion_targets(&config, &[]);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].cobalt_api_url, config.cobalt_api_url);
    }
}
