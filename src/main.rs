//! computer-tool-server: run computer-use actions over HTTP
//!
//! One route. `POST /computer_tool` takes a JSON computer action (mouse, keyboard,
//! scroll, screenshot), runs it through the `computer` tool and answers with the
//! tool result as JSON.

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// === Modules ===

mod config;
mod runner;
mod server;
mod tools;

use config::Config;
use runner::ToolRunner;
use server::AppState;

// === CLI ===

#[derive(Parser)]
#[command(name = "computer-tool-server")]
#[command(about = "HTTP endpoint for computer-use actions")]
struct Cli {
    /// Listen address, overriding the config file (e.g. 127.0.0.1:8081)
    #[arg(long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in your editor
    Config,
    /// Re-enable a disabled action
    Enable { action: String },
    /// Reject an action (e.g. left_click_drag)
    Disable { action: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => {
            run_config_command()?;
        }
        Some(Commands::Enable { action }) => {
            set_action_enabled(&action, true)?;
        }
        Some(Commands::Disable { action }) => {
            set_action_enabled(&action, false)?;
        }
        None => {
            run_server(cli.bind).await?;
        }
    }

    Ok(())
}

/// Open config file in user's editor
fn run_config_command() -> anyhow::Result<()> {
    let config_path = Config::path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../config.toml.example");
        std::fs::write(&config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    // Get editor from environment or use defaults
    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            { "notepad".to_string() }
            #[cfg(not(target_os = "windows"))]
            { "nano".to_string() }
        });

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()?;

    Ok(())
}

/// Toggle an action in the config file
fn set_action_enabled(action: &str, enabled: bool) -> anyhow::Result<()> {
    let known = tools::computer::all_action_names();
    if !known.iter().any(|name| *name == action) {
        anyhow::bail!("Unknown action '{}'. Known actions: {}", action, known.join(", "));
    }

    let mut config = Config::load_file();
    if enabled {
        config.enable(action);
    } else {
        config.disable(action);
    }
    config.save()?;

    println!("{} {}", if enabled { "Enabled" } else { "Disabled" }, action);
    Ok(())
}

/// Run the HTTP server
async fn run_server(bind: Option<String>) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load();
    let bind = bind.unwrap_or_else(|| config.bind.clone());

    let display_env = std::env::var("DISPLAY").ok();
    if config.display_mismatch(display_env.as_deref()) {
        tracing::warn!(
            display_num = ?config.display_num,
            display = ?display_env,
            "display_num only applies to xdotool; screenshots use $DISPLAY. Export DISPLAY=:<display_num> to keep them on the same screen"
        );
    }

    let geometry = match config.geometry() {
        Some(geometry) => Some(geometry),
        None => tokio::task::spawn_blocking(tools::screenshot::primary_geometry).await?,
    };
    match geometry {
        Some((w, h)) => tracing::info!("Screen geometry {}x{}", w, h),
        None => tracing::warn!("Screen geometry unknown, coordinate scaling disabled"),
    }

    let collection = tools::tool_group(config.tool_version, config.computer_settings(geometry));
    for params in collection.to_params() {
        tracing::info!("Serving tool: {}", params);
    }

    let state = AppState {
        runner: ToolRunner::spawn(collection),
    };
    let app = server::router(state);

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        version = %config.tool_version,
        "Starting computer-tool-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("computer-tool-server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
