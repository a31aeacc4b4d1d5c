//! uiportal CLI and daemon entry point.

mod args;
mod daemon;
mod overlay;

use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use serde_json::{Map, Value};
use tracing::{error, info};

use uiportal_core::input::parse_key;
use uiportal_core::protocol::{Request, ResponseEnvelope};

use crate::args::{Cli, Commands, DaemonArgs};
use crate::daemon::{DaemonClient, Dispatcher, PortalServer};
use crate::daemon::{paths, providers};
use crate::overlay::surface::PngSurface;
use crate::overlay::OverlayConfig;

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    // Daemon command runs the server, all other commands are clients
    if let Commands::Daemon(daemon_args) = &cli.command {
        run_daemon(daemon_args.clone());
        return;
    }

    // All other commands talk to the daemon
    if let Err(e) = run_client_command(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Convert CLI args to a protocol Request.
///
/// Returns None for commands that don't require daemon communication.
fn cli_to_request(cli: &Cli) -> anyhow::Result<Option<Request>> {
    let request = match &cli.command {
        Commands::Ping => Request::query("ping"),
        Commands::Tree => Request::query("a11y_tree"),
        Commands::PhoneState => Request::query("phone_state"),
        Commands::State => Request::query("state"),
        Commands::Type(type_args) => {
            let mut payload = Map::new();
            payload.insert(
                "base64_text".to_string(),
                Value::String(general_purpose::STANDARD.encode(&type_args.text)),
            );
            payload.insert("append".to_string(), Value::Bool(type_args.append));
            Request::write("keyboard/input", payload)
        }
        Commands::SetText(set_args) => {
            let mut payload = Map::new();
            payload.insert(
                "hex_text".to_string(),
                Value::String(hex::encode(&set_args.text)),
            );
            payload.insert("append".to_string(), Value::Bool(set_args.append));
            Request::write("keyboard/set_text", payload)
        }
        Commands::Clear => Request::write("keyboard/clear", Map::new()),
        Commands::Key(key_args) => {
            let key_code = parse_key(&key_args.key)?;
            let mut payload = Map::new();
            payload.insert("key_code".to_string(), Value::from(key_code));
            Request::write("keyboard/key", payload)
        }
        Commands::OverlayOffset(offset_args) => {
            let mut payload = Map::new();
            payload.insert("offset".to_string(), Value::from(offset_args.offset));
            Request::write("overlay_offset", payload)
        }
        Commands::Examples => return Ok(None),
        Commands::Daemon(_) => unreachable!("Daemon command handled separately"),
        Commands::Stop => Request::query("shutdown"),
    };
    Ok(Some(request))
}

/// Run a client command by connecting to the daemon.
fn run_client_command(cli: Cli) -> anyhow::Result<()> {
    // Handle commands that don't need daemon communication
    let Some(request) = cli_to_request(&cli)? else {
        // Examples command just prints and exits
        if let Commands::Examples = cli.command {
            println!("{}", crate::args::EXAMPLES_TEXT);
        }
        return Ok(());
    };

    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        // Connect to daemon (auto-starts if not running)
        let mut client = DaemonClient::connect().await?;

        // Send request and print the envelope payload
        match client.request(request).await? {
            ResponseEnvelope::Success { data } => match data {
                Value::String(text) => println!("{}", text),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            },
            ResponseEnvelope::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
        }

        Ok(())
    })
}

/// Run the daemon server with graceful signal handling.
///
/// The dispatcher is wired with disconnected collaborator defaults: the
/// stand-alone binary answers ping and overlay endpoints, and reports the
/// accessibility provider / keyboard bridge as unavailable until a host
/// process embeds real implementations. The PortalServer's Drop impl cleans
/// up socket and PID files.
fn run_daemon(daemon_args: DaemonArgs) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let frame_path = daemon_args
            .frame_path
            .clone()
            .unwrap_or_else(paths::get_frame_path);
        let surface_size = (daemon_args.width, daemon_args.height);
        let overlay = overlay::start(
            OverlayConfig {
                surface_size,
                settle_delay: std::time::Duration::from_millis(daemon_args.settle_ms),
            },
            PngSurface::factory(&frame_path, surface_size),
        );
        overlay.set_on_ready_callback(|| info!("Overlay surface ready"));
        overlay.show_overlay();

        let (provider, bridge) = providers::disconnected();
        let dispatcher = Dispatcher::new(provider, bridge, overlay.clone(), daemon_args.max_tree_depth);

        let server = match PortalServer::bind(dispatcher).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to start daemon: {}", e);
                std::process::exit(1);
            }
        };

        // Run server with signal handling
        tokio::select! {
            result = server.run() => {
                if let Err(e) = result {
                    error!("Daemon error: {}", e);
                    std::process::exit(1);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down gracefully");
            }
            _ = sigterm() => {
                info!("Received SIGTERM, shutting down gracefully");
            }
        }

        overlay.hide_overlay();
        overlay.shutdown();
        // Server is dropped here, triggering cleanup of socket and PID files
    });
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
/// This graceful fallback prevents panics during daemon startup.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, daemon will only respond to SIGINT",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM is not available on non-Unix platforms; use a never-completing future.
#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
