//! Digest Daemon - HTTP endpoint protected by Digest Access Authentication.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use digest_daemon::auth::{SharedCredentials, StaticCredentials};
use digest_daemon::config::Settings;
use digest_daemon::server::{AppState, HttpServer};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings);

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);
    info!("Bind address: {}", settings.server.bind_address);
    info!("Realm: {}", settings.digest.realm);
    info!("Log level: {}", settings.logging.level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings, config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(
    settings: Settings,
    config_path: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let realm = settings.digest.realm.clone();
    let credentials = Arc::new(SharedCredentials::new(StaticCredentials::from_config(
        &settings.credentials,
        &realm,
    )?));
    info!(entries = credentials.len(), "Credentials loaded");

    let state = AppState::from_settings(&settings, credentials.clone())?;
    let metrics = Arc::clone(&state.metrics);
    let server = HttpServer::bind(
        settings.server.bind_address,
        state,
        settings.limits.max_concurrent_requests,
    )
    .await?;

    let shutdown = Arc::new(Notify::new());
    let mut server_task = tokio::spawn(server.run(Arc::clone(&shutdown)));

    loop {
        tokio::select! {
            result = &mut server_task => {
                match result {
                    Ok(Ok(())) => break,
                    Ok(Err(e)) => {
                        error!(error = %e, "HTTP listener failed");
                        return Err(e.into());
                    }
                    Err(e) => {
                        error!(error = %e, "HTTP listener task panicked");
                        return Err(e.into());
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, initiating graceful shutdown...");
                shutdown.notify_one();

                let drain_timeout = Duration::from_secs(30);
                let drain = async {
                    metrics.wait_for_drain().await;
                    let _ = (&mut server_task).await;
                };
                match tokio::time::timeout(drain_timeout, drain).await {
                    Ok(()) => info!("Graceful shutdown complete"),
                    Err(_) => warn!(
                        "Shutdown timeout after {}s, some requests may be terminated",
                        drain_timeout.as_secs()
                    ),
                }
                break;
            }
            _ = reload_signal() => {
                info!("Reload signal received, reloading configuration...");
                reload(&config_path, &realm, &credentials);
            }
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Re-read the config file and swap in its credentials.
///
/// The running engine keeps its realm and nonce settings; only the
/// credential table changes.
fn reload(config_path: &str, realm: &str, credentials: &SharedCredentials) {
    let new_settings = match Settings::load(config_path) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to reload configuration, keeping existing settings");
            return;
        }
    };

    if new_settings.digest.realm != realm {
        warn!(
            running = %realm,
            configured = %new_settings.digest.realm,
            "Realm change requires a restart, keeping the running realm"
        );
    }

    match StaticCredentials::from_config(&new_settings.credentials, realm) {
        Ok(table) => {
            let entries = table.len();
            credentials.replace(table);
            info!(entries = entries, "Configuration reloaded successfully");
        }
        Err(e) => {
            error!(error = %e, "Failed to reload credentials, keeping existing table");
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Wait for a reload signal (SIGHUP).
#[cfg(unix)]
async fn reload_signal() {
    match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGHUP handler");
            std::future::pending::<()>().await;
        }
    }
}

/// No-op reload signal for non-Unix platforms.
#[cfg(not(unix))]
async fn reload_signal() {
    std::future::pending::<()>().await;
}

fn print_help() {
    println!(
        r#"{} {}
HTTP endpoint protected by Digest Access Authentication (RFC 2617).

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: /etc/digest-daemon/daemon.toml]
    -h, --help             Print help information
    -V, --version          Print version information

SIGNALS:
    SIGHUP                 Reload credentials from the configuration file
    SIGTERM, SIGINT        Graceful shutdown
"#,
        NAME, VERSION, NAME
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    "/etc/digest-daemon/daemon.toml".to_string()
}

/// Initialize logging based on settings. `RUST_LOG` wins over the file.
fn init_logging(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
