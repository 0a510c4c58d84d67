//! SFDaaS server binary (Space Flight Dynamics as a Service).

use std::sync::Arc;

use sfdaas_core::SfdConfig;
use sfdaas_server::{routes, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" | "version" => {
                println!("sfdaas {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'sfdaas help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let config = SfdConfig::from_env()?;
    let port = config.port;
    let sweep_interval = config.session.sweep_interval;
    info!(
        "Context path: {:?}, principal: {}",
        config.context_path, config.principal
    );

    let state = Arc::new(AppState::new(config));

    // Evict idle sessions in the background
    let sweeper = state.coordinator.sessions().spawn_sweeper(sweep_interval);

    let app = routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("SFDaaS server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("SFDaaS server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_help() {
    println!("SFDaaS: cached, session-aware orbital state propagation");
    println!();
    println!("Usage: sfdaas [command]");
    println!();
    println!("Commands:");
    println!("  (none)      Start the server");
    println!("  version     Print the version");
    println!("  help        Show this help message");
    println!();
    println!("Environment:");
    println!("  PORT                  HTTP port (default 8080)");
    println!("  SFD_CONTEXT_PATH      URL prefix (default /SFDaaS)");
    println!("  SFD_PRINCIPAL         Identity folded into cache keys (default $USER)");
    println!("  SFD_STEP_SECONDS      RK4 step size (default 60)");
    println!("  SFD_MAX_SPAN_SECONDS  Longest propagation span (default 10 years)");
    println!("  SFD_GM                Gravitational parameter, m^3/s^2");
    println!("  SFD_CACHE_ADDR        Default memcached servers, e.g. 127.0.0.1:11211");
    println!("  SFD_CACHE_TIMEOUT_MS  Cache backend timeout (default 500)");
    println!("  SFD_CACHE_REQUIRED    1 to fail requests when the cache is unreachable");
    println!("  SFD_CACHE_LOCAL_MAX_ENTRIES  In-process cache entry cap (default 10000)");
    println!("  RUST_LOG              Log filter (default info)");
}
