use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tenant_oidc::config::GatewayConfig;
use tenant_oidc::gateway::{create_router, GatewayState};

/// Tenant-aware OpenID Connect login gateway
#[derive(Parser)]
#[command(name = "tenant-oidc-gateway", about = "OpenID Connect login gateway with tenant cookie propagation")]
struct Cli {
    /// Path to the gateway configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "gateway.yaml")]
    config: PathBuf,

    /// Seconds between expired-session sweeps
    #[arg(long, env = "SESSION_CLEANUP_INTERVAL", default_value_t = 300)]
    cleanup_interval: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_oidc=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = GatewayConfig::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Failed to load config from {:?}: {}", cli.config, e);
        std::process::exit(1);
    });

    tracing::info!("Tenant OIDC gateway starting");
    tracing::info!("  Scheme:     {} ({})", config.oidc.scheme, config.oidc.display_name);
    tracing::info!("  Authority:  {}", config.oidc.authority);
    tracing::info!("  Tenant key: {}", config.multi_tenancy.tenant_key);
    tracing::info!("  Listen:     {}", config.server.listen);

    let state = GatewayState::from_config(&config, reqwest::Client::new()).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    // Warm the provider metadata; failures are retried on first login.
    for handler in state.schemes.iter() {
        if let Err(e) = handler.metadata().await {
            tracing::warn!("Provider discovery for {} failed (will retry): {}", handler.scheme(), e);
        }
    }

    state.session_manager.start_cleanup_task(cli.cleanup_interval);

    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind to {}: {}", config.server.listen, e);
            std::process::exit(1);
        });

    tracing::info!("Tenant OIDC gateway listening on {}", config.server.listen);

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    });
}
