//! Zentinel SOAP dispatch server binary.
//!
//! Run with: `zentinel-soap-dispatch --config config.yaml`
//!
//! Serves a single reference operation, `EchoRequest`, which returns the
//! request message (and the caller's `Client` header, if sent) unchanged.
//! Useful for smoke-testing a deployment and its SOAP clients.

use anyhow::{Context as _, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_dispatch::{Context, HandlerError, RouteRegistry, SoapServer, SoapServerConfig};

/// SOAP dispatch server for Zentinel.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overrides `server.listen_address`
    #[arg(short = 'a', long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default, Deserialize)]
struct EchoHeader {
    #[serde(rename = "Client", default)]
    client: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EchoRequest {
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "EchoResponse")]
struct EchoResponse {
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "Client", skip_serializing_if = "Option::is_none")]
    client: Option<String>,
}

async fn echo(ctx: Context, header: EchoHeader, body: EchoRequest) -> Result<EchoResponse, HandlerError> {
    info!(
        path = %ctx.uri().path(),
        version = %ctx.version(),
        client = ?header.client,
        "Echo request"
    );
    Ok(EchoResponse {
        message: body.message,
        client: header.client,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP dispatch server v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let mut config = if args.config.exists() {
        SoapServerConfig::load(&args.config).context("Failed to load config file")?
    } else {
        info!("Config file not found, using defaults");
        SoapServerConfig::default()
    };
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }

    info!(
        listen_address = %config.server.listen_address,
        max_body_size = config.settings.max_body_size,
        allowed_versions = ?config.settings.allowed_versions,
        "Configuration loaded"
    );

    let mut registry = RouteRegistry::new();
    registry
        .register("/echo", "urn:zentinel:echo", "EchoRequest", echo)
        .context("Failed to register echo route")?;

    SoapServer::new(config, registry)
        .run(shutdown_signal())
        .await
        .context("SOAP server error")?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, stopping server");
}
