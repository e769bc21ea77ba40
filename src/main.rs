use anyhow::{Context, Result};
use clap::Parser;
use kontext_pipeline::{api, app::Pipeline, config, logging};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "kontext-pipeline",
    about = "Knowledge ingestion pipeline: HTTP submission, status consumer, and long-poll status"
)]
struct Cli {
    /// Port to listen on; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Serve HTTP without starting the status consumer.
    #[arg(long)]
    no_consumer: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();

    let pipeline = Pipeline::from_config(config::get_config()).await?;
    let shutdown = CancellationToken::new();

    let consumer = if cli.no_consumer {
        tracing::info!("Status consumer disabled");
        None
    } else {
        let consumer = pipeline.consumer.clone();
        let token = shutdown.clone();
        Some(tokio::spawn(async move { consumer.run(token).await }))
    };

    let app = api::create_router(pipeline.service.clone());
    let (listener, port) = bind_listener(cli.port.or(config::get_config().server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await
        .context("HTTP server terminated unexpectedly")?;

    shutdown.cancel();
    if let Some(handle) = consumer {
        handle.await.context("Status consumer task failed")?;
    }
    Ok(())
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
