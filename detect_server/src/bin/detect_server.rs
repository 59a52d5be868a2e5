//! Detection stream server binary.
//!
use std::{net::TcpListener, sync::Arc};

use anyhow::Result;
use clap::Parser;
use detect_server::{
    app::{build_pipeline, serve, AppContext, SHUTDOWN_GRACE},
    config::Config,
    meter::spawn_meter_logger,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Setup logger
    env_logger::builder().format_timestamp_millis().init();

    // Open camera and model once, a failure here ends the process
    let pipeline = build_pipeline(&config).await?;

    let ctx = Arc::new(AppContext::new(pipeline, CancellationToken::new()));
    let shutdown = ctx.shutdown_token().clone();

    spawn_meter_logger();
    tokio::spawn(shutdown_signal(shutdown));

    // Serve HTTP server
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)?;
    log::info!("Serving on http://{}", addr);
    serve(ctx, listener, SHUTDOWN_GRACE).await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
    shutdown.cancel();
}
