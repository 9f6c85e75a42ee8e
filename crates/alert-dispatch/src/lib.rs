pub mod api;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod messenger;

pub use config::{Args, Config};
pub use dispatch::Dispatcher;

use anyhow::Context;
use futures::FutureExt;
use std::sync::Arc;

/// Serve the alert dispatch API until a shutdown signal is received.
pub async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    for recipient in config.invalid_recipients() {
        tracing::warn!(
            recipient,
            "configured recipient is not a valid E.164 number and will be skipped"
        );
    }
    if config.default_message.is_empty() {
        tracing::warn!("default message is empty; alerts which omit a message will be rejected");
    }

    let messenger: Arc<dyn messenger::Messenger> = if args.dry_run {
        Arc::new(messenger::DryRun::default())
    } else {
        Arc::new(
            messenger::Twilio::new(
                &args.twilio_api_base,
                config.credentials.clone(),
                reqwest::Client::new(),
            )
            .context("building Twilio client")?,
        )
    };
    let dispatcher = Arc::new(Dispatcher::new(config, messenger));

    let app = api::router(dispatcher, Some(args.public_dir));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .context("failed to bind server port")?;

    tracing::info!(port = args.port, dry_run = args.dry_run, "service listening");

    let shutdown = tokio::signal::ctrl_c()
        .map(|result| match result {
            Ok(()) => tracing::info!("caught shutdown signal, stopping..."),
            Err(err) => tracing::error!(?err, "error subscribing to shutdown signal"),
        });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    tracing::info!("service shut down cleanly");
    Ok(())
}
