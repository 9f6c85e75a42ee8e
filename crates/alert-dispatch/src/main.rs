use clap::Parser;

fn main() -> Result<(), anyhow::Error> {
    let args = alert_dispatch::Args::parse();
    alert_dispatch::logging::init_logging(&args.log);

    // Refuse to start without Twilio credentials.
    let config = match alert_dispatch::Config::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(missing = ?err.missing, "{err}");
            std::process::exit(1);
        }
    };
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(alert_dispatch::run(args, config));
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}
