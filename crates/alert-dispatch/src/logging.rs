/// Arguments which configure the global tracing subscriber.
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. An explicit RUST_LOG filter takes precedence.
    #[clap(
        long = "log.level",
        env = "LOG_LEVEL",
        value_enum,
        default_value = "info"
    )]
    pub level: LogLevel,
    /// The format for log output. Defaults to `text` when stderr is a
    /// terminal and `json` otherwise.
    #[clap(long = "log.format", env = "LOG_FORMAT", value_enum)]
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Install a global tracing subscriber which prints structured logs to stderr.
pub fn init_logging(args: &LogArgs) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.level.as_directive()));

    let format = args.format.unwrap_or_else(|| {
        if atty::is(atty::Stream::Stderr) {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    });

    let builder = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(
            builder
                .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
                .finish(),
        ),
    };
    result.expect("setting tracing default failed");
}
