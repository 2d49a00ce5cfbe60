use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::EnvFilter;

/// Per-crate filter directives that replace `--log-level`,
/// e.g. `warn,serialbridge_dispatch=trace`.
pub const LOG_ENV: &str = "SERIALBRIDGE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the stderr subscriber. Frames and reports go to stdout, logs never do.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let filter = build_filter(level, directives.as_deref());
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        // Targets only matter once someone filters by crate.
        .with_target(directives.is_some());

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

/// `SERIALBRIDGE_LOG` directives when set and valid, otherwise the CLI level.
fn build_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(level.as_filter().into());
    match directives {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); using --log-level");
            fallback()
        }),
        None => fallback(),
    }
}
