use crate::error::ConfigError;
use crate::settings::LoggingSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Installs the global subscriber: stdout, a daily `trading.log` at INFO and
/// a daily `error.log` at ERROR.
///
/// The returned guards flush the file writers on drop, so keep them alive
/// for as long as the process runs.
pub fn init_tracing(settings: &LoggingSettings) -> Result<Vec<WorkerGuard>, ConfigError> {
    let trading_file = daily_file(settings, "trading")?;
    let error_file = daily_file(settings, "error")?;
    let (trading_writer, trading_guard) = tracing_appender::non_blocking(trading_file);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_file);

    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if settings.json {
        layers.push(fmt::layer().json().with_filter(stdout_filter).boxed());
    } else {
        layers.push(fmt::layer().with_target(true).with_filter(stdout_filter).boxed());
    }
    layers.push(
        fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(trading_writer)
            .with_filter(LevelFilter::INFO)
            .boxed(),
    );
    layers.push(
        fmt::layer()
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(error_writer)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    );

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| ConfigError::TelemetryError(e.to_string()))?;

    Ok(vec![trading_guard, error_guard])
}

fn daily_file(settings: &LoggingSettings, prefix: &str) -> Result<RollingFileAppender, ConfigError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&settings.directory)
        .map_err(|e| {
            ConfigError::TelemetryError(format!(
                "cannot open {prefix}.log in {}: {e}",
                settings.directory.display()
            ))
        })
}
