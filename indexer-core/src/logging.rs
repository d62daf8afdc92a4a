//! Process-wide tracing setup: console and optional file output.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggerConfig;

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must be held for the life of the process.
pub fn init(config: &LoggerConfig) -> Option<WorkerGuard> {
    let parsed_level = config.level.parse::<tracing::Level>();
    let level_is_err = parsed_level.is_err();
    let level = parsed_level.unwrap_or(tracing::Level::INFO);

    // RUST_LOG directives win over the configured level.
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let console_layer = config.console.then(fmt::layer);

    let (file_layer, guard) = if config.file.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&config.file);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "indexer.log".into());

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
            dir, file_name,
        ));
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if level_is_err {
        tracing::warn!(
            "unknown log level {:?}, falling back to {level}",
            config.level
        );
    }

    guard
}
