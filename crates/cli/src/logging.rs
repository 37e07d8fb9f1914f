use replyguard_core::config::{AppConfig, LogFormat};
use tracing::Level;

/// Installs the global subscriber on stderr; stdout is reserved for command JSON.
///
/// Safe to call more than once: later calls keep the first subscriber.
pub fn init(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
