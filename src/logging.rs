use std::fs;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "xenergy_cleaner=info";
const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "xenergy_cleaner.log";

/// Initializes the logging system with console output and, optionally, a
/// daily-rolling JSON file under `logs/`.
pub fn init_logging(log_to_file: bool) {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    // Create a formatted layer for console logging
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    if !log_to_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
        return;
    }

    // Ensure logs directory exists
    let _ = fs::create_dir_all(LOG_DIR);

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Create a JSON layer for file logging
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // We need to keep the guard in scope to ensure logs are flushed on exit
    std::mem::forget(_guard);
}
