//! Subscriber setup.
//!
//! The configured level applies to the bridge's own targets. Everything else,
//! the BLE backend included, only reports warnings. `RUST_LOG` replaces both.

use crate::domain::settings::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level for targets outside the bridge
const DEPENDENCY_LEVEL: &str = "warn";

pub struct LoggingGuard {
    // Dropping it flushes the log file
    _file: Option<WorkerGuard>,
}

fn filter_directives(level: &str) -> String {
    format!(
        "{},{}={}",
        DEPENDENCY_LEVEL,
        env!("CARGO_CRATE_NAME"),
        level.trim()
    )
}

/// Filter for the configured level, or `info` if the level does not parse.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directives(level)).unwrap_or_else(|e| {
        eprintln!("Invalid log level {:?} ({}), using info", level, e);
        EnvFilter::new(filter_directives("info"))
    })
}

pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(&settings.level));

    let console = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(settings.ansi_colors)
            .with_target(settings.show_target)
            .with_thread_ids(settings.show_thread_ids)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
    });

    let mut file_guard = None;
    let mut file = None;
    if settings.file_logging_enabled {
        let dir = settings.log_dir();
        std::fs::create_dir_all(&dir)?;
        let appender = RollingFileAppender::new(settings.rotation(), &dir, &settings.file_name_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        file = Some((
            dir,
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(settings.show_target)
                .with_thread_ids(settings.show_thread_ids)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line),
        ));
    }
    let (log_dir, file_layer) = file.unzip();

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    match log_dir {
        Some(dir) => tracing::info!("Logging at {} to {}", settings.level, dir.display()),
        None => tracing::info!("Logging at {}, no log file", settings.level),
    }

    Ok(LoggingGuard { _file: file_guard })
}
