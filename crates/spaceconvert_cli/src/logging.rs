//! Terminal and rolling-file tracing setup

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use spaceconvert_core::config::LoggingConfig;

const INFO_FILTER: &str = "spaceconvert_core=info,spaceconvert_matrix=info,spaceconvert_cli=info,warn";
const DEBUG_FILTER: &str =
    "spaceconvert_core=debug,spaceconvert_matrix=debug,spaceconvert_cli=debug,reqwest=info,info";

/// Install the global subscriber.
///
/// The terminal honours `RUST_LOG` unless `--debug` is given. The log file
/// always records debug output for our crates. The returned guard flushes
/// the file writer and must be held until exit.
pub fn init(config: &LoggingConfig, debug: bool) -> Option<WorkerGuard> {
    let env_filter = if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(INFO_FILTER))
    };

    let terminal_layer = if debug {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .pretty()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    let log_dir = config.log_dir();
    let file = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let file_appender = rolling::daily(&log_dir, &config.file_prefix);
            Some(tracing_appender::non_blocking(file_appender))
        }
        Err(e) => {
            eprintln!("Not writing log files to {}: {e}", log_dir.display());
            None
        }
    };
    let (file_writer, guard) = match file {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(EnvFilter::new(DEBUG_FILTER))
    });

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(env_filter))
        .with(file_layer)
        .init();

    if guard.is_some() {
        tracing::info!(
            "Logging initialized. Logs are being written to: {}",
            log_dir.join(&config.file_prefix).display()
        );
    }
    guard
}
