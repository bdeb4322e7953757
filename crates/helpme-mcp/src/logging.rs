use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const DEFAULT_FILTER: &str = "helpme=info,helpme_mcp=info,helpme_local=info";

/// Install the global subscriber: stderr always (stdout carries MCP frames), plus a daily
/// rolling file under `log_dir` when given.
///
/// Keep the returned guard alive for the life of the process or buffered file lines are lost.
pub fn init(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir.map(|d| (d, std::fs::create_dir_all(d))) {
        Some((dir, Ok(()))) => {
            let appender = tracing_appender::rolling::daily(dir, "helpme");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        Some((dir, Err(e))) => {
            eprintln!("helpme: file logging disabled ({}: {e})", dir.display());
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init();
    guard
}
