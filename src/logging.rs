//! Logging initialization (§10), following the teacher's `ox-bin` pattern: a
//! non-rolling file appender wrapped in `tracing_appender::non_blocking`,
//! filtered by `RUST_LOG` (defaulting to `info` when unset).

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Must be kept alive for the lifetime of the process — dropping it stops
/// the background flush thread and silently truncates in-flight log lines.
pub struct LogGuard(#[allow(dead_code)] WorkerGuard);

/// Initialize the global tracing subscriber. `log_path` defaults to
/// `tmuxcc.log` in the current directory when `None`, matching the
/// teacher's `oxidized.log` default. Calling this more than once (e.g. from
/// multiple test modules) is inert rather than panicking, via `try_init`.
pub fn init(log_path: Option<&Path>) -> LogGuard {
    let default_path = PathBuf::from("tmuxcc.log");
    let path = log_path.unwrap_or(&default_path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "tmuxcc.log".to_string());

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .try_init();

    LogGuard(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let _guard1 = init(Some(&path));
        let _guard2 = init(Some(&path));
    }
}
