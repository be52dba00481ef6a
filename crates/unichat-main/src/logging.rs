use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogSection;
use crate::unichat_home::resolve_config_path;

/// Installs the global subscriber. Logs go to a file under `home`; stdout
/// is opt-in so it does not interleave with the conversation.
pub fn init_tracing(home: &Path, log: &LogSection) {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let file_path = resolve_config_path(home, &log.file());
    let (Some(directory), Some(file_name)) = (file_path.parent(), file_path.file_name()) else {
        eprintln!(
            "warning: invalid log file path {}",
            file_path.display()
        );
        return;
    };
    if let Err(error) = fs::create_dir_all(directory) {
        eprintln!("warning: failed to initialize tracing writer: {error}");
        return;
    }
    let file_writer = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_writer);
    let _ = TRACE_GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level()));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);
    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(false);

    let init_result = if log.stdout() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
    };
    if let Err(error) = init_result {
        eprintln!(
            "warning: failed to initialize tracing subscriber for {}: {error}",
            file_path.display()
        );
    }
}
