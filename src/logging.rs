// src/logging.rs

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configure process-wide log verbosity: 0 = warnings, 1 = info, 2 = debug.
/// Called once from option handling at startup; repeated calls are no-ops so
/// tests can initialize freely.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cpufreq_manager={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
