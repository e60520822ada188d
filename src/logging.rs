use log::{debug, info};
use std::sync::Once;

static INIT: Once = Once::new();

/// Logs go to stderr; stdout carries the IPC responses. `RUST_LOG` overrides
/// the default `info` level.
pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Stderr)
            .format_timestamp_secs()
            .format_module_path(false)
            .init();

        debug!("logging initialized");
    });
}

/// Wall-clock timing for a long request, reported at `info` when finished.
pub struct TimedOperation {
    start: std::time::Instant,
    operation: String,
}

impl TimedOperation {
    pub fn new(operation: &str) -> Self {
        debug!("starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn finish_with_info(self, detail: &str) -> u64 {
        let elapsed = self.start.elapsed().as_millis() as u64;
        info!("{} took {}ms ({})", self.operation, elapsed, detail);
        elapsed
    }
}
