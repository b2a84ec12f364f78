use std::sync::atomic::{AtomicI32, Ordering};

/// Receives download progress events.
pub trait ProgressListener: Send + Sync {
    fn start(&self, label: &str);
    fn progress(&self, label: &str, percent: u8);
    fn info(&self, label: &str, message: &str);
    fn done(&self, label: &str);
}

/// Logs progress through `tracing`, only once per 10% step.
#[derive(Debug)]
pub struct TracingProgressListener {
    last_step: AtomicI32,
}

impl TracingProgressListener {
    pub fn new() -> Self {
        Self {
            last_step: AtomicI32::new(-1),
        }
    }

    /// True when `percent` enters a 10% step not reported yet.
    fn crosses_step(&self, percent: u8) -> bool {
        let step = i32::from(percent.min(100) / 10);
        self.last_step.fetch_max(step, Ordering::SeqCst) < step
    }
}

impl Default for TracingProgressListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for TracingProgressListener {
    fn start(&self, label: &str) {
        self.last_step.store(-1, Ordering::SeqCst);
        tracing::info!("{} : starting...", label);
    }

    fn progress(&self, label: &str, percent: u8) {
        if self.crosses_step(percent) {
            tracing::debug!("{} : {} %", label, percent);
        }
    }

    fn info(&self, label: &str, message: &str) {
        tracing::info!("{} : {}", label, message);
    }

    fn done(&self, label: &str) {
        tracing::info!("{} : finished", label);
    }
}
