use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Spinner reporting hashing throughput while the walk is still running
pub struct IndexProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl IndexProgress {
    /// Create a spinner; a hidden one when `visible` is false
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if visible {
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner} [{elapsed_precise}] {pos} hashed | {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(200));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }

        Self {
            bar,
            start_time: Instant::now(),
        }
    }

    /// Record one appended row
    pub fn hashed(&self) {
        self.bar.inc(1);
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs > 0.0 {
            let rate = self.bar.position() as f64 / elapsed_secs;
            self.bar.set_message(format!("{:.1} files/sec", rate));
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
