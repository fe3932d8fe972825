use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use std::time::{Duration, Instant};

/// Cadence of the log-based reporter.
const LOG_THROTTLE: Duration = Duration::from_secs(2);

/// Receives transfer progress for one asset as a side effect of the
/// download; never part of the return contract.
pub trait ProgressReporter: Send {
    fn on_start(&mut self, total_bytes: u64);

    fn on_progress(&mut self, bytes_downloaded: u64);

    fn on_complete(&mut self);
}

/// Creates one reporter per asset transfer.
pub trait ProgressFactory: Send + Sync {
    fn for_asset(&self, name: &str) -> Box<dyn ProgressReporter>;
}

/// Discards all progress events.
pub struct SilentProgress;

impl ProgressFactory for SilentProgress {
    fn for_asset(&self, _name: &str) -> Box<dyn ProgressReporter> {
        Box::new(SilentReporter)
    }
}

struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_start(&mut self, _total_bytes: u64) {}
    fn on_progress(&mut self, _bytes_downloaded: u64) {}
    fn on_complete(&mut self) {}
}

/// Logs progress at most once every ~2 seconds per asset.
pub struct LogProgress;

impl ProgressFactory for LogProgress {
    fn for_asset(&self, name: &str) -> Box<dyn ProgressReporter> {
        Box::new(LogReporter {
            name: name.to_string(),
            total: 0,
            last_update: Instant::now(),
        })
    }
}

struct LogReporter {
    name: String,
    total: u64,
    last_update: Instant,
}

impl ProgressReporter for LogReporter {
    fn on_start(&mut self, total_bytes: u64) {
        self.total = total_bytes;
        self.last_update = Instant::now();
    }

    fn on_progress(&mut self, bytes_downloaded: u64) {
        if self.last_update.elapsed() < LOG_THROTTLE {
            return;
        }
        self.last_update = Instant::now();
        if self.total > 0 {
            let percentage = bytes_downloaded as f64 / self.total as f64 * 100.0;
            info!(
                "Downloading {}: {bytes_downloaded} / {} ({percentage:.2}%)",
                self.name, self.total
            );
        } else {
            info!("Downloading {}: {bytes_downloaded} bytes", self.name);
        }
    }

    fn on_complete(&mut self) {
        info!("Finished downloading {}", self.name);
    }
}

/// Renders one progress bar per asset on a shared [`MultiProgress`].
pub struct IndicatifProgress {
    multi: MultiProgress,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressFactory for IndicatifProgress {
    fn for_asset(&self, name: &str) -> Box<dyn ProgressReporter> {
        let bar = self.multi.add(ProgressBar::hidden());
        bar.set_message(name.to_string());
        Box::new(IndicatifReporter { bar })
    }
}

struct IndicatifReporter {
    bar: ProgressBar,
}

impl ProgressReporter for IndicatifReporter {
    fn on_start(&mut self, total_bytes: u64) {
        if total_bytes > 0 {
            self.bar.set_length(total_bytes);
            self.bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            self.bar.set_style(
                ProgressStyle::with_template("{msg} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }
        self.bar.reset();
    }

    fn on_progress(&mut self, bytes_downloaded: u64) {
        self.bar.set_position(bytes_downloaded);
    }

    fn on_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_reporter_sequence() {
        let mut reporter = LogProgress.for_asset("app.apk");
        reporter.on_start(1024);
        reporter.on_progress(512);
        reporter.on_progress(1024);
        reporter.on_complete();
    }

    #[test]
    fn test_silent_reporter_sequence() {
        let mut reporter = SilentProgress.for_asset("app.apk");
        reporter.on_start(0);
        reporter.on_progress(100);
        reporter.on_complete();
    }

    #[test]
    fn test_indicatif_reporter_sequence() {
        let factory = IndicatifProgress::new();
        let mut reporter = factory.for_asset("app.apk");
        reporter.on_start(2048);
        reporter.on_progress(1024);
        reporter.on_complete();
    }
}
