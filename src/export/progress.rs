use tracing::{debug, info};

/// Receives progress events from an export. Purely observational.
pub trait ProgressReporter: Send {
    fn start(&mut self, total: u64);
    fn increment(&mut self);
    fn set_total(&mut self, total: u64);
    fn update(&mut self, message: &str);
    fn stop(&mut self);
}

/// Reports story progress through `tracing`: a line at info level for every
/// tenth of the way, and each step message at debug level.
#[derive(Debug, Default)]
pub struct LogProgress {
    position: u64,
    total: u64,
    last_percent: u64,
    active: bool,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn percent(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        (self.position * 100 / self.total).min(100)
    }
}

impl ProgressReporter for LogProgress {
    fn start(&mut self, total: u64) {
        self.position = 0;
        self.total = total;
        self.last_percent = 0;
        self.active = true;
        info!("Inserting {total} stories");
    }

    fn increment(&mut self) {
        self.position += 1;
        let percent = self.percent();
        if percent >= self.last_percent + 10 || self.position == self.total {
            self.last_percent = percent;
            info!("{percent}% | {}/{}", self.position, self.total);
        }
    }

    fn set_total(&mut self, total: u64) {
        if total != self.total {
            debug!(previous = self.total, total, "Story total changed");
            self.total = total;
        }
    }

    fn update(&mut self, message: &str) {
        debug!(position = self.position, total = self.total, "{message}");
    }

    fn stop(&mut self) {
        if self.active {
            self.active = false;
            debug!(position = self.position, total = self.total, "Progress stopped");
        }
    }
}
