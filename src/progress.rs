//! Throttled byte counting for running transfers.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// Minimum time between two redraws of the console progress line.
pub const CONSOLE_INTERVAL: Duration = Duration::from_millis(100);
/// Minimum time between two updates of a web-visible download entry.
pub const WEB_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    /// Advertised length, 0 when the server did not send one.
    pub total: u64,
    /// Bytes per second over the last sample window.
    pub speed: u64,
}

/// Receives throttled progress from a [`ProgressReporter`].
pub trait ProgressSink: Send {
    /// Called once the output file exists.
    fn opened(&mut self, _path: &Path, _total: u64) {}

    fn update(&mut self, progress: Progress);

    fn finish(&mut self) {}

    /// Takes ownership of the completed file before it is recorded.
    ///
    /// `false` means the transfer was cancelled meanwhile and the file must go.
    fn claim(&mut self) -> bool {
        true
    }
}

pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    interval: Duration,
    total: u64,
    transferred: u64,
    speed: u64,
    last_sample: Instant,
    last_bytes: u64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            total: 0,
            transferred: 0,
            speed: 0,
            last_sample: Instant::now(),
            last_bytes: 0,
        }
    }

    pub fn start(&mut self, path: &Path, total: u64) {
        self.total = total;
        self.last_sample = Instant::now();
        self.sink.opened(path, total);
        self.sink.update(self.progress());
    }

    pub fn record(&mut self, bytes: u64) {
        self.transferred += bytes;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sample);
        if elapsed < self.interval {
            return;
        }
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.speed = ((self.transferred - self.last_bytes) as f64 / secs) as u64;
        }
        self.last_sample = now;
        self.last_bytes = self.transferred;
        self.sink.update(self.progress());
    }

    /// Flushes the final count to the sink.
    pub fn finish(&mut self) {
        self.sink.update(self.progress());
        self.sink.finish();
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    fn progress(&self) -> Progress {
        Progress {
            transferred: self.transferred,
            total: self.total,
            speed: self.speed,
        }
    }
}

/// Redraws a single progress line on stdout.
#[derive(Default)]
pub struct ConsoleSink {
    name: String,
}

impl ProgressSink for ConsoleSink {
    fn opened(&mut self, path: &Path, _total: u64) {
        self.name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    fn update(&mut self, progress: Progress) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{}", render_line(progress, &self.name));
        let _ = out.flush();
    }

    fn finish(&mut self) {
        println!();
    }
}

fn render_line(progress: Progress, name: &str) -> String {
    if progress.total > 0 {
        let pct = progress.transferred as f64 / progress.total as f64 * 100.0;
        let bar = ((pct / 2.0) as usize).min(50);
        format!(
            "[{:<51}] {:6.2}% {} / {}  {}",
            format!("{}>", "=".repeat(bar)),
            pct,
            format_bytes(progress.transferred),
            format_bytes(progress.total),
            name
        )
    } else {
        format!("{} downloaded  {}", format_bytes(progress.transferred), name)
    }
}

/// Human-readable size using binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}
