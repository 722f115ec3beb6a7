//! Streaming download progress.
//!
//! Renders a single carriage-return line on stderr: percentage (when the
//! total is known), transferred bytes, and transfer rate. A background
//! download must stay silent while pip still owns the terminal, so rendering
//! can be gated on the runner's completion flag.

use std::io::{Write, stderr};
use std::time::Instant;

use tokio::sync::watch;

/// When a progress line may be drawn.
#[derive(Debug)]
pub enum Visibility {
    Always,
    /// Drawn only once the watched flag flips to true.
    WhenSet(watch::Receiver<bool>),
}

impl Visibility {
    fn visible(&self) -> bool {
        match self {
            Visibility::Always => true,
            Visibility::WhenSet(rx) => *rx.borrow(),
        }
    }
}

#[derive(Debug)]
pub struct DownloadProgress {
    total: Option<u64>,
    transferred: u64,
    started: Instant,
    visibility: Visibility,
    drew: bool,
}

impl DownloadProgress {
    #[must_use]
    pub fn new(visibility: Visibility) -> Self {
        Self {
            total: None,
            transferred: 0,
            started: Instant::now(),
            visibility,
            drew: false,
        }
    }

    /// Record the declared total size. `None` switches to indeterminate
    /// reporting (bytes and rate only).
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Record the running byte count and redraw when visible.
    pub fn update(&mut self, transferred: u64) {
        self.transferred = transferred;
        if !self.visibility.visible() {
            return;
        }
        let line = self.render();
        let mut err = stderr();
        let _ = write!(err, "\r{line}");
        let _ = err.flush();
        self.drew = true;
    }

    /// Terminate the progress line, if one was drawn.
    pub fn finish(&mut self) {
        if self.drew {
            let _ = writeln!(stderr());
            self.drew = false;
        }
    }

    fn render(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (self.transferred as f64 / elapsed) as u64
        } else {
            0
        };
        match self.total {
            Some(total) if total > 0 => {
                let percent = (self.transferred as f64 / total as f64 * 100.0).min(100.0);
                format!(
                    "{percent:>3.0}% {} / {} {}/s",
                    human_bytes(self.transferred),
                    human_bytes(total),
                    human_bytes(rate),
                )
            }
            _ => format!("{} {}/s", human_bytes(self.transferred), human_bytes(rate)),
        }
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
