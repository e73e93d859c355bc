//! Progress display utilities for CLI output
//!
//! Key features:
//! - A spinner that suspends cleanly when printing
//! - Consistent visual styling across commands
//! - Human-readable sizes and durations

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Styles
// ============================================================================

/// Get the spinner style for indexing and scanning
fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a section divider
pub fn print_divider() {
    println!();
    println!("{}", "─".repeat(60));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print an info message with bullet
pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

// ============================================================================
// Stage spinner
// ============================================================================

/// Spinner fed by `(stage, detail)` progress events from the engine
pub struct StageSpinner {
    spinner: ProgressBar,
    start_time: Instant,
    last_update: Mutex<Instant>,
    update_interval: Duration,
    events: Mutex<usize>,
}

impl StageSpinner {
    pub fn new(message: &str) -> Self {
        Self::with_bar(ProgressBar::new_spinner(), message)
    }

    /// Spinner that draws nothing, for `--json` runs
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden(), "")
    }

    fn with_bar(spinner: ProgressBar, message: &str) -> Self {
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(message.to_string());

        let now = Instant::now();
        Self {
            spinner,
            start_time: now,
            // Let the first event through immediately
            last_update: Mutex::new(now.checked_sub(Duration::from_secs(1)).unwrap_or(now)),
            update_interval: Duration::from_millis(150),
            events: Mutex::new(0),
        }
    }

    /// Record a progress event, redrawing at most every `update_interval`
    pub fn update(&self, stage: &str, detail: &str) {
        if let Ok(mut events) = self.events.lock() {
            *events += 1;
        }

        let now = Instant::now();
        let Ok(mut last) = self.last_update.lock() else {
            return;
        };
        if now.duration_since(*last) < self.update_interval {
            return;
        }
        *last = now;

        self.spinner.set_message(format!(
            "{}: {} ({:.0}s)",
            stage,
            detail,
            self.start_time.elapsed().as_secs_f64()
        ));
    }

    /// Print a line without tearing the spinner
    pub fn log(&self, msg: &str) {
        self.spinner.suspend(|| {
            println!("  {}", msg);
        });
    }

    /// Number of progress events received
    pub fn event_count(&self) -> usize {
        self.events.lock().map(|count| *count).unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finish the display with a summary
    pub fn finish(&self, msg: &str) {
        self.spinner.finish_with_message(format!(
            "✓ {} ({})",
            msg,
            format_duration(self.start_time.elapsed())
        ));
    }

    /// Finish with an error message
    pub fn finish_with_error(&self, msg: &str) {
        self.spinner.finish_with_message(format!("✗ {}", msg));
    }
}

// ============================================================================
// Utility functions
// ============================================================================

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// A writer that writes to both stderr and a log file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}
