//! Progress bar and logging utilities.
//!
//! One bar tracks finished genres. In log-only mode bars are hidden and each
//! finished genre is reported as a single tail-friendly line on stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::models::GenreReport;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Hide bars for the rest of the process; set once from `--log-only`.
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time for the run summary. Rate-limit waits can stretch a
/// multi-genre run into hours.
pub fn format_duration(d: Duration) -> String {
    match d.as_secs_f64() {
        secs if secs < 60.0 => format!("{:.1}s", secs),
        secs if secs < 3600.0 => format!("{:.1}m", secs / 60.0),
        secs => format!("{:.1}h", secs / 3600.0),
    }
}

/// Bar over the genres of a run. Hidden in log-only mode.
pub fn create_genre_bar(genres: usize) -> ProgressBar {
    let pb = ProgressBar::new(genres as u64);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} genres")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(200));
    }
    pb.set_message("Harvesting");
    pb
}

/// One-line summary of a finished genre.
pub fn genre_line(report: &GenreReport) -> String {
    format!(
        "{}: {} new, {}/{} stored, {}/{} attempts ({})",
        report.genre,
        report.newly_persisted,
        report.persisted_after(),
        report.quota,
        report.attempts_used,
        report.attempts_available,
        report.outcome.as_str()
    )
}

/// Report a finished genre on the bar, or on stderr in log-only mode.
pub fn genre_finished(pb: &ProgressBar, done: u64, total: u64, line: &str) {
    if is_log_only() {
        eprintln!("[HARVEST] {}/{} {}", done, total, line);
    } else {
        pb.println(line);
    }
    pb.inc(1);
}
