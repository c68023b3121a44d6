//! Human-readable sizes, durations and the boot-wait countdown bar.
//!
//! Sizes and durations end up in run summaries and audit details.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Countdown bar of `total_secs` positions drawn on stderr, or a hidden
/// bar when progress output is off.
pub fn countdown_bar(total_secs: u64, width: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(Some(total_secs), ProgressDrawTarget::stderr());
    let template = format!("[{{bar:{}}}] {{percent:>3}}% {{msg}}", width.max(1));
    match ProgressStyle::with_template(&template) {
        Ok(style) => bar.set_style(style.progress_chars("## ")),
        Err(e) => tracing::debug!(error = %e, "Falling back to default progress style"),
    }
    bar
}
