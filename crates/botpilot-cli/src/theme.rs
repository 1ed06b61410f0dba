//! Terminal colour helpers.
//!
//! Respects the `NO_COLOR` env-var and the `--no-color` CLI flag.

use botpilot_core::tasks::{TaskEvent, TaskIcon, format_event};
use colored::Colorize;

/// Disable colour if asked to on the command line or through `NO_COLOR`.
pub fn init_color(no_color_flag: bool) {
    if no_color_flag
        || std::env::var("NO_COLOR")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    {
        colored::control::set_override(false);
    }
}

pub fn success(text: &str) -> String {
    text.green().to_string()
}

pub fn warn(text: &str) -> String {
    text.yellow().to_string()
}

pub fn error(text: &str) -> String {
    text.red().bold().to_string()
}

pub fn muted(text: &str) -> String {
    text.bright_black().to_string()
}

pub fn accent(text: &str) -> String {
    text.cyan().bold().to_string()
}

/// `[  1.250s] ⏸️ task:pause collectBlocks`, coloured by event kind.
pub fn event_line(elapsed_ms: u128, event: &TaskEvent) -> String {
    let stamp = muted(&format!("[{:>4}.{:03}s]", elapsed_ms / 1000, elapsed_ms % 1000));
    let line = format_event(event);
    let line = match TaskIcon::from_event(event) {
        TaskIcon::Ended => success(&line),
        TaskIcon::Paused | TaskIcon::TimedOut => warn(&line),
        TaskIcon::Failed | TaskIcon::Interrupted => error(&line),
        TaskIcon::Idle => muted(&line),
        TaskIcon::Started | TaskIcon::Resumed => accent(&line),
    };
    format!("{} {}", stamp, line)
}
