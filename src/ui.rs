//! Terminal output helpers

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

pub fn success(message: &str) {
    println!("{} {}", Style::new().bold().green().apply_to("✓"), message);
}

pub fn warn(message: &str) {
    println!(
        "{} {}",
        Style::new().bold().yellow().apply_to("!"),
        Style::new().yellow().apply_to(message)
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        Style::new().bold().red().apply_to("✗"),
        Style::new().red().apply_to(message)
    );
}

pub fn heading(message: &str) {
    println!("{}", Style::new().bold().apply_to(message));
}

/// Non-blocking check for a keypress, waiting at most `timeout`. A terminal
/// that cannot be polled (no tty) degrades to a plain pause so watch loops
/// keep their pacing.
pub fn key_pressed(timeout: Duration) -> bool {
    match crossterm::event::poll(timeout) {
        Ok(true) => matches!(crossterm::event::read(), Ok(crossterm::event::Event::Key(_))),
        Ok(false) => false,
        Err(e) => {
            tracing::debug!(error = %e, "key poll unavailable");
            std::thread::sleep(timeout);
            false
        }
    }
}

/// Spinner for waits with no measurable progress (downloads, settle windows)
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
