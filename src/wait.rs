//! Bounded settle polling
//!
//! Devices need time to reboot and re-enumerate after a mode transition.
//! Instead of a blind sleep, the caller polls a readiness predicate at a
//! short interval up to the settle window, returning early on success while
//! still waiting out the full window when the device never shows up.

use std::time::{Duration, Instant};

/// Poll `ready` every `interval` until it returns true or `window` elapses.
/// Returns whether the predicate turned true within the window.
pub fn poll_until(window: Duration, interval: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + window;
    loop {
        if ready() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(interval.min(remaining));
    }
}
