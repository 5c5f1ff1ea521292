//! Page driver abstraction over a browser-automation capability.
//!
//! The harness only ever talks to a page through [`PageDriver`]:
//! - `ChromePage` drives a real Chromium over CDP
//! - `StubPage` simulates the viewer in-process for tests and dry runs

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use super::types::{DriverResult, ElementState, Selector};

/// Trait for page drivers
///
/// Actions (`fill`, `clear`, `click`) wait for a visible target up to their
/// timeout. `query` never waits for a match; it returns whatever matches
/// right now, hidden elements included, and `timeout` only bounds the read.
pub trait PageDriver: Send {
    /// Load a URL and wait for the document to finish loading
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Snapshot all elements matching the selector
    fn query(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<Vec<ElementState>>;

    /// Replace the value of a text input
    fn fill(&mut self, selector: &Selector, value: &str, timeout: Duration) -> DriverResult<()>;

    /// Empty a text input
    fn clear(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<()> {
        self.fill(selector, "", timeout)
    }

    /// Click the first visible match; clicking a disabled control is a no-op
    fn click(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<()>;

    /// Write a full-page PNG screenshot
    fn screenshot(&mut self, path: &Path) -> DriverResult<()>;

    /// Backend identifier (e.g., "chromium", "stub")
    fn backend_name(&self) -> &str;
}

/// Call `f` until it yields a value or `timeout` elapses.
///
/// `f` runs at least once. Sleeps are capped at the remaining budget.
pub fn poll_until<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        thread::sleep(interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_returns_first_value() {
        let mut calls = 0;
        let result = poll_until(Duration::from_millis(200), Duration::from_millis(1), || {
            calls += 1;
            (calls == 3).then_some(calls)
        });
        assert_eq!(result, Some(3));
    }

    #[test]
    fn test_poll_until_is_bounded() {
        let start = Instant::now();
        let result: Option<()> =
            poll_until(Duration::from_millis(30), Duration::from_millis(5), || None);
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_poll_until_zero_timeout_still_checks_once() {
        let result = poll_until(Duration::ZERO, Duration::from_millis(5), || Some(1));
        assert_eq!(result, Some(1));
    }
}
