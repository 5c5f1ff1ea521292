//! Non-raising element lookup.
//!
//! Absence is an expected outcome here: `locate` and friends report it as
//! [`ProbeResult::absent`] rather than an error. Only actions (`fill`,
//! `click`, `navigate`) return errors, already mapped onto the harness
//! taxonomy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::Timing;
use crate::driver::{DriverError, DriverResult, ElementState, PageDriver, Selector, poll_until};
use crate::harness::{HarnessError, HarnessResult};

/// Presence, text and count of the visible matches of a selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProbe")]
pub struct ProbeResult {
    found: bool,
    text: Option<String>,
    count: usize,
}

#[derive(Deserialize)]
struct RawProbe {
    found: bool,
    text: Option<String>,
    count: usize,
}

impl From<RawProbe> for ProbeResult {
    fn from(raw: RawProbe) -> Self {
        if raw.found {
            ProbeResult::present(raw.text, raw.count)
        } else {
            ProbeResult::absent()
        }
    }
}

impl ProbeResult {
    pub fn absent() -> Self {
        Self::default()
    }

    /// A zero count collapses to absent
    pub fn present(text: Option<String>, count: usize) -> Self {
        if count == 0 {
            return Self::absent();
        }
        Self {
            found: true,
            text,
            count,
        }
    }

    /// Summarize the visible elements of a query
    pub fn from_elements(elements: &[ElementState]) -> Self {
        let mut visible = elements.iter().filter(|el| el.visible);
        let Some(first) = visible.next() else {
            return Self::absent();
        };
        let text = Some(first.display_text().to_string()).filter(|t| !t.is_empty());
        Self::present(text, 1 + visible.count())
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Owns the page driver and answers questions about the rendered page
pub struct PageProbe {
    driver: Box<dyn PageDriver>,
    timing: Timing,
}

impl PageProbe {
    pub fn new(driver: Box<dyn PageDriver>, timing: Timing) -> Self {
        Self { driver, timing }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn backend_name(&self) -> &str {
        self.driver.backend_name()
    }

    /// Wait up to the element timeout for a visible match
    pub fn locate(&mut self, selector: &Selector) -> ProbeResult {
        self.locate_within(selector, self.timing.element_timeout)
    }

    /// Like [`locate`](Self::locate) with an explicit wait.
    ///
    /// Each read gets the remaining budget, so a slow backend cannot hold
    /// the caller much past `timeout`.
    pub fn locate_within(&mut self, selector: &Selector, timeout: Duration) -> ProbeResult {
        let interval = self.timing.poll_interval;
        let deadline = Instant::now() + timeout;
        let driver = &mut self.driver;
        poll_until(timeout, interval, || {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let elements = query_or_empty(driver.as_mut(), selector, remaining.max(interval));
            let result = ProbeResult::from_elements(&elements);
            result.found().then_some(result)
        })
        .unwrap_or_else(|| {
            debug!(%selector, ?timeout, "probe found nothing");
            ProbeResult::absent()
        })
    }

    /// Single read without waiting
    pub fn peek(&mut self, selector: &Selector) -> ProbeResult {
        ProbeResult::from_elements(&self.elements(selector))
    }

    /// Visible matches right now; driver errors read as no matches.
    ///
    /// The read is bounded by the action timeout.
    pub fn elements(&mut self, selector: &Selector) -> Vec<ElementState> {
        let timeout = self.timing.action_timeout;
        query_or_empty(self.driver.as_mut(), selector, timeout)
            .into_iter()
            .filter(|el| el.visible)
            .collect()
    }

    /// Poll `condition` until it holds or `timeout` elapses
    pub fn wait_for(&mut self, mut condition: impl FnMut(&mut PageProbe) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.timing.poll_interval.min(deadline - now));
        }
    }

    /// True once `selector` has a visible match within `timeout`
    pub fn wait_for_present(&mut self, selector: &Selector, timeout: Duration) -> bool {
        self.locate_within(selector, timeout).found()
    }

    pub fn navigate(&mut self, url: &str) -> HarnessResult<()> {
        let timeout = self.timing.element_timeout;
        self.driver.navigate(url, timeout).map_err(|e| match e {
            DriverError::Unavailable(msg) => HarnessError::EnvironmentUnavailable(msg),
            DriverError::Timeout { .. } => {
                HarnessError::EnvironmentUnavailable(format!("{} did not load: {}", url, e))
            }
            other => other.into(),
        })
    }

    pub fn fill(&mut self, selector: &Selector, value: &str) -> HarnessResult<()> {
        let timeout = self.timing.action_timeout;
        self.act(&format!("fill {}", selector), |driver| driver.fill(selector, value, timeout))
    }

    pub fn clear(&mut self, selector: &Selector) -> HarnessResult<()> {
        let timeout = self.timing.action_timeout;
        self.act(&format!("clear {}", selector), |driver| driver.clear(selector, timeout))
    }

    pub fn click(&mut self, selector: &Selector) -> HarnessResult<()> {
        let timeout = self.timing.action_timeout;
        self.act(&format!("click {}", selector), |driver| driver.click(selector, timeout))
    }

    pub fn screenshot(&mut self, path: &Path) -> HarnessResult<()> {
        Ok(self.driver.screenshot(path)?)
    }

    /// Run an action, retrying once after a backoff when it times out
    fn act(
        &mut self,
        label: &str,
        mut f: impl FnMut(&mut dyn PageDriver) -> DriverResult<()>,
    ) -> HarnessResult<()> {
        match f(self.driver.as_mut()) {
            Err(DriverError::Timeout { .. }) => {
                warn!(action = label, backoff = ?self.timing.retry_backoff, "action timed out; retrying once");
                thread::sleep(self.timing.retry_backoff);
                match f(self.driver.as_mut()) {
                    Err(DriverError::Timeout { .. }) => Err(HarnessError::ActionTimeout {
                        action: label.to_string(),
                        attempts: 2,
                    }),
                    other => Ok(other?),
                }
            }
            other => Ok(other?),
        }
    }
}

fn query_or_empty(driver: &mut dyn PageDriver, selector: &Selector, timeout: Duration) -> Vec<ElementState> {
    driver.query(selector, timeout).unwrap_or_else(|e| {
        debug!(%selector, error = %e, "query failed; treating as absent");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DomContract;
    use crate::driver::StubPage;
    use std::sync::{Arc, Mutex};

    /// Never matches anything; remembers the budget of every read
    struct BudgetRecorder {
        budgets: Arc<Mutex<Vec<Duration>>>,
    }

    impl PageDriver for BudgetRecorder {
        fn navigate(&mut self, _url: &str, _timeout: Duration) -> DriverResult<()> {
            Ok(())
        }

        fn query(&mut self, _selector: &Selector, timeout: Duration) -> DriverResult<Vec<ElementState>> {
            self.budgets.lock().unwrap().push(timeout);
            Ok(Vec::new())
        }

        fn fill(&mut self, _selector: &Selector, _value: &str, _timeout: Duration) -> DriverResult<()> {
            Ok(())
        }

        fn click(&mut self, _selector: &Selector, _timeout: Duration) -> DriverResult<()> {
            Ok(())
        }

        fn screenshot(&mut self, _path: &Path) -> DriverResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &str {
            "recorder"
        }
    }

    fn probe(page: StubPage) -> PageProbe {
        let mut probe = PageProbe::new(Box::new(page.with_debounce(Duration::ZERO)), Timing::fast());
        probe.navigate("http://stub/").unwrap();
        probe
    }

    #[test]
    fn test_absent_invariant() {
        let absent = ProbeResult::absent();
        assert!(!absent.found());
        assert_eq!(absent.text(), None);
        assert_eq!(absent.count(), 0);
        assert_eq!(ProbeResult::present(Some("x".into()), 0), absent);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let result: ProbeResult =
            serde_json::from_str(r#"{"found": false, "text": "stale", "count": 4}"#).unwrap();
        assert_eq!(result, ProbeResult::absent());
    }

    #[test]
    fn test_from_elements_ignores_hidden() {
        let hidden = ElementState {
            text: "hidden".into(),
            ..Default::default()
        };
        let shown = ElementState {
            text: "shown".into(),
            visible: true,
            ..Default::default()
        };
        let result = ProbeResult::from_elements(&[hidden.clone(), shown]);
        assert_eq!(result.text(), Some("shown"));
        assert_eq!(result.count(), 1);
        assert!(!ProbeResult::from_elements(&[hidden]).found());
    }

    #[test]
    fn test_locate_missing_is_absent_not_error() {
        let mut probe = probe(StubPage::sample());
        let started = Instant::now();
        let result = probe.locate_within(&Selector::css("#nope"), Duration::from_millis(20));
        assert!(!result.found());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_locate_heading() {
        let mut probe = probe(StubPage::sample());
        let contract = DomContract::default();
        let heading = probe.locate(&contract.highlights_heading);
        assert!(heading.found());
        assert_eq!(heading.text(), Some("Your Highlights"));
    }

    #[test]
    fn test_click_retries_once() {
        let mut probe = probe(StubPage::sample().stall_clicks(1));
        probe.click(&DomContract::default().next_page).unwrap();
    }

    #[test]
    fn test_click_gives_up_after_second_timeout() {
        let mut probe = probe(StubPage::sample().stall_clicks(2));
        let err = probe.click(&DomContract::default().next_page).unwrap_err();
        assert!(matches!(err, HarnessError::ActionTimeout { attempts: 2, .. }));
    }

    #[test]
    fn test_navigate_unreachable() {
        let mut probe = PageProbe::new(Box::new(StubPage::sample().unreachable()), Timing::fast());
        let err = probe.navigate("http://stub/").unwrap_err();
        assert!(matches!(err, HarnessError::EnvironmentUnavailable(_)));
    }

    #[test]
    fn test_wait_for_times_out() {
        let mut probe = probe(StubPage::sample());
        assert!(!probe.wait_for(|_| false, Duration::from_millis(15)));
        assert!(probe.wait_for(|p| p.peek(&Selector::css("aside")).found(), Duration::ZERO));
    }

    #[test]
    fn test_reads_never_exceed_the_wait_budget() {
        let budgets = Arc::new(Mutex::new(Vec::new()));
        let recorder = BudgetRecorder {
            budgets: Arc::clone(&budgets),
        };
        let mut probe = PageProbe::new(Box::new(recorder), Timing::fast());

        assert!(!probe.locate_within(&Selector::css("aside"), Duration::from_millis(20)).found());
        let seen = budgets.lock().unwrap().clone();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|b| *b <= Duration::from_millis(20)), "{:?}", seen);

        probe.peek(&Selector::css("aside"));
        assert_eq!(budgets.lock().unwrap().last(), Some(&Timing::fast().action_timeout));
    }

    #[test]
    fn test_wait_for_present() {
        let mut probe = probe(StubPage::sample());
        let contract = DomContract::default();
        assert!(probe.wait_for_present(&contract.highlights_heading, Duration::from_millis(50)));
        assert!(!probe.wait_for_present(&Selector::css("#nope"), Duration::from_millis(20)));
    }
}
