//! Drives the viewer's search box and waits for debounced results to settle.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::contract::DomContract;
use crate::harness::HarnessResult;
use crate::probe::{PageProbe, ProbeResult};

/// The term currently typed into the search box
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSession {
    pub term: String,
    pub expected_min_matches: usize,
    /// Match count parsed from the result indicator after settling
    pub observed_matches: usize,
}

/// What must stop changing before search results count as settled
#[derive(Debug, Clone, PartialEq, Eq)]
struct SettleSignal {
    indicator: ProbeResult,
    highlights: usize,
}

pub struct SearchDriver {
    contract: DomContract,
    count_pattern: Regex,
    session: Option<SearchSession>,
}

impl SearchDriver {
    pub fn new(contract: &DomContract) -> HarnessResult<Self> {
        Ok(Self {
            contract: contract.clone(),
            count_pattern: Regex::new(&contract.result_count_pattern)?,
            session: None,
        })
    }

    /// Type `term` and wait until the results settle.
    ///
    /// Returns the result indicator as last observed; a term with no matches
    /// settles to an absent indicator. `expected_min_matches` is recorded but
    /// does not hold up settling; expectations on the step judge the count.
    pub fn set_term(
        &mut self,
        probe: &mut PageProbe,
        term: &str,
        expected_min_matches: usize,
    ) -> HarnessResult<ProbeResult> {
        info!(term, expected_min_matches, "setting search term");
        probe.fill(&self.contract.search_input, term)?;

        let indicator = self.settle(probe, |_| true);
        let observed = self.parse_count(&indicator);
        if observed < expected_min_matches {
            info!(term, observed, expected_min_matches, "fewer matches than expected");
        }
        debug!(term, observed, "search settled");

        self.session = Some(SearchSession {
            term: term.to_string(),
            expected_min_matches,
            observed_matches: observed,
        });
        Ok(indicator)
    }

    /// Empty the search box and wait for the indicator to go away
    pub fn clear(&mut self, probe: &mut PageProbe) -> HarnessResult<ProbeResult> {
        info!("clearing search term");
        probe.clear(&self.contract.search_input)?;
        let indicator = self.settle(probe, |signal| !signal.indicator.found());
        self.session = None;
        Ok(indicator)
    }

    pub fn session(&self) -> Option<&SearchSession> {
        self.session.as_ref()
    }

    /// Forget the current term (scenario boundary)
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// N from a "Found N matches" indicator; 0 when absent or unparseable
    pub fn parse_count(&self, indicator: &ProbeResult) -> usize {
        indicator
            .text()
            .and_then(|text| self.count_pattern.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    }

    /// Poll until the signal is accepted and unchanged for the quiet window.
    ///
    /// Gives up at the settle timeout and returns the last indicator seen.
    fn settle(&self, probe: &mut PageProbe, accept: impl Fn(&SettleSignal) -> bool) -> ProbeResult {
        let timing = *probe.timing();
        let mut last: Option<SettleSignal> = None;
        let mut stable_since = Instant::now();

        let settled = probe.wait_for(
            |p| {
                let signal = SettleSignal {
                    indicator: p.peek(&self.contract.result_indicator),
                    highlights: p.elements(&self.contract.highlight_rows).len(),
                };
                if last.as_ref() != Some(&signal) {
                    last = Some(signal);
                    stable_since = Instant::now();
                    return false;
                }
                last.as_ref().is_some_and(|s| accept(s)) && stable_since.elapsed() >= timing.quiet_window
            },
            timing.settle_timeout,
        );

        if !settled {
            warn!(timeout = ?timing.settle_timeout, "search results did not settle; using last observation");
        }
        last.map(|s| s.indicator).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::driver::StubPage;
    use std::time::Duration;

    fn setup() -> (PageProbe, SearchDriver) {
        let page = StubPage::sample().with_debounce(Duration::from_millis(20));
        let mut probe = PageProbe::new(Box::new(page), Timing::fast());
        probe.navigate("http://stub/").unwrap();
        (probe, SearchDriver::new(&DomContract::default()).unwrap())
    }

    #[test]
    fn test_set_term_waits_past_debounce() {
        let (mut probe, mut search) = setup();
        let indicator = search.set_term(&mut probe, "cerebellar", 1).unwrap();
        assert!(indicator.found());
        assert_eq!(indicator.text(), Some("Found 3 matches"));

        let session = search.session().unwrap();
        assert_eq!(session.term, "cerebellar");
        assert_eq!(session.observed_matches, 3);
    }

    #[test]
    fn test_zero_match_term_settles_absent() {
        let (mut probe, mut search) = setup();
        let indicator = search.set_term(&mut probe, "zzzznotfound", 0).unwrap();
        assert_eq!(indicator, ProbeResult::absent());
        assert_eq!(search.session().unwrap().observed_matches, 0);
    }

    #[test]
    fn test_unmatched_term_settles_within_quiet_window() {
        let (mut probe, mut search) = setup();
        let started = Instant::now();
        let indicator = search.set_term(&mut probe, "zzzznotfound", 1).unwrap();

        assert!(!indicator.found());
        assert!(started.elapsed() < probe.timing().settle_timeout / 2, "took {:?}", started.elapsed());
        let session = search.session().unwrap();
        assert_eq!((session.expected_min_matches, session.observed_matches), (1, 0));
    }

    #[test]
    fn test_clear_removes_indicator() {
        let (mut probe, mut search) = setup();
        search.set_term(&mut probe, "stroke", 1).unwrap();
        let indicator = search.clear(&mut probe).unwrap();
        assert!(!indicator.found());
        assert!(search.session().is_none());
    }

    #[test]
    fn test_parse_count() {
        let search = SearchDriver::new(&DomContract::default()).unwrap();
        assert_eq!(search.parse_count(&ProbeResult::present(Some("Found 1 match".into()), 1)), 1);
        assert_eq!(search.parse_count(&ProbeResult::present(Some("found 12 matches".into()), 1)), 12);
        assert_eq!(search.parse_count(&ProbeResult::absent()), 0);
    }

    #[test]
    fn test_invalid_count_pattern_is_config_error() {
        let contract = DomContract {
            result_count_pattern: "(".into(),
            ..DomContract::default()
        };
        assert!(SearchDriver::new(&contract).is_err());
    }
}
