//! Sequences steps into scenarios and scenarios into a run.
//!
//! Failure policy:
//! - a failed step captures evidence, then the scenario continues only when
//!   the step is marked `continues_on_failure`
//! - `UnexpectedState` always ends the scenario
//! - `EnvironmentUnavailable` ends the scenario and the whole run
//! - the scenario deadline is checked before every step and once more
//!   after the last one
//!
//! An outcome is produced for every scenario that starts, however it ends.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::types::{Action, Expectation, Failure, FailureKind, HarnessError, HarnessResult, Scenario, Step};
use crate::contract::DomContract;
use crate::highlights::{HighlightEntry, HighlightInspector, diff};
use crate::pager::{PagePosition, Pager};
use crate::probe::{PageProbe, ProbeResult};
use crate::runner::{RunReport, ScenarioOutcome, StepRecord};
use crate::search::SearchDriver;
use crate::session::Session;

/// Text evidence written next to each screenshot
#[derive(Debug, Serialize)]
struct PageSnapshot {
    captured_at: DateTime<Utc>,
    backend: String,
    search_term: Option<String>,
    indicator: ProbeResult,
    highlights: Vec<HighlightEntry>,
    position: Option<PagePosition>,
}

/// Observations carried between the steps of one scenario
#[derive(Debug, Default)]
struct ScenarioState {
    baseline: Option<Vec<HighlightEntry>>,
    recorded: Option<Vec<HighlightEntry>>,
    page_before: Option<PagePosition>,
    navigation_target: Option<u32>,
}

/// How the runner proceeds after a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    EndScenario,
}

pub struct ScenarioRunner {
    probe: PageProbe,
    contract: DomContract,
    session: Session,
    base_url: String,
    search: SearchDriver,
    inspector: HighlightInspector,
    pager: Pager,
    state: ScenarioState,
}

impl ScenarioRunner {
    pub fn new(
        probe: PageProbe,
        contract: DomContract,
        session: Session,
        base_url: impl Into<String>,
    ) -> HarnessResult<Self> {
        Ok(Self {
            search: SearchDriver::new(&contract)?,
            inspector: HighlightInspector::new(&contract)?,
            pager: Pager::new(&contract),
            probe,
            contract,
            session,
            base_url: base_url.into(),
            state: ScenarioState::default(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Run every scenario in order and write `report.json`.
    ///
    /// Stops early when the target application becomes unavailable.
    #[instrument(skip_all, fields(run_id = %self.session.id))]
    pub fn run_all(&mut self, scenarios: &[Scenario]) -> HarnessResult<RunReport> {
        self.session.init(&self.base_url, self.probe.backend_name())?;
        let started_at = Utc::now();
        info!(scenarios = scenarios.len(), base_url = %self.base_url, "run started");

        let mut outcomes = Vec::with_capacity(scenarios.len());
        let mut aborted = None;
        for scenario in scenarios {
            let outcome = self.run(scenario);
            let unavailable = outcome
                .failure
                .as_ref()
                .filter(|f| f.kind == FailureKind::EnvironmentUnavailable)
                .map(|f| f.message.clone());
            outcomes.push(outcome);
            if let Some(message) = unavailable {
                warn!(scenario = %scenario.name, "environment unavailable; aborting run");
                aborted = Some(format!("aborted in '{}': {}", scenario.name, message));
                break;
            }
        }

        let passed = aborted.is_none() && outcomes.iter().all(|o| o.passed);
        let report = RunReport {
            run_id: self.session.id.clone(),
            base_url: self.base_url.clone(),
            backend: self.probe.backend_name().to_string(),
            started_at,
            outcomes,
            passed,
            aborted,
        };
        self.session.write_json(&self.session.report_path(), &report)?;

        let (ok, failed) = report.summary();
        info!(passed = ok, failed, "run finished");
        Ok(report)
    }

    /// Run one scenario to an outcome
    #[instrument(skip_all, fields(scenario = %scenario.name))]
    pub fn run(&mut self, scenario: &Scenario) -> ScenarioOutcome {
        let started = Instant::now();
        let budget = scenario
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.probe.timing().scenario_timeout);
        let deadline = started + budget;

        self.state = ScenarioState::default();
        self.search.reset();

        let mut outcome = ScenarioOutcome::new(&scenario.name);
        if let Err(e) = outcome.start() {
            warn!(error = %e, "could not start scenario");
        }
        info!(steps = scenario.steps.len(), "scenario started");

        for (index, step) in scenario.steps.iter().enumerate() {
            if Instant::now() >= deadline {
                let detail = format!("before step {} ({})", index, step.description);
                self.expire(&scenario.name, index, budget, &detail, &mut outcome);
                break;
            }

            if self.run_step(&scenario.name, index, step, &mut outcome) == Flow::EndScenario {
                break;
            }
        }

        let final_index = outcome.steps.len();
        // The last step executed may itself have run past the deadline
        if !outcome.status.is_terminal() && Instant::now() >= deadline {
            self.expire(&scenario.name, final_index, budget, "by the last step", &mut outcome);
        }
        self.capture_evidence(&scenario.name, final_index, "final", &mut outcome);

        let elapsed = started.elapsed().as_millis() as u64;
        if let Err(e) = outcome.finish(elapsed) {
            warn!(error = %e, "could not finish scenario");
        }
        if let Err(e) = self
            .session
            .write_json(&self.session.outcome_path(&scenario.name), &outcome)
        {
            warn!(error = %e, "could not write outcome");
        }

        match &outcome.failure {
            None => info!(duration_ms = elapsed, "scenario passed"),
            Some(failure) => warn!(duration_ms = elapsed, %failure, "scenario failed"),
        }
        outcome
    }

    /// Record the timeout evidence and make `ScenarioTimeout` the reported failure
    fn expire(&mut self, scenario: &str, index: usize, budget: Duration, detail: &str, outcome: &mut ScenarioOutcome) {
        warn!(?budget, index, "scenario deadline exceeded");
        self.capture_evidence(scenario, index, "timeout", outcome);
        let failure = Failure::new(FailureKind::ScenarioTimeout, format!("exceeded {:?} {}", budget, detail));
        if let Err(e) = outcome.fail(failure) {
            warn!(error = %e, "could not record scenario timeout");
        }
    }

    fn run_step(&mut self, scenario: &str, index: usize, step: &Step, outcome: &mut ScenarioOutcome) -> Flow {
        debug!(index, description = %step.description, "running step");
        let (probe, result) = self.execute(scenario, index, step, outcome);

        let Err(err) = result else {
            outcome.record(StepRecord {
                index,
                description: step.description.clone(),
                probe,
                passed: true,
                failure: None,
            });
            return Flow::Continue;
        };

        let failure = err.to_failure();
        warn!(index, description = %step.description, %failure, "step failed");
        self.capture_evidence(scenario, index, "failure", outcome);
        outcome.record(StepRecord {
            index,
            description: step.description.clone(),
            probe,
            passed: false,
            failure: Some(failure.clone()),
        });

        match failure.kind {
            FailureKind::EnvironmentUnavailable | FailureKind::UnexpectedState => {
                if let Err(e) = outcome.fail(failure) {
                    warn!(error = %e, "could not mark scenario failed");
                }
                Flow::EndScenario
            }
            _ if step.continues_on_failure => Flow::Continue,
            _ => Flow::EndScenario,
        }
    }

    /// Perform the action, then check the expectation
    fn execute(
        &mut self,
        scenario: &str,
        index: usize,
        step: &Step,
        outcome: &mut ScenarioOutcome,
    ) -> (ProbeResult, HarnessResult<()>) {
        let mut probe = ProbeResult::absent();
        match self.perform(scenario, index, &step.action, outcome) {
            Ok(Some(observed)) => probe = observed,
            Ok(None) => {}
            Err(e) => return (probe, Err(e)),
        }
        let (observed, checked) = self.check(&step.expect);
        (observed.unwrap_or(probe), checked)
    }

    fn perform(
        &mut self,
        scenario: &str,
        index: usize,
        action: &Action,
        outcome: &mut ScenarioOutcome,
    ) -> HarnessResult<Option<ProbeResult>> {
        match action {
            Action::Navigate { path } => {
                let url = join_url(&self.base_url, path.as_deref());
                self.probe.navigate(&url)?;
                let shell = self.probe.locate(&self.contract.app_shell);
                if !shell.found() {
                    return Err(HarnessError::EnvironmentUnavailable(format!(
                        "{} loaded but {} never rendered",
                        url, self.contract.app_shell
                    )));
                }
                // A reload starts from the application's initial state
                self.search.reset();
                self.state.baseline = None;
                self.state.navigation_target = None;
                Ok(Some(shell))
            }
            Action::WaitFor { target, timeout_ms } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.probe.timing().element_timeout);
                let found = self.probe.locate_within(target, timeout);
                if !found.found() {
                    return Err(HarnessError::ElementNotFound(format!(
                        "{} not present after {:?}",
                        target, timeout
                    )));
                }
                Ok(Some(found))
            }
            Action::RecordBaseline => {
                self.state.baseline = Some(self.inspector.list_highlights(&mut self.probe));
                Ok(Some(self.probe.peek(&self.contract.highlight_rows)))
            }
            Action::SetTerm {
                term,
                expected_min_matches,
            } => {
                if self.state.baseline.is_none() {
                    self.state.baseline = Some(self.inspector.list_highlights(&mut self.probe));
                }
                let indicator = self.search.set_term(&mut self.probe, term, *expected_min_matches)?;
                Ok(Some(indicator))
            }
            Action::ClearTerm => Ok(Some(self.search.clear(&mut self.probe)?)),
            Action::Click { target } => {
                self.probe.click(target)?;
                Ok(None)
            }
            Action::NextPage => {
                self.state.page_before = self.pager.position(&mut self.probe);
                self.pager.next(&mut self.probe)?;
                Ok(None)
            }
            Action::PreviousPage => {
                self.state.page_before = self.pager.position(&mut self.probe);
                self.pager.previous(&mut self.probe)?;
                Ok(None)
            }
            Action::GoToHighlight { label_prefix } => {
                let entries = self.inspector.list_highlights(&mut self.probe);
                let entry = entries
                    .iter()
                    .find(|e| e.has_action && e.has_prefix(label_prefix))
                    .ok_or_else(|| {
                        HarnessError::ElementNotFound(format!(
                            "no highlight labelled '{}...' with a navigation action",
                            label_prefix
                        ))
                    })?;
                self.state.page_before = self.pager.position(&mut self.probe);
                let target = self.pager.go_to_highlight(&mut self.probe, entry)?;
                self.state.navigation_target = Some(target);
                Ok(None)
            }
            Action::RecordHighlights => {
                self.state.recorded = Some(self.inspector.list_highlights(&mut self.probe));
                Ok(Some(self.probe.peek(&self.contract.highlight_rows)))
            }
            Action::Snapshot { label } => {
                self.capture_evidence(scenario, index, label, outcome);
                Ok(None)
            }
            Action::Observe => Ok(None),
        }
    }

    fn check(&mut self, expect: &Expectation) -> (Option<ProbeResult>, HarnessResult<()>) {
        let element_timeout = self.probe.timing().element_timeout;
        match expect {
            Expectation::None => (None, Ok(())),
            Expectation::Present(target) => {
                let found = self.probe.locate(target);
                let ok = found.found();
                (Some(found), ensure(ok, || format!("{} is not present", target)))
            }
            Expectation::Absent(target) => {
                let gone = self.probe.wait_for(|p| !p.peek(target).found(), element_timeout);
                let seen = self.probe.peek(target);
                (Some(seen), ensure(gone, || format!("{} is still present", target)))
            }
            Expectation::TextMatches { target, pattern } => {
                let re = match Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => return (None, Err(e.into())),
                };
                let found = self.probe.locate(target);
                let ok = found.text().is_some_and(|t| re.is_match(t));
                let message = format!("{} text {:?} does not match /{}/", target, found.text(), pattern);
                (Some(found), ensure(ok, || message))
            }
            Expectation::MatchesFound { min } => {
                let indicator = self.probe.peek(&self.contract.result_indicator);
                let count = self.search.parse_count(&indicator);
                let ok = indicator.found() && count >= *min;
                (
                    Some(indicator),
                    ensure(ok, || format!("expected at least {} matches, indicator shows {}", min, count)),
                )
            }
            Expectation::NoMatches => {
                let indicator = self.probe.peek(&self.contract.result_indicator);
                let ok = !indicator.found();
                let message = format!("indicator unexpectedly shows {:?}", indicator.text());
                (Some(indicator), ensure(ok, || message))
            }
            Expectation::HighlightsIncreasedBy(n) => self.check_increase(*n),
            Expectation::HighlightsIncreasedByMatches => {
                let n = self.search.session().map(|s| s.observed_matches).unwrap_or(0);
                self.check_increase(n)
            }
            Expectation::HighlightsAtBaseline => {
                let rows = self.probe.peek(&self.contract.highlight_rows);
                let result = self.baseline().and_then(|baseline| {
                    let now = self.inspector.count_highlights(&mut self.probe);
                    if now == baseline.len() {
                        Ok(())
                    } else {
                        Err(HarnessError::UnexpectedState(format!(
                            "highlight count {} differs from baseline {}",
                            now,
                            baseline.len()
                        )))
                    }
                });
                (Some(rows), result)
            }
            Expectation::NewHighlightsPrefixed(prefix) => {
                let rows = self.probe.peek(&self.contract.highlight_rows);
                let result = self.baseline().and_then(|baseline| {
                    let current = self.inspector.list_highlights(&mut self.probe);
                    let d = diff(&baseline, &current);
                    let stray: Vec<_> = d.added().iter().filter(|e| !e.has_prefix(prefix)).collect();
                    ensure(stray.is_empty(), || {
                        format!("{} new highlight(s) lack the '{}' prefix: {:?}", stray.len(), prefix, stray)
                    })
                });
                (Some(rows), result)
            }
            Expectation::HighlightsMatchRecorded => {
                let rows = self.probe.peek(&self.contract.highlight_rows);
                let Some(recorded) = self.state.recorded.clone() else {
                    return (
                        Some(rows),
                        Err(HarnessError::Config("no highlights were recorded before this step".into())),
                    );
                };
                let current = self.inspector.list_highlights(&mut self.probe);
                let result = if current == recorded {
                    Ok(())
                } else {
                    let d = diff(&recorded, &current);
                    Err(HarnessError::UnexpectedState(format!(
                        "highlights differ from the recorded list: {} added, {} removed",
                        d.added().len(),
                        d.removed().len()
                    )))
                };
                (Some(rows), result)
            }
            Expectation::PageAtNavigationTarget => {
                let Some(target) = self.state.navigation_target else {
                    return (
                        None,
                        Err(HarnessError::Config("no highlight navigation before this step".into())),
                    );
                };
                self.check_page(target, element_timeout)
            }
            Expectation::PageChangedBy(delta) => {
                let Some(before) = self.state.page_before else {
                    return (
                        None,
                        Err(HarnessError::ElementNotFound("page indicator was not rendered".into())),
                    );
                };
                self.check_page(before.offset(*delta), element_timeout)
            }
        }
    }

    fn baseline(&self) -> HarnessResult<Vec<HighlightEntry>> {
        self.state
            .baseline
            .clone()
            .ok_or_else(|| HarnessError::Config("no highlight baseline recorded before this step".into()))
    }

    fn check_increase(&mut self, expected: usize) -> (Option<ProbeResult>, HarnessResult<()>) {
        let rows = self.probe.peek(&self.contract.highlight_rows);
        let result = self.baseline().and_then(|baseline| {
            let current = self.inspector.list_highlights(&mut self.probe);
            let d = diff(&baseline, &current);
            ensure(d.count_delta() == expected as i64 && d.removed().is_empty(), || {
                format!(
                    "expected {} new highlight(s), found {} added and {} removed ({} -> {})",
                    expected,
                    d.added().len(),
                    d.removed().len(),
                    d.before,
                    d.after
                )
            })
        });
        (Some(rows), result)
    }

    fn check_page(&mut self, expected: u32, timeout: Duration) -> (Option<ProbeResult>, HarnessResult<()>) {
        let position = self.pager.wait_for_page(&mut self.probe, expected, timeout);
        let indicator = self.probe.peek(&self.contract.page_input);
        let result = match position {
            Some(pos) if pos.current == expected => Ok(()),
            Some(pos) => Err(HarnessError::ExpectationFailed(format!(
                "expected page {}, indicator shows {}",
                expected, pos
            ))),
            None => Err(HarnessError::ElementNotFound(format!(
                "page indicator {} not rendered",
                self.contract.page_input
            ))),
        };
        (Some(indicator), result)
    }

    /// Screenshot plus JSON page snapshot; failures are logged, never raised
    fn capture_evidence(&mut self, scenario: &str, index: usize, tag: &str, outcome: &mut ScenarioOutcome) {
        let png = self.session.evidence_path(scenario, index, tag, "png");
        match self.probe.screenshot(&png) {
            Ok(()) => outcome.add_evidence(png),
            Err(e) => warn!(error = %e, path = %png.display(), "screenshot failed"),
        }

        let snapshot = PageSnapshot {
            captured_at: Utc::now(),
            backend: self.probe.backend_name().to_string(),
            search_term: self.search.session().map(|s| s.term.clone()),
            indicator: self.probe.peek(&self.contract.result_indicator),
            highlights: self.inspector.list_highlights(&mut self.probe),
            position: self.pager.position(&mut self.probe),
        };
        let json = self.session.evidence_path(scenario, index, tag, "json");
        match self.session.write_json(&json, &snapshot) {
            Ok(()) => outcome.add_evidence(json),
            Err(e) => warn!(error = %e, path = %json.display(), "snapshot failed"),
        }
    }
}

fn ensure(ok: bool, message: impl FnOnce() -> String) -> HarnessResult<()> {
    if ok {
        Ok(())
    } else {
        Err(HarnessError::ExpectationFailed(message()))
    }
}

/// Base URL joined with an optional path, with exactly one slash between
fn join_url(base: &str, path: Option<&str>) -> String {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        None => base.to_string(),
        Some(path) => format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://localhost:5173", None), "http://localhost:5173");
        assert_eq!(join_url("http://localhost:5173/", Some("/viewer")), "http://localhost:5173/viewer");
        assert_eq!(join_url("http://localhost:5173", Some("  ")), "http://localhost:5173");
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, || unreachable!()).is_ok());
        let err = ensure(false, || "nope".to_string()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ExpectationFailed);
    }
}
