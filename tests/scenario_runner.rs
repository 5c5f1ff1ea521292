//! Runner policy: outcomes, failure handling and evidence layout.

use pretty_assertions::assert_eq;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use viewer_probe::{
    Action, DomContract, Expectation, FailureKind, PageProbe, RunReport, Scenario, ScenarioRunner, ScenarioStatus,
    Selector, Session, Step, StubPage, Suite, Timing,
};

fn runner_with(page: StubPage, timing: Timing) -> (ScenarioRunner, TempDir) {
    let base = tempfile::tempdir().unwrap();
    let session = Session::in_base(base.path()).keep(true);
    let probe = PageProbe::new(Box::new(page.with_debounce(Duration::from_millis(20))), timing);
    let runner = ScenarioRunner::new(probe, DomContract::default(), session, "http://stub").unwrap();
    (runner, base)
}

fn runner(page: StubPage) -> (ScenarioRunner, TempDir) {
    runner_with(page, Timing::fast())
}

fn open() -> Step {
    Step::new("open", Action::Navigate { path: None })
}

fn missing() -> Selector {
    Selector::css("#does-not-exist")
}

#[test]
fn builtin_suite_passes_on_the_stub_viewer() {
    let (mut runner, _base) = runner(StubPage::sample());
    let report = runner.run_all(&Suite::builtin().scenarios).unwrap();

    for outcome in &report.outcomes {
        assert!(outcome.passed, "{} failed: {:?}", outcome.name, outcome.failure);
        assert_eq!(outcome.status, ScenarioStatus::Passed);
    }
    assert!(report.passed);
    assert_eq!(report.outcomes.len(), 7);
    assert_eq!(report.backend, "stub");
    assert!(report.aborted.is_none());
}

#[test]
fn report_and_outcomes_are_written() {
    let (mut runner, _base) = runner(StubPage::sample());
    let scenarios = Suite::builtin().select(&["zero_match_term".to_string()]).unwrap();
    let report = runner.run_all(&scenarios).unwrap();

    let dir = runner.session().dir.clone();
    assert!(dir.join(".session.json").exists());

    let written: RunReport = serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(written.run_id, report.run_id);
    assert!(written.passed);
    assert!(dir.join("zero_match_term").join("outcome.json").exists());
}

#[test]
fn failed_step_captures_evidence_with_deterministic_names() {
    let (mut runner, _base) = runner(StubPage::sample());
    let scenario = Scenario::new("broken", "")
        .step(open())
        .step(Step::new("wait for something missing", Action::WaitFor {
            target: missing(),
            timeout_ms: Some(20),
        }));
    let outcome = runner.run(&scenario);

    assert!(!outcome.passed);
    assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::ElementNotFound);

    let dir = runner.session().dir.join("broken");
    assert!(outcome.evidence.contains(&dir.join("step_01_failure.png")));
    assert!(outcome.evidence.contains(&dir.join("step_01_failure.json")));
    assert!(dir.join("step_01_failure.png").exists());
    assert!(dir.join("step_02_final.png").exists());
}

#[test]
fn failure_halts_unless_step_continues() {
    let (mut runner, _base) = runner(StubPage::sample());
    let halting = Scenario::new("halting", "")
        .step(open())
        .step(Step::new("expect missing", Action::Observe).expect(Expectation::Present(missing())))
        .step(Step::new("never runs", Action::Observe));
    let outcome = runner.run(&halting);
    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::ExpectationFailed);

    let continuing = Scenario::new("continuing", "")
        .step(open())
        .step(
            Step::new("expect missing", Action::Observe)
                .expect(Expectation::Present(missing()))
                .independent(),
        )
        .step(Step::new("still runs", Action::Observe));
    let outcome = runner.run(&continuing);
    assert_eq!(outcome.steps.len(), 3);
    assert!(outcome.steps[2].passed);
    assert!(!outcome.passed);
    assert_eq!(outcome.status, ScenarioStatus::Failed);
}

#[test]
fn invariant_violation_halts_even_when_step_continues() {
    let (mut runner, _base) = runner(StubPage::sample());
    let scenario = Scenario::new("invariant", "")
        .step(open())
        .step(Step::new("record", Action::RecordBaseline))
        .step(Step::new(
            "search",
            Action::SetTerm {
                term: "stroke".into(),
                expected_min_matches: 1,
            },
        ))
        .step(
            Step::new("count should be back at baseline", Action::Observe)
                .expect(Expectation::HighlightsAtBaseline)
                .independent(),
        )
        .step(Step::new("never runs", Action::Observe));
    let outcome = runner.run(&scenario);

    assert_eq!(outcome.steps.len(), 4);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::UnexpectedState);
}

#[test]
fn unreachable_application_aborts_the_run() {
    let (mut runner, _base) = runner(StubPage::sample().unreachable());
    let report = runner.run_all(&Suite::builtin().scenarios).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(!report.passed);
    assert!(report.aborted.as_deref().unwrap().contains("initial_state"));
    assert_eq!(
        report.outcomes[0].failure.as_ref().unwrap().kind,
        FailureKind::EnvironmentUnavailable
    );
}

#[test]
fn scenario_deadline_preserves_recorded_steps() {
    let timing = Timing::fast().with_scenario_timeout(Duration::from_millis(100));
    let (mut runner, _base) = runner_with(StubPage::sample(), timing);
    let scenario = Scenario::new("slow", "")
        .step(open())
        .step(
            Step::new("slow wait", Action::WaitFor {
                target: missing(),
                timeout_ms: Some(150),
            })
            .independent(),
        )
        .step(Step::new("too late", Action::Observe));
    let outcome = runner.run(&scenario);

    assert_eq!(outcome.steps.len(), 2);
    assert!(outcome.steps[0].passed);
    assert_eq!(outcome.status, ScenarioStatus::Failed);
    assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::ScenarioTimeout);
    assert!(runner.session().dir.join("slow").join("step_02_timeout.png").exists());
}

#[test]
fn overrun_in_the_last_step_fails_the_scenario() {
    // Debounce plus quiet window alone outlast the budget
    let timing = Timing::fast().with_scenario_timeout(Duration::from_millis(40));
    let (mut runner, _base) = runner_with(StubPage::sample(), timing);
    let scenario = Scenario::new("overrun", "").step(open()).step(Step::new(
        "search",
        Action::SetTerm {
            term: "cerebellar".into(),
            expected_min_matches: 1,
        },
    ));
    let outcome = runner.run(&scenario);

    assert_eq!(outcome.steps.len(), 2);
    assert!(outcome.steps.iter().all(|s| s.passed));
    assert!(!outcome.passed);
    assert_eq!(outcome.status, ScenarioStatus::Failed);
    assert_eq!(outcome.failure.as_ref().unwrap().kind, FailureKind::ScenarioTimeout);
    assert!(runner.session().dir.join("overrun").join("step_02_timeout.png").exists());
}

#[test]
fn timed_out_action_is_retried_once() {
    let (mut runner, _base) = runner(StubPage::sample().stall_clicks(1));
    let scenario = Scenario::new("retry", "")
        .step(open())
        .step(Step::new("next", Action::NextPage).expect(Expectation::PageChangedBy(1)));
    let outcome = runner.run(&scenario);
    assert!(outcome.passed, "{:?}", outcome.failure);
}

#[test]
fn action_timing_out_twice_fails_the_step() {
    let (mut runner, _base) = runner(StubPage::sample().stall_fills(2));
    let scenario = Scenario::new("stuck", "").step(open()).step(Step::new(
        "search",
        Action::SetTerm {
            term: "stroke".into(),
            expected_min_matches: 1,
        },
    ));
    let outcome = runner.run(&scenario);
    assert_eq!(outcome.failure.unwrap().kind, FailureKind::ActionTimeout);
}

#[test]
fn snapshot_action_records_labelled_evidence() {
    let (mut runner, _base) = runner(StubPage::sample());
    let scenario = Scenario::new("snap", "")
        .step(open())
        .step(Step::new("capture", Action::Snapshot { label: "initial view".into() }));
    let outcome = runner.run(&scenario);

    let json = runner.session().dir.join("snap").join("step_01_initial_view.json");
    assert!(outcome.evidence.contains(&json));
    let snapshot: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(snapshot["highlights"][0]["label"], "Study design");
    assert_eq!(snapshot["position"]["current"], 1);
}

#[test]
fn suite_file_scenarios_run() {
    let suite = Suite::from_toml_str(
        r#"
        [[scenarios]]
        name = "from_file"

        [[scenarios.steps]]
        description = "open"
        action = { navigate = {} }
        expect = { present = { text = "^Your Highlights$" } }

        [[scenarios.steps]]
        description = "search"
        action = { set_term = { term = "cerebellar", expected_min_matches = 1 } }
        expect = { highlights_increased_by = 3 }
        "#,
    )
    .unwrap();
    let (mut runner, _base) = runner(StubPage::sample());
    let report = runner.run_all(&suite.scenarios).unwrap();
    assert!(report.passed, "{:?}", report.outcomes[0].failure);
}
