//! Types for scenario and run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::harness::{Failure, HarnessError, HarnessResult};
use crate::probe::ProbeResult;

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step index within the scenario (0-based)
    pub index: usize,

    pub description: String,

    /// Last probe taken while performing or checking the step
    pub probe: ProbeResult,

    pub passed: bool,

    pub failure: Option<Failure>,
}

/// Lifecycle of a scenario outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl ScenarioStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioStatus::Passed | ScenarioStatus::Failed)
    }

    fn can_transition_to(self, next: ScenarioStatus) -> bool {
        matches!(
            (self, next),
            (ScenarioStatus::Pending, ScenarioStatus::Running)
                | (ScenarioStatus::Running, ScenarioStatus::Passed)
                | (ScenarioStatus::Running, ScenarioStatus::Failed)
                | (ScenarioStatus::Pending, ScenarioStatus::Failed)
        )
    }
}

/// Result of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,

    pub status: ScenarioStatus,

    /// Steps executed so far, in order
    pub steps: Vec<StepRecord>,

    pub passed: bool,

    /// Screenshots and text snapshots captured for this scenario
    pub evidence: Vec<PathBuf>,

    /// Failure that decided the scenario
    pub failure: Option<Failure>,

    pub duration_ms: u64,
}

impl ScenarioOutcome {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ScenarioStatus::Pending,
            steps: Vec::new(),
            passed: false,
            evidence: Vec::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    fn transition(&mut self, next: ScenarioStatus) -> HarnessResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(HarnessError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> HarnessResult<()> {
        self.transition(ScenarioStatus::Running)
    }

    pub fn record(&mut self, step: StepRecord) {
        if !step.passed && self.failure.is_none() {
            self.failure = step.failure.clone();
        }
        self.steps.push(step);
    }

    pub fn add_evidence(&mut self, path: PathBuf) {
        self.evidence.push(path);
    }

    /// Mark failed; `failure` becomes the scenario's reported reason
    pub fn fail(&mut self, failure: Failure) -> HarnessResult<()> {
        self.transition(ScenarioStatus::Failed)?;
        self.passed = false;
        self.failure = Some(failure);
        Ok(())
    }

    /// Settle the final status from the recorded steps
    pub fn finish(&mut self, duration_ms: u64) -> HarnessResult<()> {
        self.duration_ms = duration_ms;
        if self.status.is_terminal() {
            return Ok(());
        }
        let ok = self.failure.is_none() && self.steps.iter().all(|s| s.passed);
        self.passed = ok;
        self.transition(if ok { ScenarioStatus::Passed } else { ScenarioStatus::Failed })
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.passed)
    }
}

/// Result of a complete run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,

    pub base_url: String,

    /// Driver backend ("chromium" or "stub")
    pub backend: String,

    pub started_at: DateTime<Utc>,

    pub outcomes: Vec<ScenarioOutcome>,

    /// Whether every scenario passed and the run was not aborted
    pub passed: bool,

    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn summary(&self) -> (usize, usize) {
        let passed = self.outcomes.iter().filter(|o| o.passed).count();
        (passed, self.outcomes.len() - passed)
    }
}
