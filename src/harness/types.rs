use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::driver::{DriverError, Selector};

/// A named, ordered list of steps run against one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the scenario (also its evidence directory)
    pub name: String,

    /// What the scenario verifies
    #[serde(default)]
    pub description: String,

    /// Overall budget; falls back to the configured scenario timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            timeout_secs: None,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }
}

/// One (action, expectation) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable description (e.g., "search for cerebellar")
    pub description: String,

    /// What to do to the page
    pub action: Action,

    /// What must hold afterwards
    #[serde(default)]
    pub expect: Expectation,

    /// Keep running later steps if this one fails
    #[serde(default)]
    pub continues_on_failure: bool,
}

impl Step {
    pub fn new(description: impl Into<String>, action: Action) -> Self {
        Self {
            description: description.into(),
            action,
            expect: Expectation::None,
            continues_on_failure: false,
        }
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expect = expectation;
        self
    }

    /// Later steps do not depend on this one
    pub fn independent(mut self) -> Self {
        self.continues_on_failure = true;
        self
    }
}

/// Something the harness does to the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Load base URL + path and wait for the app shell
    Navigate {
        #[serde(default)]
        path: Option<String>,
    },

    /// Wait until a target is present
    WaitFor {
        target: Selector,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Remember the current highlight list as the baseline
    RecordBaseline,

    /// Type a search term and wait for the results to settle
    SetTerm {
        term: String,
        #[serde(default)]
        expected_min_matches: usize,
    },

    /// Empty the search field and wait for the results to settle
    ClearTerm,

    Click { target: Selector },

    NextPage,

    PreviousPage,

    /// Use the navigation action of the first highlight whose label starts with the prefix
    GoToHighlight { label_prefix: String },

    /// Remember the current highlight list for a later comparison
    RecordHighlights,

    /// Capture evidence without changing anything
    Snapshot { label: String },

    /// Do nothing; only evaluate the expectation
    Observe,
}

/// What must hold after a step's action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    None,

    Present(Selector),

    Absent(Selector),

    TextMatches { target: Selector, pattern: String },

    /// The result indicator reports at least `min` matches
    MatchesFound { min: usize },

    /// The result indicator is absent
    NoMatches,

    /// Highlight count grew by exactly `n` over the baseline
    HighlightsIncreasedBy(usize),

    /// Highlight count grew by the number of matches the indicator reported
    HighlightsIncreasedByMatches,

    /// Highlight count equals the baseline
    HighlightsAtBaseline,

    /// Every highlight added since the baseline carries the label prefix
    NewHighlightsPrefixed(String),

    /// Highlight list equals the one recorded by `RecordHighlights`
    HighlightsMatchRecorded,

    /// Page indicator shows the page the last highlight navigation targeted
    PageAtNavigationTarget,

    /// Page indicator moved by `delta`, clamped to the document
    PageChangedBy(i64),
}

impl Expectation {
    /// Invariant expectations end the scenario when violated
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            Expectation::HighlightsAtBaseline | Expectation::HighlightsMatchRecorded
        )
    }
}

/// Classification of a failed step or scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ElementNotFound,
    ActionTimeout,
    UnexpectedState,
    EnvironmentUnavailable,
    ExpectationFailed,
    ScenarioTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ElementNotFound => "element not found",
            FailureKind::ActionTimeout => "action timeout",
            FailureKind::UnexpectedState => "unexpected state",
            FailureKind::EnvironmentUnavailable => "environment unavailable",
            FailureKind::ExpectationFailed => "expectation failed",
            FailureKind::ScenarioTimeout => "scenario timeout",
        };
        f.write_str(name)
    }
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness operations
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A required element never appeared
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// An action timed out on every attempt
    #[error("{action} timed out after {attempts} attempt(s)")]
    ActionTimeout { action: String, attempts: u32 },

    /// A harness invariant was violated
    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    /// The target application could not be loaded
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// A non-invariant expectation did not hold
    #[error("expectation failed: {0}")]
    ExpectationFailed(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::runner::ScenarioStatus,
        to: crate::runner::ScenarioStatus,
    },

    /// Invalid suite or contract configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("driver error: {0}")]
    Driver(DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    /// How this error is reported in an outcome
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::ElementNotFound(_) => FailureKind::ElementNotFound,
            HarnessError::ActionTimeout { .. } => FailureKind::ActionTimeout,
            HarnessError::EnvironmentUnavailable(_) => FailureKind::EnvironmentUnavailable,
            HarnessError::ExpectationFailed(_)
            | HarnessError::Config(_)
            | HarnessError::Driver(_)
            | HarnessError::Io(_)
            | HarnessError::Serialization(_) => FailureKind::ExpectationFailed,
            HarnessError::UnexpectedState(_) | HarnessError::InvalidTransition { .. } => {
                FailureKind::UnexpectedState
            }
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

impl From<DriverError> for HarnessError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound { selector, .. } => HarnessError::ElementNotFound(selector),
            DriverError::Timeout { action, .. } => HarnessError::ActionTimeout { action, attempts: 1 },
            DriverError::Unavailable(msg) => HarnessError::EnvironmentUnavailable(msg),
            other => HarnessError::Driver(other),
        }
    }
}

impl From<regex::Error> for HarnessError {
    fn from(err: regex::Error) -> Self {
        HarnessError::Config(format!("invalid pattern: {}", err))
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_map_to_taxonomy() {
        let not_found: HarnessError = DriverError::NotFound {
            selector: "aside".into(),
            waited: Duration::from_millis(5),
        }
        .into();
        assert_eq!(not_found.kind(), FailureKind::ElementNotFound);

        let unavailable: HarnessError = DriverError::Unavailable("refused".into()).into();
        assert_eq!(unavailable.kind(), FailureKind::EnvironmentUnavailable);

        let timeout: HarnessError = DriverError::Timeout {
            action: "click".into(),
            after: Duration::from_millis(5),
        }
        .into();
        assert_eq!(timeout.kind(), FailureKind::ActionTimeout);
    }

    #[test]
    fn test_invariant_expectations() {
        assert!(Expectation::HighlightsAtBaseline.is_invariant());
        assert!(Expectation::HighlightsMatchRecorded.is_invariant());
        assert!(!Expectation::NoMatches.is_invariant());
    }

    #[test]
    fn test_step_from_toml() {
        let step: Step = toml::from_str(
            r#"
            description = "search"
            action = { set_term = { term = "cerebellar", expected_min_matches = 1 } }
            expect = "highlights_increased_by_matches"
            "#,
        )
        .unwrap();
        assert_eq!(
            step.action,
            Action::SetTerm {
                term: "cerebellar".into(),
                expected_min_matches: 1
            }
        );
        assert_eq!(step.expect, Expectation::HighlightsIncreasedByMatches);
        assert!(!step.continues_on_failure);
    }

    #[test]
    fn test_unit_action_from_toml() {
        let step: Step = toml::from_str(
            r#"
            description = "clear"
            action = "clear_term"
            expect = { highlights_increased_by = 0 }
            continues_on_failure = true
            "#,
        )
        .unwrap();
        assert_eq!(step.action, Action::ClearTerm);
        assert_eq!(step.expect, Expectation::HighlightsIncreasedBy(0));
        assert!(step.continues_on_failure);
    }
}
