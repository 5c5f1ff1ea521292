//! viewer-probe - UI-driven verification of a PDF viewer's search and highlights.
//!
//! This crate provides:
//! - A narrow page-driver trait with a Chromium (CDP) backend and an
//!   in-process stub viewer
//! - Non-raising element probes with bounded waits
//! - Search driving with debounce settling
//! - Highlight list inspection and before/after diffs
//! - Scenario sequencing with evidence capture and JSON reports
//!
//! # Example
//!
//! ```rust,no_run
//! use viewer_probe::{DomContract, PageProbe, ScenarioRunner, Session, StubPage, Suite, Timing};
//!
//! let probe = PageProbe::new(Box::new(StubPage::sample()), Timing::defaults());
//! let session = Session::new();
//! let mut runner = ScenarioRunner::new(probe, DomContract::default(), session, "http://stub/").unwrap();
//! let report = runner.run_all(&Suite::builtin().scenarios).unwrap();
//! println!("passed: {}", report.passed);
//! ```

pub mod config;
pub mod contract;
pub mod driver;
pub mod harness;
pub mod highlights;
pub mod pager;
pub mod probe;
pub mod runner;
pub mod search;
pub mod session;
pub mod suite;

// Re-export configuration
pub use config::{Config, Timing};

// Re-export driver types and backends
pub use contract::DomContract;
pub use driver::{ChromePage, DriverError, DriverResult, ElementState, PageDriver, Selector, StubDocument, StubPage};

// Re-export harness types
pub use harness::{
    Action, Expectation, Failure, FailureKind, HarnessError, HarnessResult, Scenario, ScenarioRunner, Step,
};

// Re-export components
pub use highlights::{HighlightDiff, HighlightEntry, HighlightInspector, diff};
pub use pager::{PagePosition, Pager};
pub use probe::{PageProbe, ProbeResult};
pub use search::{SearchDriver, SearchSession};

// Re-export result types
pub use runner::{RunReport, ScenarioOutcome, ScenarioStatus, StepRecord};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};

pub use suite::Suite;
