pub mod scenario;
pub mod types;

pub use scenario::ScenarioRunner;
pub use types::{
    Action, Expectation, Failure, FailureKind, HarnessError, HarnessResult, Scenario, Step,
};
