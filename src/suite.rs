//! Scenario suites: the built-in checks and TOML suite files.
//!
//! A suite file has an optional `[contract]` table overriding selectors and
//! any number of `[[scenarios]]`:
//!
//! ```toml
//! [contract]
//! search_input = { placeholder = "Search" }
//!
//! [[scenarios]]
//! name = "smoke"
//!
//! [[scenarios.steps]]
//! description = "open the viewer"
//! action = { navigate = {} }
//! expect = { present = { css = "aside" } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::contract::DomContract;
use crate::harness::{Action, Expectation, HarnessError, HarnessResult, Scenario, Step};

/// Term with a known, non-zero number of matches in the sample paper
pub const KNOWN_TERM: &str = "cerebellar";

/// Term expected to match nothing
pub const ABSENT_TERM: &str = "zzzznotfound";

/// Terms searched one after another by the sweep
pub const SWEEP_TERMS: [&str; 4] = ["patient", "stroke", "treatment", "outcome"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub contract: DomContract,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// The checks every viewer build should pass
    pub fn builtin() -> Self {
        let contract = DomContract::default();
        let scenarios = builtin_scenarios(&contract);
        Self { contract, scenarios }
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(text: &str) -> HarnessResult<Self> {
        let suite: Suite = toml::from_str(text)?;
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> HarnessResult<()> {
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err(HarnessError::Config("scenario with an empty name".into()));
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(HarnessError::Config(format!("duplicate scenario '{}'", scenario.name)));
            }
            if scenario.steps.is_empty() {
                return Err(HarnessError::Config(format!("scenario '{}' has no steps", scenario.name)));
            }
        }
        Ok(())
    }

    /// Scenarios named in `names` (in suite order), or all when empty
    pub fn select(&self, names: &[String]) -> HarnessResult<Vec<Scenario>> {
        if let Some(unknown) = names.iter().find(|n| !self.scenarios.iter().any(|s| &s.name == *n)) {
            return Err(HarnessError::Config(format!("unknown scenario '{}'", unknown)));
        }
        Ok(self
            .scenarios
            .iter()
            .filter(|s| names.is_empty() || names.contains(&s.name))
            .cloned()
            .collect())
    }
}

fn navigate() -> Step {
    Step::new("open the viewer", Action::Navigate { path: None })
}

fn observe(description: &str, expect: Expectation) -> Step {
    Step::new(description, Action::Observe).expect(expect)
}

fn set_term(term: &str, expected_min_matches: usize) -> Step {
    Step::new(
        format!("search for '{}'", term),
        Action::SetTerm {
            term: term.to_string(),
            expected_min_matches,
        },
    )
}

pub fn builtin_scenarios(contract: &DomContract) -> Vec<Scenario> {
    let search_prefix = contract.search_label_prefix.clone();

    let initial_state = Scenario::new("initial_state", "the viewer loads with its panels and no search results")
        .step(navigate().expect(Expectation::Present(contract.highlights_heading.clone())))
        .step(observe("search box is rendered", Expectation::Present(contract.search_input.clone())).independent())
        .step(observe("no result indicator before searching", Expectation::NoMatches).independent())
        .step(
            observe(
                "page total is rendered",
                Expectation::TextMatches {
                    target: contract.page_total.clone(),
                    pattern: r"^/\s*[1-9]\d*$".to_string(),
                },
            )
            .independent(),
        )
        .step(Step::new("record the initial highlights", Action::RecordBaseline));

    let search_creates_highlights =
        Scenario::new("search_creates_highlights", "searching adds one labelled highlight per match")
            .step(navigate())
            .step(Step::new("record the highlights before searching", Action::RecordBaseline))
            .step(set_term(KNOWN_TERM, 1).expect(Expectation::MatchesFound { min: 1 }))
            .step(observe("one highlight per match", Expectation::HighlightsIncreasedByMatches))
            .step(observe(
                "new highlights carry the search label",
                Expectation::NewHighlightsPrefixed(search_prefix.clone()),
            ))
            .step(Step::new("capture results", Action::Snapshot { label: "results".into() }))
            .step(Step::new("clear the search", Action::ClearTerm).expect(Expectation::HighlightsAtBaseline))
            .step(observe("indicator is gone", Expectation::NoMatches));

    let zero_match_term = Scenario::new("zero_match_term", "a term with no matches changes nothing")
        .step(navigate())
        .step(Step::new("record the highlights before searching", Action::RecordBaseline))
        .step(set_term(ABSENT_TERM, 0).expect(Expectation::NoMatches))
        .step(observe("highlight count is unchanged", Expectation::HighlightsAtBaseline));

    let mut multi_term_sweep =
        Scenario::new("multi_term_sweep", "several terms in a row each add and remove their highlights")
            .step(navigate())
            .step(Step::new("record the highlights before searching", Action::RecordBaseline));
    for term in SWEEP_TERMS {
        multi_term_sweep = multi_term_sweep
            .step(set_term(term, 1).expect(Expectation::MatchesFound { min: 1 }).independent())
            .step(observe("one highlight per match", Expectation::HighlightsIncreasedByMatches).independent())
            .step(Step::new(format!("clear '{}'", term), Action::ClearTerm).expect(Expectation::HighlightsAtBaseline));
    }

    let search_determinism = Scenario::new("search_determinism", "the same term yields the same highlights twice")
        .step(navigate())
        .step(set_term(KNOWN_TERM, 1).expect(Expectation::MatchesFound { min: 1 }))
        .step(Step::new("record the highlights", Action::RecordHighlights))
        .step(Step::new("clear the search", Action::ClearTerm).expect(Expectation::HighlightsAtBaseline))
        .step(set_term(KNOWN_TERM, 1).expect(Expectation::HighlightsMatchRecorded));

    let highlight_navigation =
        Scenario::new("highlight_navigation", "a highlight's Go action moves to its page")
            .step(navigate())
            .step(set_term(KNOWN_TERM, 1).expect(Expectation::MatchesFound { min: 1 }))
            .step(Step::new("move off the first page", Action::NextPage).expect(Expectation::PageChangedBy(1)))
            .step(
                Step::new(
                    "go to the first search highlight",
                    Action::GoToHighlight {
                        label_prefix: search_prefix.clone(),
                    },
                )
                .expect(Expectation::PageAtNavigationTarget),
            )
            .step(
                Step::new(
                    "go to it again",
                    Action::GoToHighlight {
                        label_prefix: search_prefix,
                    },
                )
                .expect(Expectation::PageAtNavigationTarget),
            );

    let pagination = Scenario::new("pagination", "Next and Previous move one page within bounds")
        .step(navigate().expect(Expectation::TextMatches {
            target: contract.page_input.clone(),
            pattern: "^1$".to_string(),
        }))
        .step(Step::new("next page", Action::NextPage).expect(Expectation::PageChangedBy(1)))
        .step(Step::new("previous page", Action::PreviousPage).expect(Expectation::PageChangedBy(-1)))
        .step(Step::new("previous page at the first page", Action::PreviousPage).expect(Expectation::PageChangedBy(-1)));

    vec![
        initial_state,
        search_creates_highlights,
        zero_match_term,
        multi_term_sweep,
        search_determinism,
        highlight_navigation,
        pagination,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Selector;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_names() {
        let names: Vec<_> = Suite::builtin().scenarios.into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "initial_state",
                "search_creates_highlights",
                "zero_match_term",
                "multi_term_sweep",
                "search_determinism",
                "highlight_navigation",
                "pagination",
            ]
        );
    }

    #[test]
    fn test_every_builtin_starts_with_navigation() {
        for scenario in Suite::builtin().scenarios {
            assert!(
                matches!(scenario.steps[0].action, Action::Navigate { .. }),
                "{} does not navigate first",
                scenario.name
            );
        }
    }

    #[test]
    fn test_parse_suite_file() {
        let suite = Suite::from_toml_str(
            r##"
            [contract]
            search_input = { css = "#q" }

            [[scenarios]]
            name = "smoke"
            timeout_secs = 30

            [[scenarios.steps]]
            description = "open"
            action = { navigate = { path = "/viewer" } }
            expect = { present = { css = "aside" } }

            [[scenarios.steps]]
            description = "search"
            action = { set_term = { term = "stroke", expected_min_matches = 1 } }
            expect = { matches_found = { min = 1 } }
            continues_on_failure = true
            "##,
        )
        .unwrap();

        assert_eq!(suite.contract.search_input, Selector::css("#q"));
        assert_eq!(suite.contract.app_shell, DomContract::default().app_shell);
        let scenario = &suite.scenarios[0];
        assert_eq!(scenario.timeout_secs, Some(30));
        assert_eq!(
            scenario.steps[0].action,
            Action::Navigate {
                path: Some("/viewer".into())
            }
        );
        assert_eq!(scenario.steps[0].expect, Expectation::Present(Selector::css("aside")));
        assert!(scenario.steps[1].continues_on_failure);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Suite::from_toml_str(
            r#"
            [[scenarios]]
            name = "a"
            steps = [{ description = "x", action = "observe" }]

            [[scenarios]]
            name = "a"
            steps = [{ description = "y", action = "observe" }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate scenario 'a'"));
    }

    #[test]
    fn test_select() {
        let suite = Suite::builtin();
        assert_eq!(suite.select(&[]).unwrap().len(), 7);
        let picked = suite.select(&["pagination".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert!(suite.select(&["nope".to_string()]).is_err());
    }
}
