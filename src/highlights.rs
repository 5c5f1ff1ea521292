//! Reads the "Your Highlights" panel.
//!
//! Origin of an entry is attributed by diffing lists taken before and after
//! a search, never by styling.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::contract::DomContract;
use crate::driver::ElementState;
use crate::harness::HarnessResult;
use crate::probe::PageProbe;

/// One row of the highlights list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightEntry {
    pub label: String,
    /// Page parsed from the row's "p.N" line
    pub page: Option<u32>,
    /// Whether the row offers a "go to page" action
    pub has_action: bool,
}

impl HighlightEntry {
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.label.starts_with(prefix)
    }
}

/// Multiset difference between two highlight lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightDiff {
    pub before: usize,
    pub after: usize,
    pub added: Vec<HighlightEntry>,
    pub removed: Vec<HighlightEntry>,
}

impl HighlightDiff {
    pub fn added(&self) -> &[HighlightEntry] {
        &self.added
    }

    pub fn removed(&self) -> &[HighlightEntry] {
        &self.removed
    }

    pub fn count_delta(&self) -> i64 {
        self.after as i64 - self.before as i64
    }
}

pub struct HighlightInspector {
    contract: DomContract,
    page_pattern: Regex,
}

impl HighlightInspector {
    pub fn new(contract: &DomContract) -> HarnessResult<Self> {
        Ok(Self {
            contract: contract.clone(),
            page_pattern: Regex::new(&contract.row_page_pattern)?,
        })
    }

    pub fn count_highlights(&self, probe: &mut PageProbe) -> usize {
        probe.elements(&self.contract.highlight_rows).len()
    }

    pub fn list_highlights(&self, probe: &mut PageProbe) -> Vec<HighlightEntry> {
        probe
            .elements(&self.contract.highlight_rows)
            .iter()
            .map(|row| self.parse_row(row))
            .collect()
    }

    /// Label is the first non-empty line; the page comes from the "p.N" line
    pub fn parse_row(&self, row: &ElementState) -> HighlightEntry {
        let mut lines = row.text.lines().map(str::trim).filter(|l| !l.is_empty());
        let label = lines.next().unwrap_or_default().to_string();
        let page = lines.find_map(|line| {
            self.page_pattern
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        });
        let has_action = row
            .actions
            .iter()
            .any(|action| action.starts_with(&self.contract.go_action_prefix));
        HighlightEntry {
            label,
            page,
            has_action,
        }
    }
}

pub fn diff(before: &[HighlightEntry], after: &[HighlightEntry]) -> HighlightDiff {
    let mut remaining: HashMap<&HighlightEntry, usize> = HashMap::new();
    for entry in before {
        *remaining.entry(entry).or_default() += 1;
    }

    let mut added = Vec::new();
    for entry in after {
        match remaining.get_mut(entry) {
            Some(n) if *n > 0 => *n -= 1,
            _ => added.push(entry.clone()),
        }
    }

    // What is left over was in `before` but not in `after`
    let mut removed = Vec::new();
    for entry in before {
        if let Some(n) = remaining.get_mut(entry) {
            if *n > 0 {
                *n -= 1;
                removed.push(entry.clone());
            }
        }
    }

    HighlightDiff {
        before: before.len(),
        after: after.len(),
        added,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(label: &str, page: u32) -> HighlightEntry {
        HighlightEntry {
            label: label.to_string(),
            page: Some(page),
            has_action: true,
        }
    }

    #[test]
    fn test_parse_row() {
        let inspector = HighlightInspector::new(&DomContract::default()).unwrap();
        let row = ElementState {
            text: "Search: cerebellar\np. 3\nGo".into(),
            visible: true,
            actions: vec!["Go to highlight on page 3".into()],
            ..Default::default()
        };
        assert_eq!(inspector.parse_row(&row), entry("Search: cerebellar", 3));
    }

    #[test]
    fn test_parse_row_without_page_or_action() {
        let inspector = HighlightInspector::new(&DomContract::default()).unwrap();
        let row = ElementState {
            text: "  \nLoose note".into(),
            visible: true,
            ..Default::default()
        };
        assert_eq!(
            inspector.parse_row(&row),
            HighlightEntry {
                label: "Loose note".into(),
                page: None,
                has_action: false,
            }
        );
    }

    #[test]
    fn test_diff_is_a_multiset_difference() {
        let before = vec![entry("Study design", 2), entry("Search: stroke", 2)];
        let after = vec![
            entry("Study design", 2),
            entry("Search: stroke", 2),
            entry("Search: stroke", 2),
            entry("Search: stroke", 4),
        ];
        let d = diff(&before, &after);
        assert_eq!(d.added(), &[entry("Search: stroke", 2), entry("Search: stroke", 4)]);
        assert!(d.removed().is_empty());
        assert_eq!(d.count_delta(), 2);

        let back = diff(&after, &before);
        assert_eq!(back.removed().len(), 2);
        assert_eq!(back.count_delta(), -2);
    }
}
