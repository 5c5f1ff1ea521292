//! Selector contract for the viewer's rendered DOM.
//!
//! The DOM is treated as a best-effort contract: every entry here is a
//! selector the harness probes, and absence is a normal outcome. Defaults
//! describe the Lector-based viewer; a suite file can override any field
//! under a `[contract]` table.

use serde::{Deserialize, Serialize};

use crate::driver::Selector;

/// Sidebar container rendered once the app shell is up
pub const CSS_APP_SHELL: &str = "aside";

/// Any text input inside the sidebar (last-resort search input)
pub const CSS_SIDEBAR_TEXT_INPUT: &str = "aside input[type=\"text\"]";

/// One row per entry in the "Your Highlights" list
pub const CSS_HIGHLIGHT_ROWS: &str = "ul li:has(.font-medium)";

/// Numeric page input of the pagination bar
pub const CSS_PAGE_INPUT: &str = "input[aria-label=\"Go to page\"]";

/// Accessible-name prefix of a highlight row's navigation button
pub const GO_ACTION_PREFIX: &str = "Go to highlight on page";

/// Label prefix the viewer gives highlights created by a search
pub const SEARCH_LABEL_PREFIX: &str = "Search:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomContract {
    /// Present once the application has loaded
    pub app_shell: Selector,
    /// The document search field
    pub search_input: Selector,
    /// "Found N matches" indicator, absent when nothing matched
    pub result_indicator: Selector,
    /// Regex with one capture group extracting N from the indicator text
    pub result_count_pattern: String,
    /// Heading of the highlights panel
    pub highlights_heading: Selector,
    /// Rows of the highlights list
    pub highlight_rows: Selector,
    /// Regex with one capture group extracting the page from a row line
    pub row_page_pattern: String,
    /// Accessible-name prefix of the per-row navigation action
    pub go_action_prefix: String,
    /// Label prefix of search-created highlights
    pub search_label_prefix: String,
    /// Current page number control
    pub page_input: Selector,
    /// "/ N" page total
    pub page_total: Selector,
    pub next_page: Selector,
    pub previous_page: Selector,
}

impl Default for DomContract {
    fn default() -> Self {
        Self {
            app_shell: Selector::css(CSS_APP_SHELL),
            // The scripts disagreed on which box is "the" search box; prefer
            // the sidebar placeholder and fall back to any sidebar text input.
            search_input: Selector::any([
                Selector::placeholder("Search in PDF"),
                Selector::placeholder("Search in document"),
                Selector::css(CSS_SIDEBAR_TEXT_INPUT),
            ]),
            result_indicator: Selector::text(r"(?i)found\s+\d+\s+match"),
            result_count_pattern: r"(?i)found\s+(\d+)".to_string(),
            highlights_heading: Selector::text("^Your Highlights$"),
            highlight_rows: Selector::css(CSS_HIGHLIGHT_ROWS),
            row_page_pattern: r"^p\.\s*(\d+)$".to_string(),
            go_action_prefix: GO_ACTION_PREFIX.to_string(),
            search_label_prefix: SEARCH_LABEL_PREFIX.to_string(),
            page_input: Selector::css(CSS_PAGE_INPUT),
            page_total: Selector::text(r"^/\s*\d+$"),
            next_page: Selector::role("button", "Next page"),
            previous_page: Selector::role("button", "Previous page"),
        }
    }
}

impl DomContract {
    /// Accessible name of the navigation action for a highlight on `page`
    pub fn go_action_label(&self, page: u32) -> String {
        format!("{} {}", self.go_action_prefix, page)
    }

    /// Selector for the navigation button of a highlight on `page`
    pub fn go_action(&self, page: u32) -> Selector {
        Selector::role("button", self.go_action_label(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_action_label() {
        let contract = DomContract::default();
        assert_eq!(contract.go_action_label(4), "Go to highlight on page 4");
        assert_eq!(
            contract.go_action(4),
            Selector::role("button", "Go to highlight on page 4")
        );
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let contract: DomContract = toml::from_str(
            r##"
            search_input = { css = "#search" }
            "##,
        )
        .unwrap();
        assert_eq!(contract.search_input, Selector::css("#search"));
        assert_eq!(contract.app_shell, Selector::css(CSS_APP_SHELL));
    }
}
