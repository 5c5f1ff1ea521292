//! Page-position indicator and pagination controls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::contract::DomContract;
use crate::harness::{HarnessError, HarnessResult};
use crate::highlights::HighlightEntry;
use crate::probe::PageProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePosition {
    pub current: u32,
    pub total: u32,
}

impl PagePosition {
    /// Page reached by moving `delta`, clamped to the document
    pub fn offset(&self, delta: i64) -> u32 {
        (self.current as i64 + delta).clamp(1, self.total.max(1) as i64) as u32
    }
}

impl fmt::Display for PagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.current, self.total)
    }
}

pub struct Pager {
    contract: DomContract,
}

impl Pager {
    pub fn new(contract: &DomContract) -> Self {
        Self {
            contract: contract.clone(),
        }
    }

    /// Current page and total, or None when the indicator is not rendered
    pub fn position(&self, probe: &mut PageProbe) -> Option<PagePosition> {
        let input = probe.elements(&self.contract.page_input).into_iter().next()?;
        let current = input.value.as_deref().unwrap_or(&input.text).trim().parse().ok()?;
        let total_text = probe.peek(&self.contract.page_total);
        let total = total_text
            .text()?
            .trim_start_matches(|c: char| c == '/' || c.is_whitespace())
            .trim()
            .parse()
            .ok()?;
        Some(PagePosition { current, total })
    }

    pub fn next(&self, probe: &mut PageProbe) -> HarnessResult<()> {
        probe.click(&self.contract.next_page)
    }

    pub fn previous(&self, probe: &mut PageProbe) -> HarnessResult<()> {
        probe.click(&self.contract.previous_page)
    }

    /// Click the entry's navigation action and return the page it targets
    pub fn go_to_highlight(&self, probe: &mut PageProbe, entry: &HighlightEntry) -> HarnessResult<u32> {
        let page = entry.page.ok_or_else(|| {
            HarnessError::ElementNotFound(format!("highlight '{}' has no page", entry.label))
        })?;
        debug!(label = %entry.label, page, "navigating to highlight");
        probe.click(&self.contract.go_action(page))?;
        Ok(page)
    }

    /// Wait until the indicator shows `page`; returns the last position seen
    pub fn wait_for_page(&self, probe: &mut PageProbe, page: u32, timeout: Duration) -> Option<PagePosition> {
        let mut last = None;
        probe.wait_for(
            |p| {
                last = self.position(p);
                last.is_some_and(|pos| pos.current == page)
            },
            timeout,
        );
        last
    }
}
