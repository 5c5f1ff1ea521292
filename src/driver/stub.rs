//! In-process simulation of the PDF viewer.
//!
//! `StubPage` models just enough of the viewer's DOM for the harness to run
//! unchanged against it:
//! - a sidebar with a debounced search box and a "Found N matches" indicator
//! - the "Your Highlights" list, mixing manual highlights with one entry per
//!   search match
//! - pagination (page input, "/ N" total, Previous/Next buttons) and the
//!   per-row "Go" navigation buttons
//!
//! Failure injection (unreachable app, stalled actions) exercises the
//! harness error paths. Screenshots are rendered with [`Canvas`].

use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

use super::backend::{PageDriver, poll_until};
use super::render::{Canvas, GLYPH_SIZE};
use super::types::{DriverError, DriverResult, ElementState, Selector};
use crate::contract::{
    CSS_APP_SHELL, CSS_HIGHLIGHT_ROWS, CSS_PAGE_INPUT, CSS_SIDEBAR_TEXT_INPUT, GO_ACTION_PREFIX,
    SEARCH_LABEL_PREFIX,
};

/// Default search debounce of the simulated viewer
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const SCREENSHOT_WIDTH: u32 = 640;
const LINE_HEIGHT: u32 = 12;

/// Page texts of the simulated document
#[derive(Debug, Clone, Default)]
pub struct StubDocument {
    pages: Vec<String>,
}

impl StubDocument {
    pub fn new(pages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// A short clinical paper in which "cerebellar" occurs exactly three times
    pub fn sample() -> Self {
        Self::new([
            "Outcome of surgical treatment in patients with spontaneous cerebellar hemorrhage: a matched case-control study.",
            "Methods. Each patient was matched on age and hematoma volume. Treatment allocation followed the stroke unit protocol.",
            "Results. Functional outcome at 12 months favoured evacuation of the cerebellar hematoma in 28 patients.",
            "Discussion. Early treatment reduced mortality after stroke; outcome measures used the modified Rankin scale.",
            "Conclusion. Surgical evacuation of cerebellar hemorrhage improves patient outcome.",
        ])
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Case-insensitive occurrences of `term` as (page, matched text)
    pub fn find(&self, term: &str) -> Vec<(u32, String)> {
        let needle = term.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut matches = Vec::new();
        for (idx, text) in self.pages.iter().enumerate() {
            let haystack = text.to_ascii_lowercase();
            for (start, _) in haystack.match_indices(&needle) {
                matches.push((idx as u32 + 1, text[start..start + needle.len()].to_string()));
            }
        }
        matches
    }
}

/// What clicking or filling an element does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    SearchInput,
    PageInput,
    NextPage,
    PreviousPage,
    GoTo(u32),
    Inert,
}

/// One node of the simulated DOM
#[derive(Debug, Clone)]
struct StubElement {
    /// CSS selectors this element answers to
    css: Vec<&'static str>,
    role: Option<&'static str>,
    placeholder: Option<&'static str>,
    state: ElementState,
    target: Target,
}

impl StubElement {
    fn new(css: &[&'static str], text: impl Into<String>) -> Self {
        Self {
            css: css.to_vec(),
            role: None,
            placeholder: None,
            state: ElementState {
                text: text.into(),
                visible: true,
                ..Default::default()
            },
            target: Target::Inert,
        }
    }

    fn button(aria_label: impl Into<String>, text: &str, disabled: bool, target: Target) -> Self {
        let mut el = Self::new(&["button"], text);
        el.role = Some("button");
        el.state.aria_label = Some(aria_label.into());
        el.state.disabled = disabled;
        el.target = target;
        el
    }

    fn accessible_name(&self) -> &str {
        self.state.aria_label.as_deref().unwrap_or(&self.state.text)
    }
}

/// Simulated viewer page
#[derive(Debug, Clone)]
pub struct StubPage {
    document: StubDocument,
    manual: Vec<(String, u32)>,
    debounce: Duration,
    reachable: bool,
    loaded: bool,
    url: Option<String>,
    /// Value currently typed into the search box
    input: String,
    input_changed: Instant,
    /// Term the viewer has actually searched for (after debounce)
    applied: String,
    current_page: u32,
    stalled_fills: usize,
    stalled_clicks: usize,
}

impl StubPage {
    pub fn new(document: StubDocument) -> Self {
        Self {
            document,
            manual: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            reachable: true,
            loaded: false,
            url: None,
            input: String::new(),
            input_changed: Instant::now(),
            applied: String::new(),
            current_page: 1,
            stalled_fills: 0,
            stalled_clicks: 0,
        }
    }

    /// Sample document with one manual highlight on page 2
    pub fn sample() -> Self {
        Self::new(StubDocument::sample()).with_highlight("Study design", 2)
    }

    /// Add a highlight created by a prior manual selection
    pub fn with_highlight(mut self, label: impl Into<String>, page: u32) -> Self {
        self.manual.push((label.into(), page));
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Make every navigation fail as if nothing listens on the URL
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Make the next `count` fills time out
    pub fn stall_fills(mut self, count: usize) -> Self {
        self.stalled_fills = count;
        self
    }

    /// Make the next `count` clicks time out
    pub fn stall_clicks(mut self, count: usize) -> Self {
        self.stalled_clicks = count;
        self
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Apply the typed term once the debounce has elapsed
    fn sync(&mut self) {
        if self.input != self.applied && self.input_changed.elapsed() >= self.debounce {
            debug!(term = %self.input, "stub viewer applied search term");
            self.applied = self.input.clone();
        }
    }

    fn highlights(&self) -> Vec<(String, u32)> {
        let mut all = self.manual.clone();
        all.extend(
            self.document
                .find(&self.applied)
                .into_iter()
                .map(|(page, text)| (format!("{} {}", SEARCH_LABEL_PREFIX, text), page)),
        );
        all
    }

    fn elements(&self) -> Vec<StubElement> {
        if !self.loaded {
            return Vec::new();
        }
        let total = self.document.page_count();
        let mut els = Vec::new();

        els.push(StubElement::new(&[CSS_APP_SHELL], ""));

        let mut search = StubElement::new(&[CSS_SIDEBAR_TEXT_INPUT, "input"], "");
        search.role = Some("textbox");
        search.placeholder = Some("Search in document...");
        search.state.value = Some(self.input.clone());
        search.target = Target::SearchInput;
        els.push(search);

        let matches = self.document.find(&self.applied).len();
        if matches > 0 {
            let noun = if matches == 1 { "match" } else { "matches" };
            els.push(StubElement::new(&["p"], format!("Found {} {}", matches, noun)));
        }

        let mut heading = StubElement::new(&["h3"], "Your Highlights");
        heading.role = Some("heading");
        els.push(heading);

        let highlights = self.highlights();
        if highlights.is_empty() {
            els.push(StubElement::new(
                &["li"],
                "No highlights yet. Select text in the PDF to create highlights.",
            ));
        }
        for (label, page) in &highlights {
            let go_label = format!("{} {}", GO_ACTION_PREFIX, page);
            let mut row = StubElement::new(&[CSS_HIGHLIGHT_ROWS, "li"], format!("{}\np.{}\nGo", label, page));
            row.role = Some("listitem");
            row.state.actions = vec![go_label.clone()];
            els.push(row);
            els.push(StubElement::button(go_label, "Go", false, Target::GoTo(*page)));
        }

        els.push(StubElement::button(
            "Previous page",
            "◀",
            self.current_page <= 1,
            Target::PreviousPage,
        ));

        let mut page_input = StubElement::new(&[CSS_PAGE_INPUT, "input"], "");
        page_input.role = Some("spinbutton");
        page_input.state.aria_label = Some("Go to page".to_string());
        page_input.state.value = Some(self.current_page.to_string());
        page_input.target = Target::PageInput;
        els.push(page_input);

        els.push(StubElement::new(&["span"], format!("/ {}", total)));

        els.push(StubElement::button(
            "Next page",
            "▶",
            self.current_page >= total,
            Target::NextPage,
        ));

        els
    }

    fn resolve(&self, selector: &Selector) -> Vec<StubElement> {
        let elements = self.elements();
        resolve_in(&elements, selector)
    }

    /// Wait for the first visible match of an action's target
    fn wait_for_target(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<StubElement> {
        poll_until(timeout, POLL_INTERVAL, || {
            self.sync();
            self.resolve(selector).into_iter().find(|el| el.state.visible)
        })
        .ok_or_else(|| DriverError::NotFound {
            selector: selector.to_string(),
            waited: timeout,
        })
    }

    fn render(&self) -> Canvas {
        let mut lines = vec![
            format!("viewer {}", self.url.as_deref().unwrap_or("about:blank")),
            format!("search: [{}]", self.input),
        ];
        let matches = self.document.find(&self.applied).len();
        if matches > 0 {
            lines.push(format!("Found {} matches", matches));
        }
        lines.push("Your Highlights".to_string());
        for (label, page) in self.highlights() {
            lines.push(format!("  {} (p.{})", label, page));
        }
        lines.push(format!("page {} / {}", self.current_page, self.document.page_count()));

        let height = (lines.len() as u32 + 2) * LINE_HEIGHT;
        let mut canvas = Canvas::new(SCREENSHOT_WIDTH, height, [250, 250, 250]);
        canvas.draw_rect(0, 0, SCREENSHOT_WIDTH, LINE_HEIGHT + 4, [40, 40, 60]);
        for (idx, line) in lines.iter().enumerate() {
            let y = 4 + idx as u32 * LINE_HEIGHT;
            let color = if idx == 0 { [255, 255, 255] } else { [20, 20, 20] };
            canvas.draw_text(GLYPH_SIZE, y, line, color);
        }
        canvas
    }
}

impl Default for StubPage {
    fn default() -> Self {
        Self::sample()
    }
}

fn resolve_in(elements: &[StubElement], selector: &Selector) -> Vec<StubElement> {
    match selector {
        Selector::Any(alternatives) => {
            for alt in alternatives {
                let found: Vec<_> = resolve_in(elements, alt)
                    .into_iter()
                    .filter(|el| el.state.visible)
                    .collect();
                if !found.is_empty() {
                    return found;
                }
            }
            Vec::new()
        }
        Selector::Text(pattern) => match Regex::new(pattern) {
            Ok(re) => elements
                .iter()
                .filter(|el| re.is_match(el.state.text.trim()))
                .cloned()
                .collect(),
            Err(e) => {
                debug!(%pattern, error = %e, "invalid text selector");
                Vec::new()
            }
        },
        other => elements
            .iter()
            .filter(|el| matches_simple(el, other))
            .cloned()
            .collect(),
    }
}

fn matches_simple(el: &StubElement, selector: &Selector) -> bool {
    match selector {
        Selector::Css(css) => el.css.iter().any(|c| c == css),
        Selector::Placeholder(fragment) => el.placeholder.is_some_and(|p| p.contains(fragment.as_str())),
        Selector::Role { role, name } => {
            el.role == Some(role.as_str()) && el.accessible_name().trim() == name.trim()
        }
        Selector::Text(_) | Selector::Any(_) => false,
    }
}

impl PageDriver for StubPage {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> DriverResult<()> {
        if !self.reachable {
            return Err(DriverError::Unavailable(format!("connection refused: {}", url)));
        }
        self.loaded = true;
        self.url = Some(url.to_string());
        self.input.clear();
        self.applied.clear();
        self.current_page = 1;
        Ok(())
    }

    fn query(&mut self, selector: &Selector, _timeout: Duration) -> DriverResult<Vec<ElementState>> {
        self.sync();
        Ok(self.resolve(selector).into_iter().map(|el| el.state).collect())
    }

    fn fill(&mut self, selector: &Selector, value: &str, timeout: Duration) -> DriverResult<()> {
        let el = self.wait_for_target(selector, timeout)?;
        if self.stalled_fills > 0 {
            self.stalled_fills -= 1;
            return Err(DriverError::Timeout {
                action: format!("fill {}", selector),
                after: timeout,
            });
        }
        match el.target {
            Target::SearchInput => {
                self.input = value.to_string();
                self.input_changed = Instant::now();
                Ok(())
            }
            Target::PageInput => {
                if let Ok(page) = value.trim().parse::<u32>() {
                    if (1..=self.document.page_count()).contains(&page) {
                        self.current_page = page;
                    }
                }
                Ok(())
            }
            _ => Err(DriverError::Protocol(format!("{} is not editable", selector))),
        }
    }

    fn click(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<()> {
        let el = self.wait_for_target(selector, timeout)?;
        if self.stalled_clicks > 0 {
            self.stalled_clicks -= 1;
            return Err(DriverError::Timeout {
                action: format!("click {}", selector),
                after: timeout,
            });
        }
        if el.state.disabled {
            return Ok(());
        }
        let total = self.document.page_count();
        match el.target {
            Target::NextPage => self.current_page = (self.current_page + 1).min(total),
            Target::PreviousPage => self.current_page = self.current_page.saturating_sub(1).max(1),
            Target::GoTo(page) => self.current_page = page.clamp(1, total.max(1)),
            Target::SearchInput | Target::PageInput | Target::Inert => {}
        }
        Ok(())
    }

    fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        self.sync();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render().to_png()?)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "stub"
    }
}
