//! Chromium page driver over the DevTools protocol.
//!
//! `ChromePage` owns a private tokio runtime and blocks on each CDP call,
//! so the rest of the harness stays synchronous. Every call is wrapped in
//! `tokio::time::timeout`; nothing waits on the browser without a bound.
//!
//! Selectors are resolved inside the page by a small script (see
//! [`RESOLVER_JS`]) that understands the JSON form of [`Selector`].

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::future::Future;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::PageDriver;
use super::types::{DriverError, DriverResult, ElementState, Selector};
use crate::config::TargetSettings;

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared helpers injected in front of every query/action script.
///
/// `resolve(sel)` mirrors the semantics of [`Selector`]: text regexes match
/// only the innermost elements, role names match exactly, `any` returns the
/// visible matches of the first alternative that has some.
const RESOLVER_JS: &str = r#"
const implicitRole = (el) => {
  const tag = el.tagName.toLowerCase();
  if (tag === 'button') return 'button';
  if (tag === 'a' && el.hasAttribute('href')) return 'link';
  if (/^h[1-6]$/.test(tag)) return 'heading';
  if (tag === 'li') return 'listitem';
  if (tag === 'ul' || tag === 'ol') return 'list';
  if (tag === 'textarea') return 'textbox';
  if (tag === 'input') {
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    if (type === 'number') return 'spinbutton';
    if (type === 'checkbox') return 'checkbox';
    if (type === 'button' || type === 'submit') return 'button';
    return 'textbox';
  }
  return null;
};
const isVisible = (el) =>
  !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length) &&
  getComputedStyle(el).visibility !== 'hidden';
const accessibleName = (el) =>
  (el.getAttribute('aria-label') || el.getAttribute('title') || el.innerText || '').trim();
const resolve = (sel) => {
  if (sel.css !== undefined) return Array.from(document.querySelectorAll(sel.css));
  if (sel.text !== undefined) {
    let source = sel.text;
    let flags = '';
    if (source.startsWith('(?i)')) { source = source.slice(4); flags = 'i'; }
    const re = new RegExp(source, flags);
    const hits = Array.from(document.body.querySelectorAll('*'))
      .filter((el) => re.test((el.textContent || '').trim()));
    return hits.filter((el) => !hits.some((other) => other !== el && el.contains(other)));
  }
  if (sel.placeholder !== undefined) {
    return Array.from(document.querySelectorAll('input[placeholder], textarea[placeholder]'))
      .filter((el) => el.getAttribute('placeholder').includes(sel.placeholder));
  }
  if (sel.role !== undefined) {
    return Array.from(document.body.querySelectorAll('*')).filter((el) =>
      (el.getAttribute('role') || implicitRole(el)) === sel.role.role &&
      accessibleName(el) === sel.role.name.trim());
  }
  if (sel.any !== undefined) {
    for (const alt of sel.any) {
      const found = resolve(alt).filter(isVisible);
      if (found.length) return found;
    }
  }
  return [];
};
const describe = (el) => ({
  text: (el.innerText || el.textContent || '').trim(),
  value: typeof el.value === 'string' ? el.value : null,
  visible: isVisible(el),
  disabled: !!el.disabled,
  ariaLabel: el.getAttribute('aria-label'),
  actions: Array.from(el.querySelectorAll('button')).map(accessibleName),
});
"#;

const FILL_JS: &str = r#"
if (!(el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) return 'readonly';
el.focus();
const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return 'ok';
"#;

const CLICK_JS: &str = r#"
el.scrollIntoView({ block: 'center' });
el.click();
return 'ok';
"#;

/// Outcome reported by an in-page action script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionStatus {
    Done,
    Missing,
    Disabled,
    Readonly,
}

impl ActionStatus {
    fn parse(status: &str) -> DriverResult<Self> {
        match status {
            "ok" => Ok(ActionStatus::Done),
            "missing" => Ok(ActionStatus::Missing),
            "disabled" => Ok(ActionStatus::Disabled),
            "readonly" => Ok(ActionStatus::Readonly),
            other => Err(DriverError::Protocol(format!("unexpected action status '{}'", other))),
        }
    }
}

/// Build the query script for a selector
fn query_script(selector: &Selector) -> DriverResult<String> {
    let sel = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{\n{}\nconst sel = {};\nreturn resolve(sel).map(describe);\n}})()",
        RESOLVER_JS, sel
    ))
}

/// Build an action script: resolve the first visible match and run `body` on `el`
fn action_script(selector: &Selector, body: &str, value: Option<&str>) -> DriverResult<String> {
    let sel = serde_json::to_string(selector)?;
    let value = serde_json::to_string(&value.unwrap_or(""))?;
    Ok(format!(
        "(() => {{\n{}\nconst sel = {};\nconst value = {};\nconst el = resolve(sel).find(isVisible);\nif (!el) return 'missing';\nif (el.disabled) return 'disabled';\n{}\n}})()",
        RESOLVER_JS, sel, value, body
    ))
}

/// Chromium-backed page
pub struct ChromePage {
    runtime: Runtime,
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    poll_interval: Duration,
}

impl ChromePage {
    /// Launch a browser and open a blank page
    pub fn launch(settings: &TargetSettings, poll_interval: Duration) -> DriverResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut builder = BrowserConfig::builder().window_size(settings.window_width, settings.window_height);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Unavailable)?;

        info!(headless = settings.headless, "launching browser");
        let (browser, mut handler) = runtime
            .block_on(Browser::launch(config))
            .map_err(|e| DriverError::Unavailable(format!("failed to launch browser: {}", e)))?;

        // Drive CDP events until the connection closes
        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = runtime
            .block_on(browser.new_page("about:blank"))
            .map_err(|e| DriverError::Unavailable(format!("failed to open page: {}", e)))?;

        Ok(Self {
            runtime,
            browser,
            page,
            handler,
            poll_interval,
        })
    }

    /// Block on a CDP future with an upper bound
    fn block<T>(
        &self,
        what: &str,
        timeout: Duration,
        fut: impl Future<Output = Result<T, CdpError>>,
    ) -> DriverResult<T> {
        match self.runtime.block_on(tokio::time::timeout(timeout, fut)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DriverError::Protocol(format!("{}: {}", what, e))),
            Err(_) => Err(DriverError::Timeout {
                action: what.to_string(),
                after: timeout,
            }),
        }
    }

    fn evaluate<T: serde::de::DeserializeOwned>(&self, what: &str, script: String, timeout: Duration) -> DriverResult<T> {
        let result = self.block(what, timeout, self.page.evaluate(script))?;
        Ok(result.into_value::<T>()?)
    }

    /// Run an action script until it reports done or the timeout elapses
    fn act(&mut self, what: String, script: String, timeout: Duration, selector: &Selector) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let status: String = self.evaluate(&what, script.clone(), remaining.max(self.poll_interval))?;
            match ActionStatus::parse(&status)? {
                ActionStatus::Done => return Ok(()),
                ActionStatus::Disabled => {
                    debug!(action = %what, "target is disabled; nothing to do");
                    return Ok(());
                }
                ActionStatus::Readonly => {
                    return Err(DriverError::Protocol(format!("{} is not editable", selector)));
                }
                ActionStatus::Missing => {}
            }
            if Instant::now() >= deadline {
                return Err(DriverError::NotFound {
                    selector: selector.to_string(),
                    waited: timeout,
                });
            }
            thread::sleep(self.poll_interval.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

impl PageDriver for ChromePage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        info!(%url, "navigating");
        let page = &self.page;
        let loaded = self.block("navigate", timeout, async move {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        });
        loaded.map_err(|e| DriverError::Unavailable(format!("{}: {}", url, e)))
    }

    fn query(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<Vec<ElementState>> {
        let script = query_script(selector)?;
        self.evaluate(&format!("query {}", selector), script, timeout.max(self.poll_interval))
    }

    fn fill(&mut self, selector: &Selector, value: &str, timeout: Duration) -> DriverResult<()> {
        let script = action_script(selector, FILL_JS, Some(value))?;
        self.act(format!("fill {}", selector), script, timeout, selector)
    }

    fn click(&mut self, selector: &Selector, timeout: Duration) -> DriverResult<()> {
        let script = action_script(selector, CLICK_JS, None)?;
        self.act(format!("click {}", selector), script, timeout, selector)
    }

    fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let params = ScreenshotParams::builder().full_page(true).build();
        self.block(
            "screenshot",
            SCREENSHOT_TIMEOUT,
            self.page.save_screenshot(params, path),
        )?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "chromium"
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        let browser = &mut self.browser;
        let _ = self
            .runtime
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), browser.close()).await });
        self.handler.abort();
    }
}
