//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for viewer-probe, supporting:
//! - Environment variables for all configurable values
//! - Defaults tuned for a local Vite dev server hosting the viewer
//! - Builder-style overrides for programmatic configuration
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `VIEWER_PROBE_BASE_URL` | URL of the viewer under test | `http://localhost:5173` |
//! | `VIEWER_PROBE_EVIDENCE_DIR` | Base directory for evidence sessions | `/tmp/viewer-probe` |
//! | `VIEWER_PROBE_TIMEOUT_MS` | Default element wait (ms) | `10000` |
//! | `VIEWER_PROBE_ACTION_TIMEOUT_MS` | Click/fill timeout (ms) | `5000` |
//! | `VIEWER_PROBE_POLL_MS` | Poll interval for waits (ms) | `100` |
//! | `VIEWER_PROBE_QUIET_MS` | Quiescence window for settling (ms) | `750` |
//! | `VIEWER_PROBE_SETTLE_TIMEOUT_MS` | Upper bound on settling (ms) | `8000` |
//! | `VIEWER_PROBE_SCENARIO_TIMEOUT_SECS` | Overall scenario timeout (s) | `120` |
//! | `VIEWER_PROBE_RETRY_BACKOFF_MS` | Backoff before the action retry (ms) | `250` |
//! | `VIEWER_PROBE_HEADLESS` | Run the browser headless | `true` |
//! | `VIEWER_PROBE_WINDOW` | Browser window size `WxH` | `1440x900` |
//!
//! # Example
//!
//! ```bash
//! export VIEWER_PROBE_BASE_URL="http://localhost:4173"
//! export VIEWER_PROBE_QUIET_MS=1200
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default URL of the viewer under test
pub const DEFAULT_BASE_URL: &str = "http://localhost:5173";

/// Default evidence base directory
pub const DEFAULT_EVIDENCE_DIR: &str = "/tmp/viewer-probe";

/// Default element wait (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default click/fill timeout (milliseconds)
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 5_000;

/// Default poll interval (milliseconds)
pub const DEFAULT_POLL_MS: u64 = 100;

/// Default quiescence window (milliseconds)
pub const DEFAULT_QUIET_MS: u64 = 750;

/// Default settle upper bound (milliseconds)
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 8_000;

/// Default overall scenario timeout (seconds)
pub const DEFAULT_SCENARIO_TIMEOUT_SECS: u64 = 120;

/// Default backoff before retrying a timed-out action (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Default browser window width
pub const DEFAULT_WINDOW_WIDTH: u32 = 1440;

/// Default browser window height
pub const DEFAULT_WINDOW_HEIGHT: u32 = 900;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BASE_URL: &str = "VIEWER_PROBE_BASE_URL";
pub const ENV_EVIDENCE_DIR: &str = "VIEWER_PROBE_EVIDENCE_DIR";
pub const ENV_TIMEOUT_MS: &str = "VIEWER_PROBE_TIMEOUT_MS";
pub const ENV_ACTION_TIMEOUT_MS: &str = "VIEWER_PROBE_ACTION_TIMEOUT_MS";
pub const ENV_POLL_MS: &str = "VIEWER_PROBE_POLL_MS";
pub const ENV_QUIET_MS: &str = "VIEWER_PROBE_QUIET_MS";
pub const ENV_SETTLE_TIMEOUT_MS: &str = "VIEWER_PROBE_SETTLE_TIMEOUT_MS";
pub const ENV_SCENARIO_TIMEOUT_SECS: &str = "VIEWER_PROBE_SCENARIO_TIMEOUT_SECS";
pub const ENV_RETRY_BACKOFF_MS: &str = "VIEWER_PROBE_RETRY_BACKOFF_MS";
pub const ENV_HEADLESS: &str = "VIEWER_PROBE_HEADLESS";
pub const ENV_WINDOW: &str = "VIEWER_PROBE_WINDOW";

/// Log filter variable read by the binary (tracing `EnvFilter` syntax)
pub const ENV_LOG: &str = "VIEWER_PROBE_LOG";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for viewer-probe
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the viewer lives and how the browser is launched
    pub target: TargetSettings,
    /// Wait, poll and retry timing
    pub timing: Timing,
    /// Evidence sink settings
    pub evidence: EvidenceSettings,
}

/// Target application and browser settings
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub base_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

/// Bounded-wait parameters shared by every component.
///
/// Every wait in the harness is derived from one of these values; nothing
/// blocks without an upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long `PageProbe::locate` waits for an element
    pub element_timeout: Duration,
    /// How long a click or fill may take
    pub action_timeout: Duration,
    /// Interval between polls
    pub poll_interval: Duration,
    /// How long the settle signal must stay unchanged
    pub quiet_window: Duration,
    /// Upper bound on waiting for a settle
    pub settle_timeout: Duration,
    /// Overall scenario budget
    pub scenario_timeout: Duration,
    /// Pause before retrying a timed-out action
    pub retry_backoff: Duration,
}

/// Evidence sink settings
#[derive(Debug, Clone)]
pub struct EvidenceSettings {
    /// Base directory for run sessions
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            target: TargetSettings::from_env(),
            timing: Timing::from_env(),
            evidence: EvidenceSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            target: TargetSettings::defaults(),
            timing: Timing::defaults(),
            evidence: EvidenceSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TargetSettings {
    pub fn from_env() -> Self {
        let (window_width, window_height) = env::var(ENV_WINDOW)
            .ok()
            .and_then(|s| parse_window_size(&s))
            .unwrap_or((DEFAULT_WINDOW_WIDTH, DEFAULT_WINDOW_HEIGHT));

        Self {
            base_url: env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
            window_width,
            window_height,
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

impl Timing {
    pub fn from_env() -> Self {
        Self {
            element_timeout: millis_from_env(ENV_TIMEOUT_MS, DEFAULT_TIMEOUT_MS),
            action_timeout: millis_from_env(ENV_ACTION_TIMEOUT_MS, DEFAULT_ACTION_TIMEOUT_MS),
            poll_interval: millis_from_env(ENV_POLL_MS, DEFAULT_POLL_MS),
            quiet_window: millis_from_env(ENV_QUIET_MS, DEFAULT_QUIET_MS),
            settle_timeout: millis_from_env(ENV_SETTLE_TIMEOUT_MS, DEFAULT_SETTLE_TIMEOUT_MS),
            scenario_timeout: Duration::from_secs(
                env::var(ENV_SCENARIO_TIMEOUT_SECS)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SCENARIO_TIMEOUT_SECS),
            ),
            retry_backoff: millis_from_env(ENV_RETRY_BACKOFF_MS, DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            element_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            action_timeout: Duration::from_millis(DEFAULT_ACTION_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            quiet_window: Duration::from_millis(DEFAULT_QUIET_MS),
            settle_timeout: Duration::from_millis(DEFAULT_SETTLE_TIMEOUT_MS),
            scenario_timeout: Duration::from_secs(DEFAULT_SCENARIO_TIMEOUT_SECS),
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Short timings for driving the in-process stub viewer
    pub fn fast() -> Self {
        Self {
            element_timeout: Duration::from_millis(300),
            action_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            quiet_window: Duration::from_millis(60),
            settle_timeout: Duration::from_millis(1_000),
            scenario_timeout: Duration::from_secs(20),
            retry_backoff: Duration::from_millis(10),
        }
    }

    pub fn with_scenario_timeout(mut self, timeout: Duration) -> Self {
        self.scenario_timeout = timeout;
        self
    }

    pub fn with_quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window = window;
        self
    }
}

impl Default for Timing {
    fn default() -> Self {
        get().timing
    }
}

impl EvidenceSettings {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_EVIDENCE_DIR).unwrap_or_else(|_| DEFAULT_EVIDENCE_DIR.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_EVIDENCE_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn millis_from_env(var: &str, default: u64) -> Duration {
    Duration::from_millis(
        env::var(var)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a window size string of the form "WxH"
pub fn parse_window_size(size: &str) -> Option<(u32, u32)> {
    let lower = size.trim().to_lowercase();
    let (w, h) = lower.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

/// Get evidence base directory (convenience function)
pub fn evidence_base_dir() -> String {
    get().evidence.base_dir.clone()
}
