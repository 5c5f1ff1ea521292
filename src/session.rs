//! Evidence sessions: one directory per run.
//!
//! Layout:
//! - `<base>/<run_id>/.session.json` run metadata
//! - `<base>/<run_id>/<scenario>/step_<NN>_<tag>.{png,json}` step evidence
//! - `<base>/<run_id>/<scenario>/outcome.json` per-scenario outcome
//! - `<base>/<run_id>/report.json` run report
//!
//! The directory is removed on drop unless the session is kept.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config;

/// An evidence session with organized file management
#[derive(Debug)]
pub struct Session {
    /// Unique run ID
    pub id: String,
    /// Root directory for this run
    pub dir: PathBuf,
    /// Whether to keep files after the session ends
    pub keep: bool,
}

impl Session {
    /// Create a session under the configured evidence directory
    pub fn new() -> Self {
        Self::in_base(config::evidence_base_dir())
    }

    /// Create a session under a specific base directory
    pub fn in_base(base: impl AsRef<Path>) -> Self {
        let id = generate_run_id();
        let dir = base.as_ref().join(&id);
        Self {
            id,
            dir,
            keep: false,
        }
    }

    /// Use a caller-chosen directory (kept by default)
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_run_id);
        Self {
            id,
            dir,
            keep: true,
        }
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    /// Create the run directory and write its metadata
    pub fn init(&self, base_url: &str, backend: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
            "host": host,
            "base_url": base_url,
            "backend": backend,
        });

        fs::write(self.dir.join(".session.json"), serde_json::to_string_pretty(&metadata)?)?;
        Ok(())
    }

    /// Directory holding one scenario's evidence
    pub fn scenario_dir(&self, scenario: &str) -> PathBuf {
        self.dir.join(sanitize_name(scenario))
    }

    /// Deterministic evidence path: `<scenario>/step_<NN>_<tag>.<ext>`
    pub fn evidence_path(&self, scenario: &str, step: usize, tag: &str, ext: &str) -> PathBuf {
        self.scenario_dir(scenario)
            .join(format!("step_{:02}_{}.{}", step, sanitize_name(tag), ext))
    }

    pub fn outcome_path(&self, scenario: &str) -> PathBuf {
        self.scenario_dir(scenario).join("outcome.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }

    /// Serialize `value` as pretty JSON, creating parent directories
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(value)?)
    }

    /// Clean up the session directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Run IDs sort chronologically
fn generate_run_id() -> String {
    format!(
        "run_{}_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S%3f"),
        std::process::id()
    )
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Remove sessions under `base` older than `max_age`
pub fn cleanup_old_sessions(base: impl AsRef<Path>, max_age: Duration) -> std::io::Result<usize> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) && fs::remove_dir_all(&path).is_ok() {
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

/// List all existing sessions under `base`
pub fn list_sessions(base: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_in_base() {
        let base = tempfile::tempdir().unwrap();
        let session = Session::in_base(base.path());
        assert!(session.id.starts_with("run_"));
        assert!(session.dir.starts_with(base.path()));
        assert!(!session.keep);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("search: cerebellar"), "search__cerebellar");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_evidence_path_is_deterministic() {
        let session = Session::in_dir("/tmp/viewer-probe/run_x");
        assert_eq!(
            session.evidence_path("search_creates_highlights", 3, "failure", "png"),
            PathBuf::from("/tmp/viewer-probe/run_x/search_creates_highlights/step_03_failure.png")
        );
        assert_eq!(
            session.outcome_path("pagination"),
            PathBuf::from("/tmp/viewer-probe/run_x/pagination/outcome.json")
        );
    }

    #[test]
    fn test_drop_removes_unkept_session() {
        let base = tempfile::tempdir().unwrap();
        let dir = {
            let session = Session::in_base(base.path());
            session.init("http://stub/", "stub").unwrap();
            assert!(session.dir.join(".session.json").exists());
            session.dir.clone()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_list_and_cleanup() {
        let base = tempfile::tempdir().unwrap();
        let session = Session::in_base(base.path()).keep(true);
        session.init("http://stub/", "stub").unwrap();

        let sessions = list_sessions(base.path()).unwrap();
        assert_eq!(sessions, vec![session.dir.clone()]);

        assert_eq!(cleanup_old_sessions(base.path(), Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cleanup_old_sessions(base.path(), Duration::ZERO).unwrap(), 1);
        assert!(list_sessions(base.path()).unwrap().is_empty());
    }
}
