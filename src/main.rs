use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use viewer_probe::config::{self, ENV_LOG, TargetSettings, parse_window_size};
use viewer_probe::{
    ChromePage, PageDriver, PageProbe, RunReport, ScenarioRunner, Session, StubPage, Suite, cleanup_old_sessions,
    list_sessions,
};

/// viewer-probe - UI-driven verification of a PDF viewer's search and highlights
#[derive(Parser, Debug)]
#[command(
    name = "viewer-probe",
    about = "Drive a PDF viewer in a browser and verify search, highlight and pagination behavior",
    after_help = "ENVIRONMENT VARIABLES:\n\
        VIEWER_PROBE_BASE_URL                 URL of the viewer under test\n\
        VIEWER_PROBE_EVIDENCE_DIR             Base directory for evidence sessions\n\
        VIEWER_PROBE_TIMEOUT_MS               Element wait (ms)\n\
        VIEWER_PROBE_ACTION_TIMEOUT_MS        Click/fill timeout (ms)\n\
        VIEWER_PROBE_POLL_MS                  Poll interval (ms)\n\
        VIEWER_PROBE_QUIET_MS                 Settle quiescence window (ms), must exceed the search debounce\n\
        VIEWER_PROBE_SETTLE_TIMEOUT_MS        Settle upper bound (ms)\n\
        VIEWER_PROBE_SCENARIO_TIMEOUT_SECS    Scenario timeout (s)\n\
        VIEWER_PROBE_RETRY_BACKOFF_MS         Backoff before retrying a timed-out action (ms)\n\
        VIEWER_PROBE_HEADLESS                 Run the browser headless\n\
        VIEWER_PROBE_WINDOW                   Browser window size WxH\n\
        VIEWER_PROBE_LOG                      Log filter (e.g. info, viewer_probe=debug)"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios against the viewer
    Run {
        /// URL of the viewer under test
        #[arg(short, long, env = "VIEWER_PROBE_BASE_URL", default_value = config::DEFAULT_BASE_URL)]
        base_url: String,

        /// TOML suite file (default: built-in scenarios)
        #[arg(short, long)]
        suite: Option<PathBuf>,

        /// Only run the named scenario(s)
        #[arg(long = "scenario", value_delimiter = ',')]
        scenarios: Vec<String>,

        /// Evidence directory (default: auto-generated in the evidence base dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep evidence even when every scenario passes
        #[arg(long, short = 'k')]
        keep: bool,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Browser window size WxH
        #[arg(long, env = "VIEWER_PROBE_WINDOW")]
        window: Option<String>,

        /// Drive the built-in simulated viewer instead of a browser
        #[arg(long)]
        stub: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenarios of the built-in suite or a suite file
    List {
        #[arg(short, long)]
        suite: Option<PathBuf>,
    },

    /// List evidence sessions
    Sessions,

    /// Delete evidence sessions older than the given age
    Clean {
        #[arg(long, default_value = "24")]
        older_than_hours: u64,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn load_suite(path: Option<&PathBuf>) -> Result<Suite, Box<dyn Error>> {
    Ok(match path {
        Some(path) => Suite::from_file(path)?,
        None => Suite::builtin(),
    })
}

fn print_report(report: &RunReport) {
    println!("Run {} against {} ({})", report.run_id, report.base_url, report.backend);
    for outcome in &report.outcomes {
        let mark = if outcome.passed { "PASS" } else { "FAIL" };
        println!("  [{}] {} ({} ms)", mark, outcome.name, outcome.duration_ms);
        for step in outcome.failed_steps() {
            if let Some(failure) = &step.failure {
                println!("      step {} '{}': {}", step.index, step.description, failure);
            }
        }
        if let Some(failure) = &outcome.failure {
            if outcome.failed_steps().all(|s| s.failure.as_ref() != Some(failure)) {
                println!("      {}", failure);
            }
        }
    }
    if let Some(reason) = &report.aborted {
        println!("  Run aborted: {}", reason);
    }
    let (passed, failed) = report.summary();
    println!("{} passed, {} failed", passed, failed);
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = Args::parse();
    let cfg = config::get();

    match args.command {
        Commands::Run {
            base_url,
            suite,
            scenarios,
            output,
            keep,
            headed,
            window,
            stub,
            json,
        } => {
            let suite = load_suite(suite.as_ref())?;
            let selected = suite.select(&scenarios)?;

            let driver: Box<dyn PageDriver> = if stub {
                Box::new(StubPage::sample())
            } else {
                let mut target = TargetSettings {
                    base_url: base_url.clone(),
                    headless: cfg.target.headless && !headed,
                    ..cfg.target.clone()
                };
                if let Some(size) = window {
                    let (w, h) = parse_window_size(&size)
                        .ok_or_else(|| format!("Invalid window size '{}'. Use WxH (e.g., 1440x900)", size))?;
                    target.window_width = w;
                    target.window_height = h;
                }
                Box::new(ChromePage::launch(&target, cfg.timing.poll_interval)?)
            };

            // Evidence is kept for failed runs, explicit output dirs and --keep
            let session = match &output {
                Some(dir) => Session::in_dir(dir),
                None => Session::new().keep(keep),
            };

            let probe = PageProbe::new(driver, cfg.timing);
            let mut runner = ScenarioRunner::new(probe, suite.contract.clone(), session, base_url)?;
            let report = runner.run_all(&selected)?;

            if !report.passed {
                runner.session_mut().set_keep(true);
            }
            if runner.session().keep {
                info!(dir = %runner.session().dir.display(), "evidence kept");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
                if runner.session().keep {
                    println!("Evidence: {}", runner.session().dir.display());
                }
            }

            if !report.passed {
                let (_, failed) = report.summary();
                return Err(match &report.aborted {
                    Some(reason) => reason.clone().into(),
                    None => format!("{} scenario(s) failed", failed).into(),
                });
            }
        }

        Commands::List { suite } => {
            let suite = load_suite(suite.as_ref())?;
            for scenario in &suite.scenarios {
                println!("{:<28} {} ({} steps)", scenario.name, scenario.description, scenario.steps.len());
            }
        }

        Commands::Sessions => {
            let base = config::evidence_base_dir();
            let sessions = list_sessions(&base)?;
            if sessions.is_empty() {
                println!("No sessions in {}", base);
            }
            for path in sessions {
                println!("{}", path.display());
            }
        }

        Commands::Clean { older_than_hours } => {
            let base = config::evidence_base_dir();
            let max_age = Duration::from_secs(older_than_hours * 3600);
            let cleaned = cleanup_old_sessions(&base, max_age)?;
            if cleaned > 0 {
                println!("Removed {} session(s) from {}", cleaned, base);
            } else {
                warn!(%base, older_than_hours, "no sessions old enough to remove");
            }
        }
    }

    Ok(())
}
