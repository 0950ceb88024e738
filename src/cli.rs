use crate::config::{build_config, load_file_config, AppConfig};
use crate::model::{BootstrapState, Location, NavEvent, ProgressSignal, SessionReport};
use crate::orchestrator::{NavCommand, Session};
use crate::presentation::context::ContextStack;
use crate::presentation::{select_screen, PageHost};
use crate::theme::select_theme;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "navctl",
    version,
    about = "Navigation controller with async page loading and optional TUI"
)]
pub struct Cli {
    /// Locations to visit in order, e.g. /account/delete or "/teams?tab=2"
    pub routes: Vec<String>,

    /// Config file (default: <config dir>/navctl/config.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Backend base URL for global data and HTTP page loaders
    #[arg(long)]
    pub api_base: Option<String>,

    /// Read global data from a JSON file instead of the backend
    #[arg(long)]
    pub global_data: Option<PathBuf>,

    /// Theme preference (light or dark); public pages ignore it
    #[arg(long)]
    pub theme: Option<String>,

    /// Give up on a page loader after this long ("0s" disables the limit)
    #[arg(long)]
    pub loader_timeout: Option<humantime::Duration>,

    /// Attempts at fetching global data before giving up
    #[arg(long)]
    pub bootstrap_attempts: Option<u32>,

    /// Delay before the first bootstrap retry; doubles on each retry
    #[arg(long)]
    pub bootstrap_backoff: Option<humantime::Duration>,

    /// Support widget app id; the widget is not loaded without one
    #[arg(long)]
    pub support_app_id: Option<String>,

    /// Pause between scripted navigations
    #[arg(long, default_value = "0s")]
    pub step_delay: humantime::Duration,

    /// How long to wait for the last navigation to settle
    #[arg(long, default_value = "30s")]
    pub settle_timeout: humantime::Duration,

    /// Print a JSON session report and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print events and a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !self.json && !self.text && cfg!(feature = "tui")
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let file = load_file_config(args.config.as_deref())?;
    let cfg = build_config(&args, file);

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, cfg).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args, cfg).await;
        }
    }

    if args.json {
        return run_json(args, cfg).await;
    }

    run_text(args, cfg).await
}

/// Scripted locations; the site root when none are given.
pub fn script_locations(args: &Cli) -> Vec<Location> {
    if args.routes.is_empty() {
        return vec![Location::parse("/")];
    }
    args.routes.iter().map(|r| Location::parse(r)).collect()
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format timestamp")
}

/// One human-readable line per event.
fn describe_event(ev: &NavEvent) -> String {
    match ev {
        NavEvent::Bootstrap(BootstrapState::Pending) => "Fetching global data...".into(),
        NavEvent::Bootstrap(BootstrapState::Ready) => "Global data ready".into(),
        NavEvent::Bootstrap(BootstrapState::Failed { message }) => {
            format!("Global data failed: {message}")
        }
        NavEvent::Progress(ProgressSignal::Started { attempt, location }) => {
            format!("-> #{attempt} {location}")
        }
        NavEvent::Progress(ProgressSignal::Settled(r)) => format!(
            "<- #{} {} {} in {} ms",
            r.attempt,
            r.location,
            r.resolution.as_str(),
            r.elapsed_ms
        ),
        NavEvent::Outcome { outcome, .. } => format!("   {}", outcome.label()),
        NavEvent::Info(info) => info.to_message(),
    }
}

/// Drive one session through the scripted locations and report where it ended up.
async fn run_script(
    args: &Cli,
    cfg: &AppConfig,
    echo: Option<mpsc::UnboundedSender<OutputLine>>,
) -> Result<SessionReport> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<NavEvent>();
    let session = Session::new(cfg, event_tx)?;
    let outcomes = session.outcomes();
    let boot = session.bootstrap_state();
    let store = session.store();

    let collector = tokio::spawn(async move {
        let mut attempts = Vec::new();
        while let Some(ev) = event_rx.recv().await {
            if let Some(tx) = echo.as_ref() {
                let _ = tx.send(OutputLine::Stderr(describe_event(&ev)));
            }
            if let NavEvent::Progress(ProgressSignal::Settled(record)) = ev {
                attempts.push(record);
            }
        }
        attempts
    });

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let session_task = tokio::spawn(session.run(cmd_rx));

    let locations = script_locations(args);
    let step_delay = Duration::from(args.step_delay);
    let script_tx = cmd_tx.clone();
    let script = async move {
        for (idx, location) in locations.into_iter().enumerate() {
            if idx > 0 && !step_delay.is_zero() {
                tokio::time::sleep(step_delay).await;
            }
            let _ = script_tx.send(NavCommand::Navigate(location));
        }
        let (tx, rx) = oneshot::channel();
        let _ = script_tx.send(NavCommand::WhenSettled(tx));
        // Err: the session halted before settling (bootstrap failure).
        rx.await.ok()
    };

    let interrupted = tokio::select! {
        res = tokio::time::timeout(Duration::from(args.settle_timeout), script) => match res {
            Ok(_) => false,
            Err(_) => {
                tracing::warn!(timeout = %args.settle_timeout, "navigation did not settle in time");
                true
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            true
        }
    };

    let _ = cmd_tx.send(NavCommand::Quit);
    session_task.await.context("session task failed")??;
    let attempts = collector.await.context("event collector failed")?;

    let bootstrap = boot.borrow().clone();
    let outcome = outcomes.borrow().clone();
    let location = attempts.last().map(|a| a.location.clone());
    let user = store.snapshot().current_user;
    let theme = select_theme(
        location.as_ref().map_or("/", |l| l.pathname.as_str()),
        cfg.theme.as_deref(),
    );
    let screen = select_screen(&bootstrap, &outcome, theme);

    let mut host = PageHost::new(ContextStack::standard());
    host.present(&screen, location.as_ref(), user.as_ref())?;
    let scaffold = if host.is_mounted() {
        host.scaffold()
    } else {
        Vec::new()
    };

    Ok(SessionReport {
        timestamp: now_rfc3339()?,
        bootstrap,
        user,
        location,
        attempts,
        outcome,
        theme: screen.theme(),
        screen,
        scaffold,
        interrupted,
    })
}

fn ensure_booted(report: &SessionReport) -> Result<()> {
    match &report.bootstrap {
        BootstrapState::Failed { message } => {
            Err(anyhow::anyhow!("could not fetch global data: {message}"))
        }
        _ => Ok(()),
    }
}

async fn run_json(args: Cli, cfg: AppConfig) -> Result<()> {
    let report = run_script(&args, &cfg, None).await?;
    let (out_tx, out_handle) = spawn_output_writer();
    let out = serde_json::to_string_pretty(&report)?;
    let _ = out_tx.send(OutputLine::Stdout(out));
    drop(out_tx);
    let _ = out_handle.await;
    ensure_booted(&report)
}

async fn run_text(args: Cli, cfg: AppConfig) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let report = run_script(&args, &cfg, Some(out_tx.clone())).await?;

    let summary = crate::text_summary::build_text_summary(&report);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    ensure_booted(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptRecord, InfoEvent, Resolution};

    fn cli(argv: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("navctl").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults_to_site_root() {
        let args = cli(&[]);
        assert_eq!(script_locations(&args), [Location::parse("/")]);
        assert_eq!(Duration::from(args.step_delay), Duration::ZERO);
        assert_eq!(Duration::from(args.settle_timeout), Duration::from_secs(30));
    }

    #[test]
    fn positional_routes_keep_order_and_query() {
        let args = cli(&["/r1", "/teams?tab=2", "-vv"]);
        assert_eq!(
            script_locations(&args),
            [Location::parse("/r1"), Location::new("/teams", "?tab=2")]
        );
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn json_and_text_conflict() {
        assert!(Cli::try_parse_from(["navctl", "--json", "--text"]).is_err());
        assert!(!cli(&["--json"]).is_interactive());
    }

    #[test]
    fn events_render_as_lines() {
        let settled = NavEvent::Progress(ProgressSignal::Settled(AttemptRecord {
            attempt: 2,
            location: Location::parse("/teams"),
            page: None,
            resolution: Resolution::TimedOut,
            elapsed_ms: 3000,
        }));
        assert_eq!(describe_event(&settled), "<- #2 /teams timed out in 3000 ms");
        let info = NavEvent::Info(InfoEvent::Superseded {
            attempt: 1,
            location: Location::parse("/r1"),
        });
        assert_eq!(describe_event(&info), "Navigation #1 to /r1 aborted");
    }

    #[tokio::test]
    async fn scripted_session_reports_final_page() {
        let args = cli(&["--support-app-id", "", "/desktop/login", "/account/delete"]);
        let cfg = build_config(&args, Default::default());
        let report = run_script(&args, &cfg, None).await.unwrap();

        assert_eq!(report.bootstrap, BootstrapState::Ready);
        assert!(!report.interrupted);
        assert_eq!(report.location, Some(Location::parse("/account/delete")));
        assert_eq!(report.attempts.len(), 2);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.resolution == Resolution::Resolved));
        assert_eq!(report.screen.title(), "AccountDelete");
        assert_eq!(report.scaffold.first().map(String::as_str), Some("page-data"));
        assert!(ensure_booted(&report).is_ok());
    }
}
