//! `tracing` subscriber setup.
//!
//! Text and JSON modes log to stderr. The TUI owns the terminal, so in that mode logs are
//! appended to `<data_dir>/navctl/navctl.log` instead.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

/// 0 = info, 1 = debug, 2+ = trace.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("navctl").join("navctl.log"))
}

/// Install the global subscriber. Returns the log file path when logging to a file.
pub fn init(verbosity: u8, target: LogTarget) -> Result<Option<PathBuf>> {
    let filter = build_env_filter(level_for(verbosity));
    let path = match target {
        LogTarget::File => log_file_path(),
        LogTarget::Stderr => None,
    };

    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_writer(SharedFileWriter::new(file))
                .with_ansi(false)
                .with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .context("install log subscriber")?;
            Ok(Some(path))
        }
        None => {
            let layer = fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .context("install log subscriber")?;
            Ok(None)
        }
    }
}

/// `RUST_LOG` wins over the verbosity flag. Dependencies stay at `warn`.
fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,navctl={}",
            level.as_str().to_lowercase()
        ))
    })
}

#[derive(Clone)]
struct SharedFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl SharedFileWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

struct SharedFileGuard {
    file: Arc<Mutex<std::fs::File>>,
}

impl Write for SharedFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        guard.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard {
            file: Arc::clone(&self.file),
        }
    }
}
