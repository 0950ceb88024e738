//! One-shot fetch of global session data.
//!
//! The gate runs its source at most once per process (including retries) and caches the
//! settled result. Until it settles every screen is the "initializing" placeholder; a failure
//! is permanent and shown as a fatal boot screen.

use crate::error::BootstrapError;
use crate::model::{BootstrapState, GlobalData, InfoEvent, NavEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use rand::Rng;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

/// Where global data comes from.
#[async_trait]
pub trait BootstrapSource: Send + Sync {
    async fn fetch(&self) -> Result<GlobalData>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// `GET {base}/api/global`.
pub struct HttpBootstrapSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBootstrapSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/api/global", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl BootstrapSource for HttpBootstrapSource {
    async fn fetch(&self) -> Result<GlobalData> {
        let url = self.url();
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        let data = resp.json::<GlobalData>().await?;
        Ok(data)
    }

    fn describe(&self) -> String {
        self.url()
    }
}

/// JSON fixture on disk.
pub struct FileBootstrapSource {
    path: PathBuf,
}

impl FileBootstrapSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BootstrapSource for FileBootstrapSource {
    async fn fetch(&self) -> Result<GlobalData> {
        let path = self.path.clone();
        let raw = tokio::task::spawn_blocking(move || std::fs::read_to_string(&path))
            .await
            .context("global data reader task failed")?
            .with_context(|| format!("read {}", self.path.display()))?;
        let data = serde_json::from_str(&raw)?;
        Ok(data)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fixed data, e.g. an anonymous session when nothing is configured.
pub struct StaticBootstrapSource(pub GlobalData);

#[async_trait]
impl BootstrapSource for StaticBootstrapSource {
    async fn fetch(&self) -> Result<GlobalData> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "built-in".into()
    }
}

/// Malformed payloads are not worth retrying.
fn is_decode_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<serde_json::Error>().is_some()
        || e
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|re| re.is_decode())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts, at least one.
    pub attempts: u32,
    /// Delay before the second attempt; doubles after that.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based), with up to 25% jitter.
    fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let jitter_ms = (base.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Read-mostly holder of `GlobalData` with change notification.
#[derive(Debug, Clone)]
pub struct GlobalStore {
    tx: Arc<watch::Sender<GlobalData>>,
}

impl Default for GlobalStore {
    fn default() -> Self {
        Self::new(GlobalData::default())
    }
}

impl GlobalStore {
    pub fn new(initial: GlobalData) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> GlobalData {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<crate::model::User> {
        self.tx.borrow().current_user.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GlobalData> {
        self.tx.subscribe()
    }

    /// Apply `f`; subscribers are notified only if the data actually changed.
    pub fn update(&self, f: impl FnOnce(&mut GlobalData)) -> bool {
        self.tx.send_if_modified(|data| {
            let before = data.clone();
            f(data);
            *data != before
        })
    }

    pub fn replace(&self, data: GlobalData) -> bool {
        self.update(|current| *current = data)
    }
}

pub struct BootstrapGate {
    source: Arc<dyn BootstrapSource>,
    policy: RetryPolicy,
    store: GlobalStore,
    state_tx: watch::Sender<BootstrapState>,
    event_tx: Option<UnboundedSender<NavEvent>>,
    fetch: OnceLock<Shared<BoxFuture<'static, Result<(), BootstrapError>>>>,
}

impl BootstrapGate {
    pub fn new(source: Arc<dyn BootstrapSource>, policy: RetryPolicy, store: GlobalStore) -> Self {
        let (state_tx, _) = watch::channel(BootstrapState::Pending);
        Self {
            source,
            policy,
            store,
            state_tx,
            event_tx: None,
            fetch: OnceLock::new(),
        }
    }

    /// Also report state changes and retries on the event channel.
    pub fn with_events(mut self, event_tx: UnboundedSender<NavEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }

    pub fn state(&self) -> watch::Receiver<BootstrapState> {
        self.state_tx.subscribe()
    }

    /// Fetch global data unless that already happened; concurrent callers share one fetch.
    ///
    /// The fetch runs on its own task, so a caller dropping this future mid-fetch does not
    /// abandon it and later callers pick up the same result.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), BootstrapError> {
        self.fetch
            .get_or_init(|| {
                let gate = Arc::clone(self);
                let task = tokio::spawn(async move { gate.fetch_with_retry().await });
                async move {
                    task.await.unwrap_or_else(|e| {
                        Err(BootstrapError::Fetch {
                            attempts: 0,
                            message: format!("bootstrap task failed: {e}"),
                        })
                    })
                }
                .boxed()
                .shared()
            })
            .clone()
            .await
    }

    async fn fetch_with_retry(&self) -> Result<(), BootstrapError> {
        let max = self.policy.attempts.max(1);
        tracing::info!(source = %self.source.describe(), "fetching global data");

        let mut attempt = 0;
        let err = loop {
            attempt += 1;
            match self.source.fetch().await {
                Ok(data) => {
                    tracing::info!(
                        attempt,
                        user = data.current_user.as_ref().map(|u| u.id.as_str()),
                        "global data ready"
                    );
                    self.store.replace(data);
                    self.set_state(BootstrapState::Ready);
                    return Ok(());
                }
                Err(e) if is_decode_error(&e) => {
                    break BootstrapError::Decode(format!("{e:#}"));
                }
                Err(e) => {
                    tracing::warn!(attempt, max, error = %format!("{e:#}"), "global data fetch failed");
                    self.emit(NavEvent::Info(InfoEvent::BootstrapRetry {
                        attempt,
                        max,
                        error: format!("{e:#}"),
                    }));
                    if attempt >= max {
                        break BootstrapError::Fetch {
                            attempts: attempt,
                            message: format!("{e:#}"),
                        };
                    }
                    tokio::time::sleep(self.policy.delay_after(attempt)).await;
                }
            }
        };

        tracing::error!(error = %err, "bootstrap failed");
        self.set_state(BootstrapState::Failed {
            message: err.to_string(),
        });
        Err(err)
    }

    fn set_state(&self, state: BootstrapState) {
        self.state_tx.send_replace(state.clone());
        self.emit(NavEvent::Bootstrap(state));
    }

    fn emit(&self, ev: NavEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}
