use crate::error::LoaderError;
use crate::model::Props;
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::Notify;

/// Per-attempt cancellation handle. Clones share state; cancelling any clone cancels all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// What a loader is asked to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub pathname: String,
    pub search: String,
}

/// Explicit result of a loader run.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(Props),
    Cancelled,
    Failed(LoaderError),
}

/// Asynchronous data step of a page.
///
/// Implementations should return `LoadOutcome::Cancelled` as soon as they notice the token was
/// cancelled; the controller discards whatever they return after that anyway.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, req: &LoadRequest, token: &CancellationToken) -> LoadOutcome;
}

/// Drive a loader under its token and an optional timeout.
///
/// Cancellation wins over any other result; the loader future is dropped as soon as the
/// token fires. A timeout is reported as a failure, not as a cancellation.
pub(crate) async fn run_loader(
    loader: Arc<dyn PageLoader>,
    req: LoadRequest,
    token: CancellationToken,
    timeout: Option<Duration>,
) -> LoadOutcome {
    let work = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, loader.load(&req, &token)).await {
                Ok(outcome) => outcome,
                Err(_) => LoadOutcome::Failed(LoaderError::TimedOut(limit)),
            },
            None => loader.load(&req, &token).await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => LoadOutcome::Cancelled,
        outcome = work => outcome,
    }
}

/// Loader that answers with canned props after a delay. Used for config-defined demo routes.
#[derive(Debug, Clone, Default)]
pub struct FixtureLoader {
    pub delay: Duration,
    pub props: Props,
    pub fail: Option<String>,
}

#[async_trait]
impl PageLoader for FixtureLoader {
    async fn load(&self, _req: &LoadRequest, token: &CancellationToken) -> LoadOutcome {
        tokio::select! {
            _ = token.cancelled() => return LoadOutcome::Cancelled,
            _ = tokio::time::sleep(self.delay) => {}
        }
        match &self.fail {
            Some(msg) => LoadOutcome::Failed(LoaderError::Failed(msg.clone())),
            None => LoadOutcome::Loaded(self.props.clone()),
        }
    }
}

/// Loader that fetches page props as a JSON object from `{base}/api/pages{pathname}{search}`.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLoader {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, req: &LoadRequest) -> String {
        format!(
            "{}/api/pages{}{}",
            self.base_url.trim_end_matches('/'),
            req.pathname,
            req.search
        )
    }
}

#[async_trait]
impl PageLoader for HttpLoader {
    async fn load(&self, req: &LoadRequest, token: &CancellationToken) -> LoadOutcome {
        let url = self.url_for(req);
        let fetch = async {
            let resp = self.http.get(&url).send().await?.error_for_status()?;
            resp.json::<serde_json::Value>().await
        };

        tokio::select! {
            _ = token.cancelled() => LoadOutcome::Cancelled,
            res = fetch => match res {
                Ok(serde_json::Value::Object(props)) => LoadOutcome::Loaded(props),
                Ok(other) => LoadOutcome::Failed(LoaderError::Failed(format!(
                    "{url} returned {}, expected a JSON object",
                    json_kind(&other)
                ))),
                Err(e) => LoadOutcome::Failed(e.into()),
            },
        }
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{self, CannedServer};
    use serde_json::json;

    struct NeverLoader;

    #[async_trait]
    impl PageLoader for NeverLoader {
        async fn load(&self, _req: &LoadRequest, _token: &CancellationToken) -> LoadOutcome {
            futures::future::pending().await
        }
    }

    fn req(path: &str) -> LoadRequest {
        LoadRequest {
            pathname: path.into(),
            search: String::new(),
        }
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
        // Already cancelled: returns immediately.
        token.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fixture_loader_returns_props_after_delay() {
        let mut props = Props::new();
        props.insert("team".into(), json!("core"));
        let loader = Arc::new(FixtureLoader {
            delay: Duration::from_millis(300),
            props: props.clone(),
            fail: None,
        });
        let outcome = run_loader(loader, req("/teams"), CancellationToken::new(), None).await;
        assert_eq!(outcome, LoadOutcome::Loaded(props));
    }

    #[tokio::test(start_paused = true)]
    async fn fixture_loader_reports_configured_failure() {
        let loader = Arc::new(FixtureLoader {
            fail: Some("backend down".into()),
            ..Default::default()
        });
        let outcome = run_loader(loader, req("/teams"), CancellationToken::new(), None).await;
        assert_eq!(
            outcome,
            LoadOutcome::Failed(LoaderError::Failed("backend down".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_loader_times_out_as_failure() {
        let limit = Duration::from_secs(5);
        let outcome = run_loader(
            Arc::new(NeverLoader),
            req("/slow"),
            CancellationToken::new(),
            Some(limit),
        )
        .await;
        assert_eq!(outcome, LoadOutcome::Failed(LoaderError::TimedOut(limit)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_beats_a_loader_that_ignores_its_token() {
        let token = CancellationToken::new();
        let task = tokio::spawn(run_loader(
            Arc::new(NeverLoader),
            req("/slow"),
            token.clone(),
            None,
        ));
        tokio::task::yield_now().await;
        token.cancel();
        assert_eq!(task.await.unwrap(), LoadOutcome::Cancelled);
    }

    #[test]
    fn http_loader_builds_page_url() {
        let loader = HttpLoader::new(reqwest::Client::new(), "https://example.test/");
        let url = loader.url_for(&LoadRequest {
            pathname: "/teams/overview".into(),
            search: "?tab=members".into(),
        });
        assert_eq!(url, "https://example.test/api/pages/teams/overview?tab=members");
    }

    #[tokio::test]
    async fn http_loader_returns_json_object_as_props() {
        let server = CannedServer::respond(200, r#"{"team":"core","members":3}"#).await;
        let loader = HttpLoader::new(test_server::client(), &server.base_url);
        let outcome = loader.load(&req("/teams"), &CancellationToken::new()).await;

        let mut props = Props::new();
        props.insert("team".into(), json!("core"));
        props.insert("members".into(), json!(3));
        assert_eq!(outcome, LoadOutcome::Loaded(props));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn http_loader_rejects_non_object_body() {
        let server = CannedServer::respond(200, "[1, 2]").await;
        let loader = HttpLoader::new(test_server::client(), &server.base_url);
        match loader.load(&req("/teams"), &CancellationToken::new()).await {
            LoadOutcome::Failed(LoaderError::Failed(msg)) => {
                assert!(msg.ends_with("returned an array, expected a JSON object"), "{msg}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_loader_maps_server_error_to_http_failure() {
        let server = CannedServer::respond(503, r#"{"error":"down"}"#).await;
        let loader = HttpLoader::new(test_server::client(), &server.base_url);
        match loader.load(&req("/teams"), &CancellationToken::new()).await {
            LoadOutcome::Failed(LoaderError::Http(msg)) => assert!(msg.contains("503"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_loader_stops_waiting_when_cancelled() {
        let server = CannedServer::hang().await;
        let loader = HttpLoader::new(test_server::client(), &server.base_url);
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            tokio::spawn(async move { loader.load(&req("/teams"), &token).await })
        };

        server.wait_for_hits(1).await;
        token.cancel();
        assert_eq!(task.await.unwrap(), LoadOutcome::Cancelled);
    }
}
