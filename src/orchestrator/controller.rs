//! Navigation controller.
//!
//! Sole writer of the published `NavigationOutcome`. Every location change starts a new
//! attempt; the previous attempt's token is cancelled first, so only the most recently issued
//! attempt can ever publish, whatever order loaders finish in.

use super::integrations::Integrations;
use crate::bootstrap::GlobalStore;
use crate::error::LoaderError;
use crate::model::{
    AttemptRecord, InfoEvent, Location, NavEvent, NavigationOutcome, ProgressSignal, Props,
    Resolution, ViewHandle,
};
use crate::router::loader::{run_loader, CancellationToken, LoadOutcome, LoadRequest};
use crate::router::RouteTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

/// Commands from the host environment (location source) or UI layers.
#[derive(Debug)]
pub enum NavCommand {
    Navigate(Location),
    /// Re-run the current location even though it did not change.
    Reload,
    /// Reply with the published outcome once no attempt is in flight.
    WhenSettled(oneshot::Sender<NavigationOutcome>),
    Quit,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// `None` lets a loader run forever.
    pub loader_timeout: Option<Duration>,
}

/// A loader task reporting back.
#[derive(Debug)]
pub(crate) struct Completion {
    attempt: u64,
    outcome: LoadOutcome,
}

/// The attempt whose loader is running.
struct InFlight {
    attempt: u64,
    location: Location,
    page: ViewHandle,
    token: CancellationToken,
    started: Instant,
}

pub struct NavigationController {
    routes: Arc<RouteTable>,
    cfg: ControllerConfig,
    store: GlobalStore,
    integrations: Arc<dyn Integrations>,
    outcome_tx: watch::Sender<NavigationOutcome>,
    event_tx: UnboundedSender<NavEvent>,
    done_tx: UnboundedSender<Completion>,
    done_rx: UnboundedReceiver<Completion>,
    next_attempt: u64,
    location: Option<Location>,
    in_flight: Option<InFlight>,
    /// Last `Resolved`/`NotFound`, shown again when a loader fails.
    last_settled: Option<NavigationOutcome>,
    waiters: Vec<oneshot::Sender<NavigationOutcome>>,
}

impl NavigationController {
    pub fn new(
        routes: Arc<RouteTable>,
        cfg: ControllerConfig,
        store: GlobalStore,
        integrations: Arc<dyn Integrations>,
        event_tx: UnboundedSender<NavEvent>,
    ) -> Self {
        let (outcome_tx, _) = watch::channel(NavigationOutcome::Idle);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            routes,
            cfg,
            store,
            integrations,
            outcome_tx,
            event_tx,
            done_tx,
            done_rx,
            next_attempt: 0,
            location: None,
            in_flight: None,
            last_settled: None,
            waiters: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationOutcome> {
        self.outcome_tx.subscribe()
    }

    pub fn outcome(&self) -> NavigationOutcome {
        self.outcome_tx.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Handle a location change. Identical consecutive locations are no-ops.
    pub fn navigate(&mut self, location: Location) {
        if self.location.as_ref() == Some(&location) {
            tracing::debug!(%location, "location unchanged; ignoring");
            self.emit(NavEvent::Info(InfoEvent::DuplicateIgnored { location }));
            return;
        }
        self.begin(location);
    }

    pub fn reload(&mut self) {
        if let Some(location) = self.location.clone() {
            self.begin(location);
        }
    }

    /// Apply one non-`Quit` command.
    pub(crate) fn handle(&mut self, cmd: NavCommand) {
        match cmd {
            NavCommand::Navigate(location) => self.navigate(location),
            NavCommand::Reload => self.reload(),
            NavCommand::WhenSettled(reply) => self.waiters.push(reply),
            NavCommand::Quit => {}
        }
        self.flush_waiters();
    }

    fn flush_waiters(&mut self) {
        if self.in_flight.is_some() || self.waiters.is_empty() {
            return;
        }
        let outcome = self.outcome();
        for reply in self.waiters.drain(..) {
            let _ = reply.send(outcome.clone());
        }
    }

    fn begin(&mut self, location: Location) {
        // Always before any new work: at most one live token.
        self.abort_in_flight();

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let started = Instant::now();
        self.location = Some(location.clone());
        tracing::debug!(attempt, %location, "navigate");
        self.emit(NavEvent::Progress(ProgressSignal::Started {
            attempt,
            location: location.clone(),
        }));

        let Some(descriptor) = self.routes.resolve(&location.pathname).cloned() else {
            self.publish(attempt, NavigationOutcome::NotFound);
            self.settle(attempt, location, None, Resolution::NotFound, started);
            return;
        };

        let Some(loader) = descriptor.loader else {
            self.publish(
                attempt,
                NavigationOutcome::Resolved {
                    view: descriptor.component.clone(),
                    props: Props::new(),
                },
            );
            self.settle(
                attempt,
                location,
                Some(descriptor.component),
                Resolution::Resolved,
                started,
            );
            return;
        };

        self.publish(attempt, NavigationOutcome::Loading);
        let token = CancellationToken::new();
        let req = LoadRequest {
            pathname: location.pathname.clone(),
            search: location.search.clone(),
        };
        let done_tx = self.done_tx.clone();
        let task_token = token.clone();
        let timeout = self.cfg.loader_timeout;
        tokio::spawn(async move {
            let outcome = run_loader(loader, req, task_token, timeout).await;
            let _ = done_tx.send(Completion { attempt, outcome });
        });

        self.in_flight = Some(InFlight {
            attempt,
            location,
            page: descriptor.component,
            token,
            started,
        });
    }

    /// Cancel the running attempt, if any, and settle it as superseded.
    fn abort_in_flight(&mut self) {
        let Some(f) = self.in_flight.take() else {
            return;
        };
        f.token.cancel();
        tracing::debug!(attempt = f.attempt, location = %f.location, "navigation superseded");
        self.emit(NavEvent::Info(InfoEvent::Superseded {
            attempt: f.attempt,
            location: f.location.clone(),
        }));
        self.settle(
            f.attempt,
            f.location,
            Some(f.page),
            Resolution::Superseded,
            f.started,
        );
    }

    /// Apply a loader result. Results from anything but the live attempt are dropped silently.
    pub(crate) fn complete(&mut self, done: Completion) {
        let live = matches!(
            &self.in_flight,
            Some(f) if f.attempt == done.attempt && !f.token.is_cancelled()
        );
        if !live {
            tracing::trace!(attempt = done.attempt, "discarding stale loader result");
            return;
        }
        let Some(f) = self.in_flight.take() else {
            return;
        };

        match done.outcome {
            LoadOutcome::Loaded(props) => {
                self.publish(
                    f.attempt,
                    NavigationOutcome::Resolved {
                        view: f.page.clone(),
                        props,
                    },
                );
                self.settle(
                    f.attempt,
                    f.location,
                    Some(f.page),
                    Resolution::Resolved,
                    f.started,
                );
            }
            // The loader gave up although nobody cancelled it.
            LoadOutcome::Cancelled => {
                self.fail(f, LoaderError::Failed("loader cancelled itself".into()))
            }
            LoadOutcome::Failed(err) => self.fail(f, err),
        }
    }

    fn fail(&mut self, f: InFlight, err: LoaderError) {
        tracing::warn!(attempt = f.attempt, location = %f.location, error = %err, "page loader failed");
        self.emit(NavEvent::Info(InfoEvent::LoaderFailed {
            location: f.location.clone(),
            error: err.to_string(),
        }));

        let fallback = self
            .last_settled
            .clone()
            .unwrap_or_else(|| NavigationOutcome::Failed {
                message: err.to_string(),
            });
        self.publish(f.attempt, fallback);

        let resolution = if err.is_timeout() {
            Resolution::TimedOut
        } else {
            Resolution::Failed
        };
        self.settle(f.attempt, f.location, Some(f.page), resolution, f.started);
    }

    fn publish(&mut self, attempt: u64, outcome: NavigationOutcome) {
        if matches!(
            outcome,
            NavigationOutcome::Resolved { .. } | NavigationOutcome::NotFound
        ) {
            self.last_settled = Some(outcome.clone());
        }
        self.outcome_tx.send_replace(outcome.clone());
        self.emit(NavEvent::Outcome { attempt, outcome });
    }

    /// End an attempt: exactly one `Settled` per attempt, side effects only when it was not superseded.
    fn settle(
        &mut self,
        attempt: u64,
        location: Location,
        page: Option<ViewHandle>,
        resolution: Resolution,
        started: Instant,
    ) {
        if matches!(resolution, Resolution::Resolved | Resolution::NotFound) {
            if let Some(user) = self.store.current_user() {
                self.integrations.page_settled(&location, &user);
            }
        }
        let record = AttemptRecord {
            attempt,
            location,
            page,
            resolution,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::debug!(attempt, resolution = ?record.resolution, elapsed_ms = record.elapsed_ms, "navigation settled");
        self.emit(NavEvent::Progress(ProgressSignal::Settled(record)));
    }

    fn emit(&self, ev: NavEvent) {
        let _ = self.event_tx.send(ev);
    }

    #[cfg(test)]
    async fn next_completion(&mut self) -> Completion {
        match self.done_rx.recv().await {
            Some(done) => done,
            // We hold a sender ourselves.
            None => unreachable!("completion channel closed"),
        }
    }

    /// Process commands and loader completions until `Quit` or the command channel closes.
    pub(crate) async fn run(mut self, mut cmd_rx: UnboundedReceiver<NavCommand>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(NavCommand::Quit) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                Some(done) = self.done_rx.recv() => {
                    self.complete(done);
                    self.flush_waiters();
                }
            }
        }
        // Leave the progress indicator balanced.
        self.abort_in_flight();
    }
}
