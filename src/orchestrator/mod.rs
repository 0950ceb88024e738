//! Session orchestration.
//!
//! Wires the bootstrap gate, the navigation controller and the integrations together and
//! owns their lifecycle. UI/CLI layers only send `NavCommand`s and read the published state.

mod controller;
mod integrations;

pub(crate) use controller::{ControllerConfig, NavCommand, NavigationController};
pub(crate) use integrations::{IdentitySync, Integrations, SupportWidget, TracingIntegrations};

use crate::bootstrap::{BootstrapGate, GlobalStore};
use crate::config::AppConfig;
use crate::model::{BootstrapState, NavEvent, NavigationOutcome};
use crate::router::RouteTable;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub(crate) struct Session {
    gate: Arc<BootstrapGate>,
    controller: NavigationController,
    integrations: Arc<dyn Integrations>,
    support_app_id: Option<String>,
    routes: Arc<RouteTable>,
}

impl Session {
    pub fn new(cfg: &AppConfig, event_tx: UnboundedSender<NavEvent>) -> Result<Self> {
        let http = cfg.http_client()?;
        let routes = Arc::new(cfg.route_table(&http)?);
        let gate = BootstrapGate::new(
            cfg.bootstrap_source(&http),
            cfg.bootstrap,
            GlobalStore::default(),
        )
        .with_events(event_tx.clone());
        Ok(Self::from_parts(
            Arc::new(gate),
            routes,
            ControllerConfig {
                loader_timeout: cfg.loader_timeout,
            },
            Arc::new(TracingIntegrations),
            cfg.support_app_id.clone(),
            event_tx,
        ))
    }

    pub fn from_parts(
        gate: Arc<BootstrapGate>,
        routes: Arc<RouteTable>,
        controller_cfg: ControllerConfig,
        integrations: Arc<dyn Integrations>,
        support_app_id: Option<String>,
        event_tx: UnboundedSender<NavEvent>,
    ) -> Self {
        let controller = NavigationController::new(
            routes.clone(),
            controller_cfg,
            gate.store().clone(),
            integrations.clone(),
            event_tx,
        );
        Self {
            gate,
            controller,
            integrations,
            support_app_id,
            routes,
        }
    }

    pub fn outcomes(&self) -> watch::Receiver<NavigationOutcome> {
        self.controller.subscribe()
    }

    pub fn bootstrap_state(&self) -> watch::Receiver<BootstrapState> {
        self.gate.state()
    }

    pub fn store(&self) -> GlobalStore {
        self.gate.store().clone()
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.clone()
    }

    /// Bootstrap, then navigate until `Quit`.
    ///
    /// Commands that arrive during bootstrap are queued and replayed in order once global data
    /// is ready. After a bootstrap failure nothing navigates; the session only waits for `Quit`.
    pub async fn run(self, mut cmd_rx: UnboundedReceiver<NavCommand>) -> Result<()> {
        let Session {
            gate,
            mut controller,
            integrations,
            support_app_id,
            ..
        } = self;

        let _widget = SupportWidget::load(integrations.clone(), support_app_id.as_deref());
        let identity = tokio::spawn(IdentitySync::new(gate.store(), integrations).run());

        let mut queued = Vec::new();
        let boot = {
            let init = gate.initialize();
            tokio::pin!(init);
            loop {
                tokio::select! {
                    res = &mut init => break Some(res),
                    cmd = cmd_rx.recv() => match cmd {
                        Some(NavCommand::Quit) | None => break None,
                        Some(other) => queued.push(other),
                    },
                }
            }
        };

        match boot {
            None => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "session halted");
                // Dropping queued waiters tells them no navigation will settle.
                drop(queued);
                while let Some(cmd) = cmd_rx.recv().await {
                    if matches!(cmd, NavCommand::Quit) {
                        break;
                    }
                }
            }
            Some(Ok(())) => {
                for cmd in queued {
                    controller.handle(cmd);
                }
                controller.run(cmd_rx).await;
            }
        }

        identity.abort();
        Ok(())
    }
}
