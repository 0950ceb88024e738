//! Side channels driven by the controller: analytics identity and the support widget.
//!
//! Vendors behind these calls are external collaborators; the default implementation only logs.

use crate::bootstrap::GlobalStore;
use crate::model::{GlobalData, Location, User};
use std::sync::Arc;
use tokio::sync::watch;

pub trait Integrations: Send + Sync {
    fn load_support_widget(&self, app_id: &str);
    fn shutdown_support_widget(&self);
    /// Called on transitions of the current-user identity.
    fn identify(&self, user: &User);
    /// Called once per settled, non-superseded navigation while a user is signed in.
    fn page_settled(&self, location: &Location, user: &User);
}

/// Logs every call under the `navctl::integrations` target.
#[derive(Debug, Default)]
pub struct TracingIntegrations;

impl Integrations for TracingIntegrations {
    fn load_support_widget(&self, app_id: &str) {
        tracing::info!(target: "navctl::integrations", app_id, "support widget loaded");
    }

    fn shutdown_support_widget(&self) {
        tracing::info!(target: "navctl::integrations", "support widget shut down");
    }

    fn identify(&self, user: &User) {
        tracing::info!(
            target: "navctl::integrations",
            user_id = %user.id,
            name = %user.display_name,
            "identify"
        );
    }

    fn page_settled(&self, location: &Location, user: &User) {
        tracing::debug!(
            target: "navctl::integrations",
            %location,
            user_id = %user.id,
            "support state update"
        );
    }
}

/// Keeps the support widget loaded for as long as the guard lives.
pub struct SupportWidget {
    integrations: Arc<dyn Integrations>,
    loaded: bool,
}

impl SupportWidget {
    /// Loads nothing when no app id is configured.
    pub fn load(integrations: Arc<dyn Integrations>, app_id: Option<&str>) -> Self {
        let loaded = match app_id {
            Some(id) if !id.trim().is_empty() => {
                integrations.load_support_widget(id);
                true
            }
            _ => false,
        };
        Self {
            integrations,
            loaded,
        }
    }
}

impl Drop for SupportWidget {
    fn drop(&mut self) {
        if self.loaded {
            self.integrations.shutdown_support_widget();
        }
    }
}

/// Watches the global store and identifies the user whenever the identity changes.
pub struct IdentitySync {
    rx: watch::Receiver<GlobalData>,
    integrations: Arc<dyn Integrations>,
    last_user_id: Option<String>,
}

impl IdentitySync {
    pub fn new(store: &GlobalStore, integrations: Arc<dyn Integrations>) -> Self {
        Self {
            rx: store.subscribe(),
            integrations,
            last_user_id: None,
        }
    }

    /// Returns true if `identify` was called.
    fn observe(&mut self, data: &GlobalData) -> bool {
        let user_id = data.current_user.as_ref().map(|u| u.id.clone());
        if user_id == self.last_user_id {
            return false;
        }
        self.last_user_id = user_id;
        match &data.current_user {
            Some(user) => {
                self.integrations.identify(user);
                true
            }
            None => false,
        }
    }

    /// Runs until the store is dropped.
    pub async fn run(mut self) {
        loop {
            let data = self.rx.borrow_and_update().clone();
            self.observe(&data);
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }
}
