//! Presentation switch: turns bootstrap state, the published outcome and the theme into
//! exactly one screen, and mounts context scaffolding around resolved pages.

pub mod context;

use crate::model::{BootstrapState, NavigationOutcome, Props, ThemeId, ViewHandle};
use crate::theme::PUBLIC_THEME;
use anyhow::Result;
use context::{ContextStack, PageContext};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    /// Global data not fetched yet.
    Initializing,
    /// Global data could not be fetched; nothing else renders.
    BootFailed { message: String },
    Loading { theme: ThemeId },
    NotFound { theme: ThemeId },
    LoadFailed { message: String, theme: ThemeId },
    Page {
        view: ViewHandle,
        props: Props,
        theme: ThemeId,
    },
}

impl Screen {
    pub fn theme(&self) -> Option<ThemeId> {
        match self {
            Screen::Initializing | Screen::BootFailed { .. } => None,
            Screen::Loading { theme }
            | Screen::NotFound { theme }
            | Screen::LoadFailed { theme, .. }
            | Screen::Page { theme, .. } => Some(*theme),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Screen::Initializing => "Fetching global data...".into(),
            Screen::BootFailed { .. } => "Could not start".into(),
            Screen::Loading { .. } => "Loading".into(),
            Screen::NotFound { .. } => "Page not found".into(),
            Screen::LoadFailed { .. } => "Something went wrong".into(),
            Screen::Page { view, .. } => view.to_string(),
        }
    }
}

/// Pick the one screen to show. Pure: no navigation, no fetching.
pub fn select_screen(
    boot: &BootstrapState,
    outcome: &NavigationOutcome,
    theme: ThemeId,
) -> Screen {
    match boot {
        BootstrapState::Pending => Screen::Initializing,
        BootstrapState::Failed { message } => Screen::BootFailed {
            message: message.clone(),
        },
        BootstrapState::Ready => match outcome {
            NavigationOutcome::Idle | NavigationOutcome::Loading => Screen::Loading { theme },
            NavigationOutcome::NotFound => Screen::NotFound {
                theme: PUBLIC_THEME,
            },
            NavigationOutcome::Failed { message } => Screen::LoadFailed {
                message: message.clone(),
                theme: PUBLIC_THEME,
            },
            NavigationOutcome::Resolved { view, props } => Screen::Page {
                view: view.clone(),
                props: props.clone(),
                theme,
            },
        },
    }
}

/// Keeps the context stack mounted exactly while a page screen is shown.
pub struct PageHost {
    stack: ContextStack,
    mounted: Option<(ViewHandle, Props, ThemeId)>,
}

impl PageHost {
    pub fn new(stack: ContextStack) -> Self {
        Self {
            stack,
            mounted: None,
        }
    }

    pub fn scaffold(&self) -> Vec<String> {
        self.stack.names()
    }

    pub fn is_mounted(&self) -> bool {
        self.stack.is_mounted()
    }

    /// Remount when the page, its props or its theme change; unmount on any non-page screen.
    pub fn present(
        &mut self,
        screen: &Screen,
        location: Option<&crate::model::Location>,
        user: Option<&crate::model::User>,
    ) -> Result<()> {
        let next = match screen {
            Screen::Page { view, props, theme } => Some((view.clone(), props.clone(), *theme)),
            _ => None,
        };
        if next == self.mounted {
            return Ok(());
        }

        if self.mounted.take().is_some() {
            self.stack.unmount();
        }
        if let Some((view, props, theme)) = next {
            self.stack.mount(&PageContext {
                location,
                view: &view,
                props: &props,
                theme,
                user,
            })?;
            tracing::debug!(view = %view, theme = theme.as_str(), "page mounted");
            self.mounted = Some((view, props, theme));
        }
        Ok(())
    }
}
