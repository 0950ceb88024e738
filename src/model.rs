use serde::{Deserialize, Serialize};
use std::fmt;

/// Page props handed from a loader to the page view.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Navigation target as reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    #[serde(default)]
    pub search: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: search.into(),
        }
    }

    /// Split a raw `/path?query` string. A fragment (`#...`) is dropped.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw.split('#').next().unwrap_or_default();
        match raw.find('?') {
            Some(idx) => {
                let (path, search) = raw.split_at(idx);
                // A bare "?" carries no query.
                let search = if search.len() > 1 { search } else { "" };
                Self::new(normalize_pathname(path), search)
            }
            None => Self::new(normalize_pathname(raw), ""),
        }
    }
}

fn normalize_pathname(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pathname, self.search)
    }
}

/// Opaque identity of a renderable page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewHandle(String);

impl ViewHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeId {
    Light,
    Dark,
}

impl ThemeId {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeId::Light => "light",
            ThemeId::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
}

/// Session-wide data fetched once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalData {
    #[serde(default)]
    pub current_user: Option<User>,
    /// Everything else the backend sends along; kept opaque.
    #[serde(flatten)]
    pub extra: Props,
}

/// The one published result of navigation. Superseded values are replaced, never queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// Nothing navigated yet.
    Idle,
    Loading,
    NotFound,
    Resolved { view: ViewHandle, props: Props },
    /// A loader failed and there was no earlier page to fall back to.
    Failed { message: String },
}

impl NavigationOutcome {
    pub fn label(&self) -> String {
        match self {
            NavigationOutcome::Idle => "idle".into(),
            NavigationOutcome::Loading => "loading".into(),
            NavigationOutcome::NotFound => "not found".into(),
            NavigationOutcome::Resolved { view, props } => {
                format!("resolved {view} ({} prop(s))", props.len())
            }
            NavigationOutcome::Failed { message } => format!("failed: {message}"),
        }
    }
}

/// How a single navigation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    NotFound,
    Superseded,
    Failed,
    TimedOut,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Resolved => "resolved",
            Resolution::NotFound => "not found",
            Resolution::Superseded => "superseded",
            Resolution::Failed => "failed",
            Resolution::TimedOut => "timed out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u64,
    pub location: Location,
    pub page: Option<ViewHandle>,
    pub resolution: Resolution,
    pub elapsed_ms: u64,
}

/// Progress indicator signals. Every attempt gets exactly one `Started` and one `Settled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressSignal {
    Started { attempt: u64, location: Location },
    Settled(AttemptRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootstrapState {
    Pending,
    Ready,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavEvent {
    Bootstrap(BootstrapState),
    Progress(ProgressSignal),
    Outcome {
        attempt: u64,
        outcome: NavigationOutcome,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    DuplicateIgnored { location: Location },
    Superseded { attempt: u64, location: Location },
    LoaderFailed { location: Location, error: String },
    BootstrapRetry { attempt: u32, max: u32, error: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::DuplicateIgnored { location } => {
                format!("Already at {location}")
            }
            InfoEvent::Superseded { attempt, location } => {
                format!("Navigation #{attempt} to {location} aborted")
            }
            InfoEvent::LoaderFailed { location, error } => {
                format!("Loading {location} failed: {error}")
            }
            InfoEvent::BootstrapRetry {
                attempt,
                max,
                error,
            } => format!("Fetching global data failed ({attempt}/{max}): {error}"),
        }
    }
}

/// Result of a scripted session, printed by `--json` and summarised by `--text`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub bootstrap: BootstrapState,
    pub user: Option<User>,
    pub location: Option<Location>,
    pub attempts: Vec<AttemptRecord>,
    pub outcome: NavigationOutcome,
    pub screen: crate::presentation::Screen,
    pub theme: Option<ThemeId>,
    /// Context scopes mounted around the final page, if one is shown.
    pub scaffold: Vec<String>,
    /// Ctrl-C or the settle timeout cut the script short.
    pub interrupted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_query_and_drops_fragment() {
        let loc = Location::parse("/account/delete?confirm=1#top");
        assert_eq!(loc.pathname, "/account/delete");
        assert_eq!(loc.search, "?confirm=1");
        assert_eq!(loc.to_string(), "/account/delete?confirm=1");
    }

    #[test]
    fn parse_adds_leading_slash_and_ignores_empty_query() {
        let loc = Location::parse("desktop/login?");
        assert_eq!(loc, Location::new("/desktop/login", ""));
    }

    #[test]
    fn global_data_keeps_unknown_fields() {
        let data: GlobalData = serde_json::from_str(
            r#"{"currentUser":{"id":"u1","displayName":"Ada"},"teams":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(data.current_user.as_ref().unwrap().display_name, "Ada");
        assert!(data.extra.contains_key("teams"));

        let anonymous: GlobalData = serde_json::from_str("{}").unwrap();
        assert!(anonymous.current_user.is_none());
    }
}
