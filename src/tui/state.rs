use crate::model::{AttemptRecord, BootstrapState, Location, NavEvent, ProgressSignal, Resolution};
use crate::orchestrator::NavCommand;
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::style::{Color, Style};

const MAX_HISTORY: usize = 50;

pub struct UiState {
    pub routes: Vec<String>,
    pub selected: usize,
    /// Path editor buffer while `/` editing is active.
    pub editing: Option<String>,
    pub show_help: bool,
    /// `general.theme` setting, toggled with `t`.
    pub preference: Option<String>,
    pub boot: BootstrapState,
    /// Location of the most recently started attempt.
    pub location: Option<Location>,
    pub in_flight: Option<u64>,
    pub history: Vec<AttemptRecord>,
    pub info: String,
}

impl UiState {
    pub fn new(routes: Vec<String>, preference: Option<String>) -> Self {
        Self {
            routes,
            selected: 0,
            editing: None,
            show_help: false,
            preference,
            boot: BootstrapState::Pending,
            location: None,
            in_flight: None,
            history: Vec::new(),
            info: "Fetching global data...".into(),
        }
    }

    pub fn apply_event(&mut self, ev: NavEvent) {
        match ev {
            NavEvent::Bootstrap(state) => {
                self.info = match &state {
                    BootstrapState::Pending => "Fetching global data...".into(),
                    BootstrapState::Ready => "Global data ready".into(),
                    BootstrapState::Failed { message } => {
                        format!("Global data failed: {message}")
                    }
                };
                self.boot = state;
            }
            NavEvent::Progress(ProgressSignal::Started { attempt, location }) => {
                self.in_flight = Some(attempt);
                self.location = Some(location);
            }
            NavEvent::Progress(ProgressSignal::Settled(record)) => {
                if self.in_flight == Some(record.attempt) {
                    self.in_flight = None;
                }
                self.history.insert(0, record);
                self.history.truncate(MAX_HISTORY);
            }
            NavEvent::Outcome { .. } => {}
            NavEvent::Info(info) => self.info = info.to_message(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Location of the newest attempt that settled on a page, i.e. what is on screen.
    pub fn shown_location(&self) -> Option<&Location> {
        self.history
            .iter()
            .find(|r| matches!(r.resolution, Resolution::Resolved | Resolution::NotFound))
            .map(|r| &r.location)
    }

    /// Map a key press to a controller command. `Quit` ends the UI loop.
    pub fn on_key(&mut self, modifiers: KeyModifiers, code: KeyCode) -> Option<NavCommand> {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Some(NavCommand::Quit);
        }
        if let Some(buf) = self.editing.as_mut() {
            match code {
                KeyCode::Esc => self.editing = None,
                KeyCode::Backspace => {
                    buf.pop();
                }
                KeyCode::Char(c) => buf.push(c),
                KeyCode::Enter => {
                    let raw = self.editing.take().unwrap_or_default();
                    if raw.trim().is_empty() {
                        return None;
                    }
                    return Some(NavCommand::Navigate(Location::parse(&raw)));
                }
                _ => {}
            }
            return None;
        }

        match code {
            KeyCode::Char('q') => return Some(NavCommand::Quit),
            KeyCode::Char('?') => self.show_help = !self.show_help,
            KeyCode::Esc => self.show_help = false,
            KeyCode::Char('/') => self.editing = Some("/".into()),
            KeyCode::Char('r') => {
                self.info = "Reloading...".into();
                return Some(NavCommand::Reload);
            }
            KeyCode::Char('t') => {
                let next = match self.preference.as_deref() {
                    Some("dark") => "light",
                    _ => "dark",
                };
                self.preference = Some(next.into());
                self.info = format!("Theme preference: {next}");
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.routes.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                let path = self.routes.get(self.selected)?;
                return Some(NavCommand::Navigate(Location::parse(path)));
            }
            _ => {}
        }
        None
    }
}

pub fn resolution_style(record: &AttemptRecord) -> Style {
    let color = match record.resolution {
        Resolution::Resolved => Color::Green,
        Resolution::NotFound => Color::Yellow,
        Resolution::Superseded => Color::DarkGray,
        Resolution::Failed | Resolution::TimedOut => Color::Red,
    };
    Style::default().fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InfoEvent;

    fn state() -> UiState {
        UiState::new(
            vec!["/account/delete".into(), "/desktop/login".into()],
            None,
        )
    }

    fn key(s: &mut UiState, code: KeyCode) -> Option<NavCommand> {
        s.on_key(KeyModifiers::NONE, code)
    }

    #[test]
    fn enter_navigates_to_selected_route() {
        let mut s = state();
        assert!(key(&mut s, KeyCode::Down).is_none());
        assert!(key(&mut s, KeyCode::Down).is_none());
        assert_eq!(s.selected, 1);
        match key(&mut s, KeyCode::Enter) {
            Some(NavCommand::Navigate(loc)) => assert_eq!(loc.pathname, "/desktop/login"),
            other => panic!("unexpected {other:?}"),
        }
        key(&mut s, KeyCode::Char('k'));
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn path_editor_builds_location() {
        let mut s = state();
        key(&mut s, KeyCode::Char('/'));
        for c in "teams?tab=2".chars() {
            assert!(key(&mut s, KeyCode::Char(c)).is_none());
        }
        // 'q' while editing is text, not quit.
        key(&mut s, KeyCode::Char('q'));
        key(&mut s, KeyCode::Backspace);
        match key(&mut s, KeyCode::Enter) {
            Some(NavCommand::Navigate(loc)) => {
                assert_eq!(loc, Location::new("/teams", "?tab=2"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(s.editing.is_none());

        key(&mut s, KeyCode::Char('/'));
        key(&mut s, KeyCode::Esc);
        assert!(s.editing.is_none());
    }

    #[test]
    fn quit_reload_and_theme_toggle() {
        let mut s = state();
        assert!(matches!(key(&mut s, KeyCode::Char('r')), Some(NavCommand::Reload)));
        key(&mut s, KeyCode::Char('t'));
        assert_eq!(s.preference.as_deref(), Some("dark"));
        key(&mut s, KeyCode::Char('t'));
        assert_eq!(s.preference.as_deref(), Some("light"));
        assert!(matches!(key(&mut s, KeyCode::Char('q')), Some(NavCommand::Quit)));
        assert!(matches!(
            s.on_key(KeyModifiers::CONTROL, KeyCode::Char('c')),
            Some(NavCommand::Quit)
        ));
    }

    #[test]
    fn progress_tracks_latest_attempt() {
        let mut s = state();
        let loc = Location::parse("/teams");
        s.apply_event(NavEvent::Progress(ProgressSignal::Started {
            attempt: 1,
            location: loc.clone(),
        }));
        s.apply_event(NavEvent::Progress(ProgressSignal::Started {
            attempt: 2,
            location: Location::parse("/desktop/login"),
        }));
        // Attempt 1 settling late does not clear attempt 2's indicator.
        s.apply_event(NavEvent::Progress(ProgressSignal::Settled(AttemptRecord {
            attempt: 1,
            location: loc,
            page: None,
            resolution: Resolution::Superseded,
            elapsed_ms: 4,
        })));
        assert!(s.is_loading());
        assert_eq!(s.location, Some(Location::parse("/desktop/login")));
        assert_eq!(s.history.len(), 1);

        s.apply_event(NavEvent::Info(InfoEvent::Message("hello".into())));
        assert_eq!(s.info, "hello");
    }

    fn settled(attempt: u64, path: &str, resolution: Resolution) -> NavEvent {
        NavEvent::Progress(ProgressSignal::Settled(AttemptRecord {
            attempt,
            location: Location::parse(path),
            page: None,
            resolution,
            elapsed_ms: 1,
        }))
    }

    #[test]
    fn shown_location_skips_failed_attempts() {
        let mut s = state();
        assert!(s.shown_location().is_none());

        s.apply_event(settled(1, "/nope", Resolution::NotFound));
        s.apply_event(settled(2, "/broken", Resolution::Failed));
        s.apply_event(settled(3, "/slow", Resolution::Superseded));
        s.apply_event(settled(4, "/slower", Resolution::TimedOut));
        assert_eq!(s.shown_location(), Some(&Location::parse("/nope")));

        s.apply_event(settled(5, "/teams", Resolution::Resolved));
        assert_eq!(s.shown_location(), Some(&Location::parse("/teams")));
    }
}
