mod help;
mod state;

use crate::bootstrap::GlobalStore;
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::model::{BootstrapState, NavEvent, NavigationOutcome, ThemeId};
use crate::orchestrator::{NavCommand, Session};
use crate::presentation::context::ContextStack;
use crate::presentation::{select_screen, PageHost, Screen};
use crate::theme::select_theme;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use state::UiState;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

/// Read side of the session, owned by the UI thread.
struct SessionView {
    outcomes: watch::Receiver<NavigationOutcome>,
    boot: watch::Receiver<BootstrapState>,
    store: GlobalStore,
    route_count: usize,
}

pub async fn run(args: Cli, cfg: AppConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<NavEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<NavCommand>();

    let session = Session::new(&cfg, event_tx)?;
    let routes = session.routes();
    let view = SessionView {
        outcomes: session.outcomes(),
        boot: session.bootstrap_state(),
        store: session.store(),
        route_count: routes.len(),
    };
    let mut route_paths: Vec<String> = routes.paths().map(str::to_string).collect();
    for raw in &args.routes {
        if !route_paths.contains(raw) {
            route_paths.push(raw.clone());
        }
    }

    // Initial location(s); queued by the session until global data is ready.
    for location in crate::cli::script_locations(&args) {
        let _ = cmd_tx.send(NavCommand::Navigate(location));
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let state = UiState::new(route_paths, cfg.theme.clone());
    let ui_handle = std::thread::spawn(move || run_threaded(state, view, event_rx, cmd_tx));

    let res = session.run(cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    view: SessionView,
    mut event_rx: UnboundedReceiver<NavEvent>,
    cmd_tx: UnboundedSender<NavCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut host = PageHost::new(ContextStack::standard());
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let started = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive; unbounded channel avoids backpressure.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            let screen = current_screen(&state, &view);
            let user = view.store.current_user();
            if let Err(e) = host.present(&screen, state.location.as_ref(), user.as_ref()) {
                tracing::warn!(error = %format!("{e:#}"), "page scaffolding failed");
                state.info = format!("Page scaffolding failed: {e:#}");
            }
            let ctx = DrawCtx {
                state: &state,
                screen: &screen,
                scaffold: if host.is_mounted() {
                    host.scaffold()
                } else {
                    Vec::new()
                },
                route_count: view.route_count,
                spinner: spinner(started.elapsed()),
            };
            terminal.draw(|f| draw(f.area(), f, &ctx)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state.on_key(k.modifiers, k.code) {
                    Some(NavCommand::Quit) => {
                        let _ = cmd_tx.send(NavCommand::Quit);
                        break Ok(());
                    }
                    Some(cmd) => {
                        let _ = cmd_tx.send(cmd);
                    }
                    None => {}
                }
            }
        }
    };

    // Leave the page before leaving the terminal.
    host.present(&Screen::Initializing, None, None).ok();
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn current_screen(state: &UiState, view: &SessionView) -> Screen {
    let pathname = state
        .location
        .as_ref()
        .map_or("/", |l| l.pathname.as_str());
    let theme = select_theme(pathname, state.preference.as_deref());
    let boot = view.boot.borrow().clone();
    let outcome = view.outcomes.borrow().clone();
    select_screen(&boot, &outcome, theme)
}

fn spinner(elapsed: Duration) -> &'static str {
    const FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
    FRAMES[(elapsed.as_millis() / 100) as usize % FRAMES.len()]
}

/// Everything one draw needs.
struct DrawCtx<'a> {
    state: &'a UiState,
    screen: &'a Screen,
    scaffold: Vec<String>,
    route_count: usize,
    spinner: &'static str,
}

fn theme_style(theme: Option<ThemeId>) -> Style {
    match theme {
        Some(ThemeId::Dark) => Style::default().fg(Color::White).bg(Color::Black),
        Some(ThemeId::Light) => Style::default().fg(Color::Black).bg(Color::White),
        None => Style::default(),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, fr: &DrawCtx<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    draw_header(chunks[0], f, fr);

    if fr.state.show_help {
        help::draw_help(chunks[1], f);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)].as_ref())
            .split(chunks[1]);
        draw_sidebar(body[0], f, fr);
        draw_screen(body[1], f, fr);
    }

    draw_status(chunks[2], f, fr.state);
}

fn draw_header(area: Rect, f: &mut ratatui::Frame, fr: &DrawCtx<'_>) {
    let location = fr
        .state
        .location
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "-".into());
    let progress = if fr.state.is_loading() {
        Span::styled(
            format!("{} loading", fr.spinner),
            Style::default().fg(Color::Yellow),
        )
    } else {
        Span::styled("idle", Style::default().fg(Color::Green))
    };
    let boot = match &fr.state.boot {
        BootstrapState::Pending => Span::styled("booting", Style::default().fg(Color::Yellow)),
        BootstrapState::Ready => Span::styled("ready", Style::default().fg(Color::Green)),
        BootstrapState::Failed { .. } => {
            Span::styled("boot failed", Style::default().fg(Color::Red))
        }
    };
    let line = Line::from(vec![
        Span::styled("Location: ", Style::default().fg(Color::Gray)),
        Span::raw(location),
        Span::raw("  "),
        progress,
        Span::raw("  "),
        boot,
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("navctl"));
    f.render_widget(p, area);
}

fn draw_sidebar(area: Rect, f: &mut ratatui::Frame, fr: &DrawCtx<'_>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);

    let items: Vec<ListItem> = fr
        .state
        .routes
        .iter()
        .map(|r| ListItem::new(r.clone()))
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Routes ({} in table)", fr.route_count)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut list_state = ListState::default();
    list_state.select(Some(fr.state.selected));
    f.render_stateful_widget(list, rows[0], &mut list_state);

    let lines: Vec<Line> = fr
        .state
        .history
        .iter()
        .map(|r| {
            Line::from(vec![
                Span::styled(format!("#{:<3} ", r.attempt), Style::default().fg(Color::Gray)),
                Span::styled(
                    format!("{:<10}", r.resolution.as_str()),
                    state::resolution_style(r),
                ),
                Span::raw(format!(" {:>5} ms  {}", r.elapsed_ms, r.location)),
            ])
        })
        .collect();
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Attempts"));
    f.render_widget(p, rows[1]);
}

fn draw_screen(area: Rect, f: &mut ratatui::Frame, fr: &DrawCtx<'_>) {
    let style = theme_style(fr.screen.theme());
    let mut lines: Vec<Line> = Vec::new();

    match fr.screen {
        Screen::Initializing => lines.push(Line::from("Fetching global data...")),
        Screen::BootFailed { message } => {
            lines.push(Line::from(Span::styled(
                "Global data could not be fetched.",
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::from(message.clone()));
            lines.push(Line::from(""));
            lines.push(Line::from("Press q to quit."));
        }
        Screen::Loading { .. } => lines.push(Line::from(format!("{} Loading", fr.spinner))),
        Screen::NotFound { .. } => {
            let at = fr
                .state
                .shown_location()
                .map(|l| l.pathname.clone())
                .unwrap_or_default();
            lines.push(Line::from(format!("Nothing lives at {at}")));
        }
        Screen::LoadFailed { message, .. } => {
            lines.push(Line::from(Span::styled(
                "The page could not be loaded.",
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::from(message.clone()));
            lines.push(Line::from("Press r to retry."));
        }
        Screen::Page { props, .. } => {
            if props.is_empty() {
                lines.push(Line::from("(no props)"));
            } else {
                let json = serde_json::to_string_pretty(props).unwrap_or_default();
                lines.extend(json.lines().map(|l| Line::from(l.to_string())));
            }
            if !fr.scaffold.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(vec![
                    Span::styled("Scopes: ", Style::default().add_modifier(Modifier::DIM)),
                    Span::raw(fr.scaffold.join(" > ")),
                ]));
            }
        }
    }

    let title = match fr.screen.theme() {
        Some(theme) => format!("{} [{}]", fr.screen.title(), theme.as_str()),
        None => fr.screen.title(),
    };
    let p = Paragraph::new(lines)
        .style(style)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = match state.editing.as_deref() {
        Some(buf) => Line::from(vec![
            Span::styled("Go to: ", Style::default().fg(Color::Magenta)),
            Span::raw(format!("{buf}_")),
        ]),
        None => Line::from(vec![
            Span::raw(state.info.clone()),
            Span::styled(
                "   (Enter go, / path, r reload, t theme, ? help, q quit)",
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    };
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptRecord, Location, ProgressSignal, Resolution};
    use ratatui::backend::TestBackend;

    fn view(boot: BootstrapState, outcome: NavigationOutcome) -> SessionView {
        let (_otx, outcomes) = watch::channel(outcome);
        let (_btx, boot) = watch::channel(boot);
        SessionView {
            outcomes,
            boot,
            store: GlobalStore::default(),
            route_count: 2,
        }
    }

    #[test]
    fn screen_follows_location_theme() {
        let mut state = UiState::new(vec!["/account/delete".into()], Some("light".into()));
        let page = NavigationOutcome::Resolved {
            view: crate::model::ViewHandle::new("Teams"),
            props: Default::default(),
        };
        let v = view(BootstrapState::Ready, page);

        state.location = Some(Location::parse("/teams"));
        assert_eq!(current_screen(&state, &v).theme(), Some(ThemeId::Light));
        state.location = Some(Location::parse("/desktop/login"));
        assert_eq!(current_screen(&state, &v).theme(), Some(ThemeId::Dark));
    }

    #[test]
    fn draws_without_panicking() {
        let state = UiState::new(vec!["/account/delete".into()], None);
        let screen = Screen::BootFailed {
            message: "503".into(),
        };
        let fr = DrawCtx {
            state: &state,
            screen: &screen,
            scaffold: Vec::new(),
            route_count: 1,
            spinner: spinner(Duration::ZERO),
        };
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f.area(), f, &fr)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Could not start"));
    }

    #[test]
    fn not_found_names_the_settled_path_after_a_failure() {
        let mut state = UiState::new(vec!["/account/delete".into()], None);
        for (attempt, path, resolution) in [
            (1, "/nope", Resolution::NotFound),
            (2, "/broken", Resolution::Failed),
        ] {
            state.apply_event(NavEvent::Progress(ProgressSignal::Started {
                attempt,
                location: Location::parse(path),
            }));
            state.apply_event(NavEvent::Progress(ProgressSignal::Settled(AttemptRecord {
                attempt,
                location: Location::parse(path),
                page: None,
                resolution,
                elapsed_ms: 1,
            })));
        }
        let screen = Screen::NotFound {
            theme: ThemeId::Light,
        };
        let fr = DrawCtx {
            state: &state,
            screen: &screen,
            scaffold: Vec::new(),
            route_count: 1,
            spinner: spinner(Duration::ZERO),
        };
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f.area(), f, &fr)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("Nothing lives at /nope"));
        assert!(!text.contains("Nothing lives at /broken"));
    }
}
