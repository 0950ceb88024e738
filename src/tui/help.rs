use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Select route"),
        ]),
        key_line("Enter", 7, "Navigate to selected route"),
        key_line("/", 11, "Type a path (Enter to go, Esc to cancel)"),
        key_line("r", 11, "Reload current location"),
        key_line("t", 11, "Toggle theme preference"),
        key_line("?", 11, "Show/hide this help"),
        Line::from(""),
        Line::from("Public pages (marketing, shared, desktop) and the not-found page"),
        Line::from("always use the dark theme."),
        Line::from(""),
        Line::from("Logs:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                crate::logging::log_file_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".into()),
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
