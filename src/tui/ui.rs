//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::App;
use super::compose;
use super::messages;
use super::sidebar;
use crate::models::ConnectionState;

/// Indicator symbol and color for the push channel state.
fn connection_indicator(state: ConnectionState) -> (&'static str, Color) {
    match state {
        ConnectionState::Connected => ("*", Color::Green),
        ConnectionState::Connecting => ("~", Color::Yellow),
        ConnectionState::Disconnected => ("o", Color::Red),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Layout: header (1 line) + main content + status bar (1 line)
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(22), Constraint::Fill(1)]).areas(main_area);

    sidebar::render(sidebar_area, frame.buffer_mut(), &app.sidebar);

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    messages::render(messages_area, frame.buffer_mut(), &app.messages);

    let chat_name = app
        .sidebar
        .active()
        .map(|c| c.name.as_str())
        .unwrap_or("(no conversation)");
    compose::render(
        compose_area,
        frame,
        &app.compose,
        chat_name,
        app.typing.is_typing(),
    );

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = " chat-sync";
    let (symbol, color) = connection_indicator(app.connection);
    let state = format!(" {} {} ", symbol, app.connection);
    let user = format!(" {} ", app.email);

    let used = title.len() + state.chars().count() + user.chars().count();
    let padding = (area.width as usize).saturating_sub(used);

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(state, Style::default().fg(color)),
        Span::styled(user, Style::default().fg(Color::Cyan)),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(ref msg) = app.status_message {
        let style = if app.status_is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green).bg(Color::DarkGray)
        };
        Paragraph::new(Line::from(Span::styled(format!(" {} ", msg), style)))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    if app.verbose {
        if let Some(ref log) = app.last_log {
            Paragraph::new(Line::from(Span::styled(
                format!(" {}", log),
                Style::default().fg(Color::Gray),
            )))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
            return;
        }
    }

    let sep = Span::styled(" | ", Style::default().fg(Color::Gray));
    let hint = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));

    let line = Line::from(vec![
        hint(" Enter: send"),
        sep.clone(),
        hint("Tab: next chat"),
        sep.clone(),
        hint("C-n: new"),
        sep.clone(),
        hint("C-b: bookmark"),
        sep,
        hint("Esc: quit"),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
