mod list;
mod popup;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::App;
use crate::event::InputMode;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    list::render(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    if let Some(selected) = app.server_popup {
        popup::render_select(frame, "Switch server", &app.server_names(), selected);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let title = format!(
        "gerrit-lists - {} - {}",
        app.server_name(),
        app.route.kind.title()
    );
    let user = match &app.user {
        Some(name) => format!("{} ", name),
        None => "anonymous ".to_string(),
    };
    let padding = (area.width as usize).saturating_sub(title.chars().count() + user.chars().count());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(user, Style::default().fg(Color::Gray)),
    ]))
    .style(Style::default().bg(Color::DarkGray));

    frame.render_widget(header, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some(error) = &app.error {
        Line::from(vec![Span::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red),
        )])
    } else if let Some(message) = &app.status {
        Line::from(vec![Span::styled(
            message.as_str(),
            Style::default().fg(Color::Green),
        )])
    } else if app.list.is_loading() {
        Line::from(vec![Span::styled(
            "Loading...",
            Style::default().fg(Color::Yellow),
        )])
    } else {
        let help = match app.input_mode() {
            InputMode::Filter => "type to filter | Backspace: delete | Enter/Esc: done",
            InputMode::Popup => "j/k: nav | Enter: switch | Esc: close",
            InputMode::Normal if app.route.kind.repo().is_some() => {
                "j/k/g/G: nav | n/p: page | /: filter | b/t/d: branches/tags/dashboards | o: open | y: yank | r: refresh | q: back"
            }
            InputMode::Normal => {
                "Tab: lists | j/k/g/G: nav | n/p: page | /: filter | Enter: open | b/t/d: sub-lists | o: browser | y: yank | r: refresh | s: server | q: quit"
            }
        };
        Line::from(vec![Span::styled(help, Style::default().fg(Color::Gray))])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}
