use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::app::App;

const LABEL_WIDTH: usize = 40;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_filter(frame, app, chunks[0]);
    render_items(frame, app, chunks[1]);
    render_pager(frame, app, chunks[2]);
}

fn render_filter(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if app.filter_mode {
        (
            format!("{}_", app.filter_input),
            Style::default().fg(Color::Yellow),
        )
    } else {
        (
            app.list.filter().unwrap_or_default().to_string(),
            Style::default().fg(Color::White),
        )
    };
    let mut spans = vec![
        Span::styled(" Filter: ", Style::default().fg(Color::DarkGray)),
        Span::styled(text, style),
    ];
    if app.list.has_pending_filter() {
        spans.push(Span::styled("  (waiting)", Style::default().fg(Color::DarkGray)));
    }
    let line = Line::from(spans);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_items(frame: &mut Frame, app: &App, area: Rect) {
    let title = app.route.kind.title();
    let entries = app.list.visible_items();

    if entries.is_empty() && !app.list.is_loading() {
        let empty = Paragraph::new("Nothing found")
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let flex = (area.width as usize)
        .saturating_sub(LABEL_WIDTH + 4)
        .max(10);

    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let style = if i == app.selected {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let line = Line::from(vec![
                Span::styled(
                    format!("{:<width$}", truncate(entry.label(), LABEL_WIDTH), width = LABEL_WIDTH),
                    style,
                ),
                Span::raw("  "),
                Span::styled(truncate(&entry.detail(), flex), Style::default().fg(Color::Gray)),
            ]);
            ListItem::new(line)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = ListState::default();
    state.select(Some(app.selected));

    frame.render_stateful_widget(list, area, &mut state);
}

/// `< prev   Page N   next >`, with hidden arrows left blank.
fn render_pager(frame: &mut Frame, app: &App, area: Rect) {
    let arrow = Style::default().fg(Color::Cyan);
    let prev = if app.list.hide_prev_arrow() { "      " } else { "< prev" };
    let next = if app.list.hide_next_arrow() { "      " } else { "next >" };

    let mut spans = vec![Span::raw(" "), Span::styled(prev, arrow), Span::raw("   ")];
    let shown = app.list.visible_items().len();
    if app.route.kind.is_paged() {
        spans.push(Span::raw(format!("Page {}", app.list.page_number())));
        if shown > 0 {
            let first = app.list.offset() as usize + 1;
            spans.push(Span::styled(
                format!(" ({}-{})", first, first + shown - 1),
                Style::default().fg(Color::DarkGray),
            ));
        }
    } else {
        spans.push(Span::raw(format!("{} results", shown)));
    }
    spans.push(Span::raw("   "));
    spans.push(Span::styled(next, arrow));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
