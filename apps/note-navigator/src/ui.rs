//! UI rendering for the note navigator.

use nav_core::{ContentSegment, DelimiterStyle, HeaderItem, LinkInfo, ThreeWayLinkGroup};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_main(f, app, chunks[1]);
    draw_status_bar(f, app, chunks[2]);

    if app.show_help {
        draw_help(f);
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let items = app.header.snapshot();
    let mut spans: Vec<Span> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("  •  ", Style::default().fg(Color::DarkGray)));
        }
        render_item(item, &mut spans);
    }
    if spans.is_empty() {
        spans.push(Span::styled(
            "no navigation links",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let title = app
        .current_file
        .as_deref()
        .map(|file| format!(" {file} "))
        .unwrap_or_else(|| " no note open ".into());
    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(header, area);
}

fn render_item(item: &HeaderItem, spans: &mut Vec<Span>) {
    match item {
        HeaderItem::ThreeWay(group) => render_three_way(group, spans),
        HeaderItem::Links(links) => {
            for (i, link) in links.iter().enumerate() {
                if i > 0 {
                    spans.push(Span::raw(" "));
                }
                if !link.prefix.is_empty() {
                    spans.push(Span::raw(format!("{} ", link.prefix)));
                }
                spans.push(link_span(&link.link));
            }
        }
        HeaderItem::Content(content) => {
            if !content.prefix.is_empty() {
                spans.push(Span::raw(format!("{} ", content.prefix)));
            }
            for segment in &content.content {
                match segment {
                    ContentSegment::Text(text) => spans.push(Span::raw(text.clone())),
                    ContentSegment::Link(link) => {
                        spans.push(link_span(link));
                    }
                }
            }
        }
        HeaderItem::Collapsed(collapsed) => {
            spans.push(Span::styled(
                format!("{} ({})", collapsed.prefix, collapsed.item_count),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }
}

fn render_three_way(group: &ThreeWayLinkGroup, spans: &mut Vec<Span>) {
    let (open, sep, close) = match group.delimiter {
        DelimiterStyle::Chevrons => ("< ", " | ", " >"),
        DelimiterStyle::Slash => ("", " / ", ""),
    };
    spans.push(Span::styled(open, Style::default().fg(Color::DarkGray)));
    let mut first = true;
    for slot in [&group.previous, &group.parent, &group.next] {
        if slot.hidden {
            continue;
        }
        if !first {
            spans.push(Span::styled(sep, Style::default().fg(Color::DarkGray)));
        }
        first = false;
        if slot.links.is_empty() {
            spans.push(Span::styled("·", Style::default().fg(Color::DarkGray)));
            continue;
        }
        for (i, link) in slot.links.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            if !link.prefix.is_empty() {
                spans.push(Span::raw(format!("{} ", link.prefix)));
            }
            spans.push(link_span(&link.link));
        }
    }
    spans.push(Span::styled(close, Style::default().fg(Color::DarkGray)));
}

fn link_span(link: &LinkInfo) -> Span<'static> {
    let style = if link.is_resolved || link.is_external {
        Style::default().fg(Color::Cyan)
    } else {
        // Virtual links (create-on-click targets) render dimmed.
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::DIM)
    };
    Span::styled(link.display_text.clone(), style)
}

fn draw_main(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    draw_file_list(f, app, chunks[0]);
    draw_preview(f, app, chunks[1]);
}

fn draw_file_list(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let mut style = Style::default();
            if i == app.selected_index {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }
            if app.current_file.as_deref() == Some(file.as_str()) {
                style = style.fg(Color::Cyan);
            }
            ListItem::new(Line::from(Span::styled(file.clone(), style)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Notes ({}) ", app.files.len())),
    );
    f.render_widget(list, area);
}

fn draw_preview(f: &mut Frame, app: &App, area: Rect) {
    let text = app.preview();
    let lines: Vec<Line> = text
        .lines()
        .take(app.config.display.preview_lines)
        .map(|line| Line::from(line.to_string()))
        .collect();
    let preview = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Preview "));
    f.render_widget(preview, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let text = app
        .message
        .clone()
        .unwrap_or_else(|| "j/k move | Enter open | r refresh | ? help | q quit".into());
    let bar = Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}

fn draw_help(f: &mut Frame) {
    let area = centered_rect(50, 40, f.area());
    let lines = vec![
        Line::from("j / Down    next note"),
        Line::from("k / Up      previous note"),
        Line::from("g / G       first / last note"),
        Line::from("Enter       open note"),
        Line::from("r           rescan vault"),
        Line::from("q           quit"),
    ];
    let help = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
