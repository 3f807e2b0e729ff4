use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, Screen};
use crate::session::{Message, Role};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Organizations => render_organizations_screen(app, frame, body_area),
        Screen::Documents => render_documents_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_chat_picker {
        render_chat_picker(app, frame, area);
    }
    if app.show_upload_input {
        render_upload_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let organization = app
        .organization
        .as_ref()
        .map(|o| format!(" {} ", o.name))
        .unwrap_or_else(|| " no organization ".to_string());

    let title = Line::from(vec![
        Span::styled(" ragdesk ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(organization, Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(status) = &app.status {
        let line = Paragraph::new(status.as_str())
            .style(Style::default().bg(Color::Red).fg(Color::White));
        frame.render_widget(line, area);
        return;
    }

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = vec![
        Span::styled(" 1/2/3 ", key_style),
        Span::styled(" screen ", label_style),
    ];

    match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Normal) => hints.extend(vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" chats ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
        ]),
        (Screen::Chat, InputMode::Editing) => hints.extend(vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" done ", label_style),
        ]),
        (Screen::Organizations, InputMode::Normal) => hints.extend(vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" select ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" new ", label_style),
        ]),
        (Screen::Organizations, InputMode::Editing) => hints.extend(vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" create ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]),
        (Screen::Documents, _) => hints.extend(vec![
            Span::styled(" u ", key_style),
            Span::styled(" upload ", label_style),
            Span::styled(" s ", key_style),
            Span::styled(" save ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" delete ", label_style),
            Span::styled(" r ", key_style),
            Span::styled(" refresh ", label_style),
        ]),
    }

    hints.extend(vec![
        Span::styled(" q ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

// Chat screen

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    if app.organization.is_none() {
        render_hint(frame, area, "Select an organization first (screen 2)");
        return;
    }
    if app.chat.is_none() {
        render_hint(frame, area, "No chat yet. Press n to create one.");
        return;
    }

    let [log_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    render_message_log(app, frame, log_area);
    render_message_input(app, frame, input_area);
}

fn render_message_log(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Chat ");
    let inner = block.inner(area);

    // The buffer is most recent first; render oldest at the top.
    let mut lines: Vec<Line> = Vec::new();
    for message in app.conversation.messages().iter().rev() {
        lines.push(role_line(message));
        if message.is_pending_reply() && message.text.is_empty() {
            let dots = ".".repeat(app.animation_frame as usize + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{dots}"),
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            for text_line in message.text.lines() {
                lines.push(Line::raw(text_line.to_string()));
            }
        }
        lines.push(Line::default());
    }

    app.chat_width = inner.width;
    app.chat_height = inner.height;
    app.chat_total_lines = wrapped_line_count(&lines, app.chat_width);

    // Stick to the bottom unless the user scrolled up.
    let max_scroll = app.chat_total_lines.saturating_sub(app.chat_height);
    app.chat_scroll = app.chat_scroll.min(max_scroll);
    let offset = max_scroll.saturating_sub(app.chat_scroll);

    let log = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    frame.render_widget(log, area);
}

fn role_line(message: &Message) -> Line<'static> {
    let style = match message.role {
        Role::User => Style::default().fg(Color::Yellow).bold(),
        Role::Assistant => Style::default().fg(Color::Cyan).bold(),
    };
    Line::from(Span::styled(format!("{}:", message.role_name), style))
}

fn wrapped_line_count(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let mut total = 0u16;
    for line in lines {
        let chars: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
        total = total.saturating_add(((chars / width) + 1) as u16);
    }
    total
}

fn render_message_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, style) = if app.reply_open {
        (" Waiting for reply ", Style::default().fg(Color::Gray))
    } else if app.input_mode == InputMode::Editing {
        (" Message ", Style::default().fg(Color::Yellow))
    } else {
        (" Message (i to type) ", Style::default())
    };

    let input = Paragraph::new(app.message_input.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.reply_open {
        let x = area.x + 1 + app.message_cursor.min(area.width.saturating_sub(2) as usize) as u16;
        frame.set_cursor_position((x, area.y + 1));
    }
}

fn render_chat_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = app
        .chats
        .iter()
        .map(|chat| {
            ListItem::new(vec![
                Line::from(chat.id.to_string()),
                Line::from(Span::styled(
                    chat.created_at.clone(),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Select chat (n = new, Esc = close) "),
        )
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_stateful_widget(list, popup, &mut app.chat_state);
}

// Organization picker

fn render_organizations_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, list_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let editing = app.input_mode == InputMode::Editing;
    let input = Paragraph::new(app.org_name_input.as_str())
        .style(if editing {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" New organization name (i to edit, Enter to create) "),
        );
    frame.render_widget(input, input_area);

    if editing {
        let x = input_area.x + 1 + app.org_name_cursor as u16;
        frame.set_cursor_position((x, input_area.y + 1));
    }

    let current = app.organization.as_ref().map(|o| o.id);
    let items: Vec<ListItem> = app
        .organizations
        .iter()
        .map(|org| {
            let marker = if Some(org.id) == current { " ✓" } else { "" };
            ListItem::new(Line::from(format!("{}{}", org.name, marker)))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Organizations "))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_stateful_widget(list, list_area, &mut app.organization_state);
}

// Documents screen

fn render_documents_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(organization) = app.organization.as_ref() else {
        render_hint(frame, area, "Select an organization first (screen 2)");
        return;
    };

    let title = format!(" Documents — {} ", organization.name);
    let items: Vec<ListItem> = app
        .documents
        .iter()
        .map(|doc| {
            let indexing = if doc.is_embeddings_complete {
                Span::styled("indexed", Style::default().fg(Color::Green))
            } else {
                Span::styled("indexing…", Style::default().fg(Color::Yellow))
            };
            ListItem::new(vec![
                Line::from(doc.name.clone()),
                Line::from(vec![Span::raw("  "), indexing]),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_stateful_widget(list, area, &mut app.document_state);
}

fn render_upload_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(70, 20, area);
    frame.render_widget(Clear, popup);

    let input = Paragraph::new(app.upload_path_input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Path of file to upload (Enter to send, Esc to cancel) "),
        );
    frame.render_widget(input, popup);

    let x = popup.x + 1 + app.upload_cursor as u16;
    frame.set_cursor_position((x, popup.y + 1));
}

fn render_hint(frame: &mut Frame, area: Rect, text: &str) {
    let hint = Paragraph::new(text)
        .style(Style::default().fg(Color::Gray))
        .centered()
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(hint, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [_, vertical, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);

    let [_, horizontal, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(vertical);

    horizontal
}
