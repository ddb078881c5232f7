//! Rendering of the chat view.
//!
//! The transcript is wrapped here rather than by `Paragraph::wrap` so the
//! total content height is known before drawing; the scroll position and the
//! auto-scroll policy depend on it.

use chrono::{DateTime, Utc};
use ragnews_core::{ChatSnapshot, Message, Role, time_ago};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::app::App;

pub const TITLE: &str = "RAG News Chatbot";
pub const SUBTITLE: &str = "Ask questions about the latest Reuters articles.";
pub const BOOTING_NOTICE: &str = "Starting… creating session…";
pub const PLACEHOLDER_READY: &str = "Ask about the news…";
pub const PLACEHOLDER_BOOTING: &str = "Starting…";
const JUMP_HINT: &str = " ↓ scroll to latest (End) ";

/// Left margin of message content below the meta line
const INDENT: &str = "  ";

const TYPING_FRAMES: [&str; 4] = ["●○○", "○●○", "○○●", "○●○"];

pub fn draw(frame: &mut Frame, app: &mut App) {
    let [header, body, status, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(3),
    ])
    .areas(frame.area());

    draw_header(frame, header, &app.snapshot);
    draw_body(frame, body, app);
    draw_status(frame, status, app);
    frame.render_widget(&app.input, footer);
}

fn draw_header(frame: &mut Frame, area: Rect, snapshot: &ChatSnapshot) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let title = Paragraph::new(vec![
        Line::from(vec![
            Span::raw("🗞  "),
            Span::styled(TITLE, Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::styled(SUBTITLE, Style::default().fg(Color::Gray)),
    ]);
    frame.render_widget(title, inner);

    let session = Paragraph::new(Line::styled(
        format!("session: {}", snapshot.session_label()),
        Style::default().fg(Color::DarkGray),
    ))
    .alignment(Alignment::Right);
    frame.render_widget(session, inner);
}

fn draw_body(frame: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::bordered()
        .title(" Conversation ")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);

    let lines = transcript(
        &app.snapshot,
        Utc::now(),
        usize::from(inner.width),
        app.ticks,
    );
    app.set_geometry(lines.len(), usize::from(inner.height));

    let offset = u16::try_from(app.offset).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(lines).block(block).scroll((offset, 0)), area);

    if app.scroll.show_jump_to_latest() && inner.height > 0 {
        let width = (display_width(JUMP_HINT) as u16).min(inner.width);
        let hint = Rect {
            x: inner.right().saturating_sub(width),
            y: inner.bottom().saturating_sub(1),
            width,
            height: 1,
        };
        frame.render_widget(Clear, hint);
        frame.render_widget(
            Paragraph::new(JUMP_HINT).style(Style::default().fg(Color::Black).bg(Color::Cyan)),
            hint,
        );
    }
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let line = match &app.notice {
        Some(notice) => {
            let color = if notice.is_error() { Color::Red } else { Color::Yellow };
            Line::styled(format!("⚠ {}", notice.message), Style::default().fg(color))
        }
        None => hints(&app.snapshot),
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Key hints; unavailable actions are dimmed
pub fn hints(snapshot: &ChatSnapshot) -> Line<'static> {
    let active = Style::default().fg(Color::Gray);
    let inactive = Style::default().fg(Color::DarkGray);

    let send = if snapshot.sending {
        Span::styled("Sending…", Style::default().fg(Color::Yellow))
    } else if snapshot.input_enabled() {
        Span::styled("Enter send", active)
    } else {
        Span::styled("Enter send", inactive)
    };
    let reset = if snapshot.can_reset() {
        Span::styled("Ctrl-R reset", active)
    } else {
        Span::styled("Ctrl-R reset", inactive)
    };

    Line::from(vec![
        send,
        Span::styled(" · ", inactive),
        reset,
        Span::styled(" · ", inactive),
        if snapshot.latest_answer().is_some() {
            Span::styled("Ctrl-Y copy", active)
        } else {
            Span::styled("Ctrl-Y copy", inactive)
        },
        Span::styled(" · PgUp/PgDn scroll · End latest · Esc quit", inactive),
    ])
}

/// All transcript lines for `snapshot`, wrapped to `width` columns
pub fn transcript(
    snapshot: &ChatSnapshot,
    now: DateTime<Utc>,
    width: usize,
    ticks: usize,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    if snapshot.booting() {
        lines.push(Line::styled(
            BOOTING_NOTICE,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ));
    }
    if let Some(error) = &snapshot.error {
        for row in wrap_text(&format!("⚠ {}", error), width) {
            lines.push(Line::styled(row, Style::default().fg(Color::Red)));
        }
    }
    if !lines.is_empty() {
        lines.push(Line::default());
    }

    for message in &snapshot.messages {
        push_message(&mut lines, message, now, width);
    }

    if snapshot.sending {
        lines.push(meta_line(Role::Assistant, ""));
        let frame = TYPING_FRAMES[ticks % TYPING_FRAMES.len()];
        lines.push(Line::styled(
            format!("{}{}", INDENT, frame),
            Style::default().fg(Color::Magenta),
        ));
    }

    lines
}

fn role_color(role: Role) -> Color {
    match role {
        Role::User => Color::Cyan,
        Role::Assistant => Color::Magenta,
    }
}

fn meta_line(role: Role, ago: &str) -> Line<'static> {
    let mut spans = vec![Span::styled(
        role.display_name(),
        Style::default().fg(role_color(role)).add_modifier(Modifier::BOLD),
    )];
    if !ago.is_empty() {
        spans.push(" • ".dark_gray());
        spans.push(Span::styled(ago.to_string(), Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

fn push_message(lines: &mut Vec<Line<'static>>, message: &Message, now: DateTime<Utc>, width: usize) {
    lines.push(meta_line(message.role, &time_ago(message.timestamp, now)));

    let content_width = width.saturating_sub(INDENT.len());
    for row in wrap_text(&message.content, content_width) {
        lines.push(Line::raw(format!("{}{}", INDENT, row)));
    }

    if !message.sources.is_empty() {
        let chip = Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
        for source in &message.sources {
            for (i, row) in wrap_text(source.label(), content_width.saturating_sub(2))
                .into_iter()
                .enumerate()
            {
                let bullet = if i == 0 { "◦ " } else { "  " };
                lines.push(Line::from(vec![
                    Span::raw(format!("{}{}", INDENT, bullet)),
                    Span::styled(row, chip),
                ]));
            }
        }
    }

    lines.push(Line::default());
}

pub fn display_width(text: &str) -> usize {
    Span::raw(text).width()
}

/// Greedy word wrap by display width.
///
/// Explicit newlines are kept, words wider than `width` are split, and an
/// empty input still yields one (empty) row.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = display_width(word);
            let gap = usize::from(!current.is_empty());

            if current_width + gap + word_width <= width {
                if gap == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                current_width += gap + word_width;
                continue;
            }

            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
                current_width = 0;
            }

            if word_width <= width {
                current.push_str(word);
                current_width = word_width;
                continue;
            }

            let mut buf = [0u8; 4];
            for ch in word.chars() {
                let ch_width = display_width(ch.encode_utf8(&mut buf));
                if current_width + ch_width > width && !current.is_empty() {
                    rows.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(ch);
                current_width += ch_width;
            }
        }

        rows.push(current);
    }

    rows
}
