//! Messages pane: the active conversation's transcript.
//!
//! Bot messages are rendered through the segment parser (styled text, code
//! blocks, links). User messages sent from this client appear immediately
//! as pending entries until the server's copy arrives.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::format::{self, Run, Segment};
use crate::models::{Conversation, Message, Role};
use crate::sync::reconcile;

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// A transcript line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub message: Message,
    /// Sent from here but not yet confirmed by the server.
    pub pending: bool,
}

#[derive(Default)]
pub struct MessagesState {
    /// Conversation title shown above the transcript.
    pub header: String,
    pub entries: Vec<Entry>,
    /// Lines scrolled up from the bottom (0 = follow newest).
    pub scroll_from_bottom: usize,
    /// Peer typing indicator from the push channel.
    pub peer_typing: bool,
}

impl MessagesState {
    /// Replace the transcript with a conversation's messages.
    pub fn load(&mut self, conv: &Conversation) {
        self.header = conv.name.clone();
        self.entries = conv
            .messages
            .iter()
            .cloned()
            .map(|message| Entry {
                message,
                pending: false,
            })
            .collect();
        self.scroll_from_bottom = 0;
        self.peer_typing = false;
    }

    /// Append a user message optimistically.
    pub fn push_pending(&mut self, content: &str) {
        self.entries.push(Entry {
            message: Message::now(Role::User, content),
            pending: true,
        });
        self.scroll_from_bottom = 0;
    }

    /// Remove the newest pending entry with `content`. Returns whether one
    /// was found.
    pub fn rollback_pending(&mut self, content: &str) -> bool {
        match self
            .entries
            .iter()
            .rposition(|e| e.pending && e.message.content == content)
        {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Merge messages the server confirmed.
    ///
    /// A server copy of a pending user message replaces it in place; the
    /// rest go through the reconciler against the confirmed entries.
    pub fn apply_accepted(&mut self, accepted: &[Message]) {
        let mut rest = Vec::new();
        for msg in accepted {
            let echo = self.entries.iter_mut().find(|e| {
                e.pending && e.message.role == msg.role && e.message.content == msg.content
            });
            match echo {
                Some(entry) => {
                    entry.message = msg.clone();
                    entry.pending = false;
                }
                None => rest.push(msg.clone()),
            }
        }

        let confirmed: Vec<Message> = self
            .entries
            .iter()
            .filter(|e| !e.pending)
            .map(|e| e.message.clone())
            .collect();
        for message in reconcile(&confirmed, &rest).accepted {
            self.entries.push(Entry {
                message,
                pending: false,
            });
        }
    }

    /// Newest message that is not the user's own.
    pub fn last_bot_message(&self) -> Option<&Message> {
        self.entries
            .iter()
            .rev()
            .map(|e| &e.message)
            .find(|m| m.role != Role::User)
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(lines);
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the messages pane into the given area.
pub fn render(area: Rect, buf: &mut Buffer, state: &MessagesState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Reserve the first line for the conversation header.
    let header_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_header(header_area, buf, state);

    let messages_area = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if messages_area.height == 0 {
        return;
    }

    let all_lines = build_lines(state, messages_area.width as usize);
    let total_lines = all_lines.len();
    let visible_height = messages_area.height as usize;

    let max_scroll = total_lines.saturating_sub(visible_height);
    let from_bottom = state.scroll_from_bottom.min(max_scroll);
    let scroll = max_scroll - from_bottom;

    for (row, line) in all_lines.iter().skip(scroll).take(visible_height).enumerate() {
        let line_area = Rect::new(messages_area.x, messages_area.y + row as u16, messages_area.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    if total_lines > visible_height {
        let indicator_x = messages_area.x + messages_area.width.saturating_sub(1);
        if scroll > 0 {
            let cell = &mut buf[(indicator_x, messages_area.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if from_bottom > 0 {
            let bottom_y = messages_area.y + messages_area.height.saturating_sub(1);
            let cell = &mut buf[(indicator_x, bottom_y)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

fn render_header(area: Rect, buf: &mut Buffer, state: &MessagesState) {
    let title = if state.header.is_empty() {
        "(no conversation)"
    } else {
        state.header.as_str()
    };
    let mut spans = vec![Span::styled(
        format!(" {} ", title),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )];
    if state.peer_typing {
        spans.push(Span::styled(
            " bot is typing...",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ));
    }
    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn build_lines(state: &MessagesState, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let body_width = width.saturating_sub(3);
    if body_width < 8 {
        return lines;
    }

    for entry in &state.entries {
        let msg = &entry.message;
        let name_style = match msg.role {
            Role::User => Style::default().fg(Color::Cyan),
            Role::Bot => Style::default().fg(Color::Green),
            Role::Admin => Style::default().fg(Color::Magenta),
        }
        .add_modifier(Modifier::BOLD);

        let mut header = vec![
            Span::styled(format!(" {}", msg.role.label()), name_style),
            Span::styled(
                format!("  {}", msg.display_time()),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if entry.pending {
            header.push(Span::styled(
                "  sending...",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ));
        }
        lines.push(Line::from(header));

        let body = if msg.role.is_formatted() {
            segment_lines(&format::parse(&msg.content), body_width)
        } else {
            plain_lines(&msg.content, body_width)
        };
        for line in body {
            let mut spans = vec![Span::raw("   ")];
            spans.extend(line.spans);
            lines.push(Line::from(spans));
        }

        lines.push(Line::from(""));
    }

    lines
}

fn plain_lines(text: &str, width: usize) -> Vec<Line<'static>> {
    let runs = [Run {
        text: text.to_string(),
        ..Run::default()
    }];
    wrap_runs(&runs, width)
}

/// Lay out parsed segments as terminal lines.
fn segment_lines(segments: &[Segment], width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut inline: Vec<Run> = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text { html } => inline.extend(format::inline_runs(html)),
            Segment::Link { label, url } => {
                // Links flow with the surrounding text.
                inline.push(Run {
                    text: format!("{} <{}>", label, url),
                    emphasis: true,
                    ..Run::default()
                });
            }
            Segment::Code { language, body } => {
                lines.extend(wrap_runs(&std::mem::take(&mut inline), width));
                lines.push(Line::from(Span::styled(
                    format!("[{}]", language),
                    Style::default().fg(Color::DarkGray),
                )));
                let code_style = Style::default().fg(Color::Yellow);
                for code_line in body.lines() {
                    lines.push(Line::from(vec![
                        Span::styled("| ", Style::default().fg(Color::DarkGray)),
                        Span::styled(code_line.to_string(), code_style),
                    ]));
                }
            }
        }
    }
    lines.extend(wrap_runs(&inline, width));
    lines
}

fn run_style(run: &Run) -> Style {
    let mut style = Style::default();
    if run.strong {
        style = style.add_modifier(Modifier::BOLD);
    }
    if run.emphasis {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if run.code {
        style = style.fg(Color::Yellow);
    }
    if run.heading {
        style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
    }
    style
}

/// Word-wrap styled runs to `width` columns, honouring embedded newlines.
fn wrap_runs(runs: &[Run], width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut used = 0usize;

    for run in runs {
        let style = run_style(run);
        for (i, piece) in run.text.split('\n').enumerate() {
            if i > 0 {
                lines.push(Line::from(std::mem::take(&mut current)));
                used = 0;
            }
            for word in piece.split_inclusive(' ') {
                let w = word.width();
                if used > 0 && used + word.trim_end().width() > width {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    used = 0;
                }
                current.push(Span::styled(word.to_string(), style));
                used += w;
            }
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    // Drop trailing blank lines left by a closing newline.
    while lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
    lines
}
