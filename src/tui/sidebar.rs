//! Sidebar widget: the user's conversations.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::Conversation;

/// Conversation list and the active selection.
#[derive(Default)]
pub struct SidebarState {
    pub conversations: Vec<Conversation>,
    pub active: usize,
    /// Whether the first load is still in flight.
    pub loading: bool,
}

impl SidebarState {
    pub fn active(&self) -> Option<&Conversation> {
        self.conversations.get(self.active)
    }

    /// Replace the list, keeping `keep` selected if it still exists.
    pub fn update(&mut self, conversations: Vec<Conversation>, keep: Option<&str>) {
        self.conversations = conversations;
        self.loading = false;
        self.active = keep
            .and_then(|id| self.conversations.iter().position(|c| c.chat_id == id))
            .unwrap_or(0);
    }

    /// Select by id. Returns whether it was found.
    pub fn select(&mut self, chat_id: &str) -> bool {
        match self.conversations.iter().position(|c| c.chat_id == chat_id) {
            Some(idx) => {
                self.active = idx;
                true
            }
            None => false,
        }
    }

    /// Move the selection by `delta`, wrapping around.
    pub fn cycle(&mut self, delta: isize) -> Option<&Conversation> {
        let len = self.conversations.len();
        if len == 0 {
            return None;
        }
        let next = (self.active as isize + delta).rem_euclid(len as isize);
        self.active = next as usize;
        self.conversations.get(self.active)
    }

    /// Insert or update a conversation in place.
    pub fn upsert(&mut self, conversation: Conversation) {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.chat_id == conversation.chat_id)
        {
            Some(existing) => *existing = conversation,
            None => self.conversations.push(conversation),
        }
    }
}

pub fn render(area: Rect, buf: &mut Buffer, state: &SidebarState) {
    let block = Block::default()
        .title(" Chats ")
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let width = inner.width as usize;
    let mut lines = Vec::new();

    if state.loading {
        lines.push(Line::from(Span::styled(
            " loading...",
            Style::default().fg(Color::DarkGray),
        )));
    } else if state.conversations.is_empty() {
        lines.push(Line::from(Span::styled(
            " (none, C-n: new)",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for (idx, conv) in state.conversations.iter().enumerate() {
        let selected = idx == state.active;
        let marker = if selected { ">" } else { " " };
        let name: String = format!("{} {}", marker, conv.name)
            .chars()
            .take(width)
            .collect();
        let style = if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(Span::styled(name, style)));
    }

    // Keep the active entry in view.
    let visible = inner.height as usize;
    let skip = (state.active + 1).saturating_sub(visible);
    let shown: Vec<Line> = lines.into_iter().skip(skip).collect();
    Paragraph::new(shown).render(inner, buf);
}
