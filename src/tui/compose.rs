//! Compose box: single-line message input.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

/// Input buffer with a char-indexed cursor.
#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
}

impl ComposeState {
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Delete the character before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor_pos > 0 {
            let end = self.char_to_byte(self.cursor_pos);
            let start = self.char_to_byte(self.cursor_pos - 1);
            self.input.drain(start..end);
            self.cursor_pos -= 1;
        }
    }

    /// Delete the character at the cursor.
    pub fn delete(&mut self) {
        if self.cursor_pos < self.char_count() {
            let start = self.char_to_byte(self.cursor_pos);
            let end = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(start..end);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.char_count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.char_count();
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Take the trimmed text and clear the box. `None` if there is nothing
    /// to send.
    pub fn take(&mut self) -> Option<String> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.clear();
        Some(text)
    }

    fn char_count(&self) -> usize {
        self.input.chars().count()
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Border + input line + border.
pub const COMPOSE_HEIGHT: u16 = 3;

pub fn render(area: Rect, frame: &mut Frame, state: &ComposeState, chat_name: &str, typing: bool) {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(Color::Yellow));
    if typing {
        block = block.title_bottom(Line::from(" typing ").right_aligned());
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }
    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let width = input_area.width as usize;

    if state.input.is_empty() {
        let placeholder: String = format!(" Message {}...", chat_name).chars().take(width).collect();
        frame.render_widget(
            Paragraph::new(Span::styled(placeholder, Style::default().fg(Color::DarkGray))),
            input_area,
        );
        frame.set_cursor_position((input_area.x + 1, input_area.y));
    } else {
        let display = visible_window(&state.input, state.cursor_pos, width);
        frame.render_widget(
            Paragraph::new(Span::styled(
                format!(" {}", display.visible),
                Style::default().fg(Color::White),
            )),
            input_area,
        );
        frame.set_cursor_position((input_area.x + 1 + display.cursor_offset as u16, input_area.y));
    }
}

#[derive(Debug, PartialEq, Eq)]
struct DisplayText {
    visible: String,
    /// Cursor column within `visible`.
    cursor_offset: usize,
}

/// Horizontally scroll the input so the cursor stays in view.
fn visible_window(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    // One column of left margin.
    let avail = width.saturating_sub(1);
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= avail {
        return DisplayText {
            visible: input.to_string(),
            cursor_offset: cursor_pos,
        };
    }

    let start = if cursor_pos < avail {
        0
    } else {
        cursor_pos - avail + 1
    };
    let end = (start + avail).min(chars.len());
    DisplayText {
        visible: chars[start..end].iter().collect(),
        cursor_offset: cursor_pos - start,
    }
}
