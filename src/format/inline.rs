//! Inline formatting for text runs.
//!
//! Substitution only: each construct is replaced left to right in a fixed
//! order, with no nesting grammar. Overlapping bold/italic spans are not
//! handled specially.

use super::{BULLET_CLOSE, BULLET_OPEN, HEADING_CLOSE, HEADING_OPEN};

/// Escape, then apply code spans, bold, italic, bullet items and headings.
pub(super) fn format(text: &str) -> String {
    let html = escape_html(text);
    let html = code_spans(&html);
    let html = delimited(&html, "**", "<strong>", "</strong>");
    let html = delimited(&html, "*", "<em>", "</em>");
    let mut out = String::with_capacity(html.len() + 16);
    for c in html.chars() {
        if c == BULLET_OPEN {
            out.push_str("<li>");
        } else if c == BULLET_CLOSE {
            out.push_str("</li>");
        } else if let Some(i) = HEADING_OPEN.iter().position(|&h| h == c) {
            out.push_str(&format!("<h{}>", i + 1));
        } else if let Some(i) = HEADING_CLOSE.iter().position(|&h| h == c) {
            out.push_str(&format!("</h{}>", i + 1));
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace `delim content delim` where content is non-empty and holds no `*`.
fn delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(delim) {
        let body_start = start + delim.len();
        let body_len = rest[body_start..].find('*');
        match body_len {
            Some(len) if len > 0 && rest[body_start + len..].starts_with(delim) => {
                out.push_str(&rest[..start]);
                out.push_str(open);
                out.push_str(&rest[body_start..body_start + len]);
                out.push_str(close);
                rest = &rest[body_start + len + delim.len()..];
            }
            _ => {
                // Keep the first '*' literal and resume just after it.
                out.push_str(&rest[..start + 1]);
                rest = &rest[start + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `` `x` `` to `<code>x</code>`. Runs of several backticks (fence remnants)
/// are left alone.
fn code_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('`') {
        if rest[start + 1..].starts_with('`') {
            let run = rest[start..]
                .find(|c: char| c != '`')
                .unwrap_or(rest.len() - start);
            out.push_str(&rest[..start + run]);
            rest = &rest[start + run..];
            continue;
        }
        let body_start = start + 1;
        let close = rest[body_start..].find('`').map(|i| body_start + i);
        match close {
            Some(end)
                if end > body_start
                    && !rest[body_start..end].contains('\n')
                    && !rest[end + 1..].starts_with('`') =>
            {
                out.push_str(&rest[..start]);
                out.push_str("<code>");
                out.push_str(&rest[body_start..end]);
                out.push_str("</code>");
                rest = &rest[end + 1..];
            }
            _ => {
                out.push_str(&rest[..body_start]);
                rest = &rest[body_start..];
            }
        }
    }
    out.push_str(rest);
    out
}
