//! Turning segments back into terminal-friendly text.

use super::Segment;

/// A run of text with uniform inline style, decoded from a `Text` segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
    pub heading: bool,
}

/// Decode the HTML produced by the parser into styled runs.
///
/// Only the tags the parser emits are understood. `<li>` becomes a bullet
/// glyph. Entities are restored.
pub fn inline_runs(html: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current = Run::default();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        current.text.push_str(&unescape(&rest[..lt]));
        let Some(gt) = rest[lt..].find('>') else {
            current.text.push_str(&unescape(&rest[lt..]));
            rest = "";
            break;
        };
        let tag = &rest[lt + 1..lt + gt];
        rest = &rest[lt + gt + 1..];

        let mut next = Run {
            text: String::new(),
            ..current.clone()
        };
        match tag {
            "strong" => next.strong = true,
            "/strong" => next.strong = false,
            "em" => next.emphasis = true,
            "/em" => next.emphasis = false,
            "code" => next.code = true,
            "/code" => next.code = false,
            "h1" | "h2" | "h3" => next.heading = true,
            "/h1" | "/h2" | "/h3" => next.heading = false,
            "li" => {
                current.text.push_str("• ");
                continue;
            }
            "/li" => continue,
            other => {
                current.text.push('<');
                current.text.push_str(other);
                current.text.push('>');
                continue;
            }
        }
        if !current.text.is_empty() {
            runs.push(current);
        }
        current = next;
    }

    current.text.push_str(&unescape(rest));
    if !current.text.is_empty() {
        runs.push(current);
    }
    runs
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Tag-free text, as used for copying or exporting a message.
pub fn plain_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text { html } => {
                for run in inline_runs(html) {
                    out.push_str(&run.text);
                }
            }
            Segment::Code { body, .. } => out.push_str(body),
            Segment::Link { label, .. } => out.push_str(label),
        }
    }
    out
}

/// Line-oriented rendering for plain terminals (no styling).
///
/// Code blocks are set on their own lines, framed by the language tag.
/// Links keep their target visible.
pub fn to_terminal(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text { html } => {
                for run in inline_runs(html) {
                    out.push_str(&run.text);
                }
            }
            Segment::Code { language, body } => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&format!("  [{}]\n", language));
                for line in body.lines() {
                    out.push_str("  | ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Segment::Link { label, url } => {
                out.push_str(&format!("{} <{}>", label, url));
            }
        }
    }
    out
}
