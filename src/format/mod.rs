//! Bot message formatting: raw markup to ordered, typed segments.
//!
//! The dialect is small: `* ` bullet lines, `#` to `###` headings, fenced
//! code blocks with an optional language tag, `[label](url)` links,
//! `**bold**`, `*italic*` and `` `inline code` ``. Parsing is total. Anything that does not form a
//! complete construct is kept as literal text.

mod inline;
mod render;

use serde::Serialize;

pub use render::{inline_runs, plain_text, to_terminal, Run};

/// Language reported for fenced blocks without a tag.
pub const DEFAULT_LANGUAGE: &str = "plaintext";

const FENCE: &str = "```";

/// Internal line markers, from the private-use area. Any occurrence in the
/// input is stripped before marking.
pub(crate) const BULLET_OPEN: char = '\u{E000}';
pub(crate) const BULLET_CLOSE: char = '\u{E001}';
/// Opener and closer for `#`, `##` and `###`.
pub(crate) const HEADING_OPEN: [char; 3] = ['\u{E002}', '\u{E003}', '\u{E004}'];
pub(crate) const HEADING_CLOSE: [char; 3] = ['\u{E005}', '\u{E006}', '\u{E007}'];

fn is_marker(c: char) -> bool {
    ('\u{E000}'..='\u{E007}').contains(&c)
}

/// One renderable unit of a bot message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    /// Prose with inline formatting applied as HTML.
    Text { html: String },
    Code { language: String, body: String },
    Link { label: String, url: String },
}

impl Segment {
    fn text(html: String) -> Self {
        Segment::Text { html }
    }
}

/// Parse raw bot text into segments, in source order.
pub fn parse(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();

    for (i, block) in split_fences(raw).into_iter().enumerate() {
        match block {
            // Only the first block starts a line; the rest follow a fence.
            Block::Text(run) => push_text_run(&mut segments, &mark_lines(run, i == 0)),
            Block::Code { language, body } => segments.push(Segment::Code {
                language: language.unwrap_or(DEFAULT_LANGUAGE).to_string(),
                body: trim_blank_lines(body),
            }),
        }
    }

    segments
}

/// Rewrite bullet and heading lines of a text run as marker-wrapped spans.
/// `line_start` tells whether the run's first line is a whole line.
fn mark_lines(run: &str, line_start: bool) -> String {
    let clean: String = run.chars().filter(|c| !is_marker(*c)).collect();
    let mut out = String::with_capacity(clean.len() + 8);
    for (i, line) in clean.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if i == 0 && !line_start {
            out.push_str(line);
        } else if let Some(item) = line.trim_start().strip_prefix("* ") {
            out.push(BULLET_OPEN);
            out.push_str(item);
            out.push(BULLET_CLOSE);
        } else if let Some((level, title)) = heading(line) {
            out.push(HEADING_OPEN[level - 1]);
            out.push_str(title);
            out.push(HEADING_CLOSE[level - 1]);
        } else {
            out.push_str(line);
        }
    }
    out
}

/// `# x`, `## x` or `### x` at the very start of a line.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.len() - line.trim_start_matches('#').len();
    let title = line[level..].strip_prefix(' ')?;
    (1..=3).contains(&level).then_some((level, title))
}

fn is_bullet_line(prefix: &str) -> bool {
    prefix.trim_start().starts_with("* ")
}

enum Block<'a> {
    Text(&'a str),
    Code {
        language: Option<&'a str>,
        body: &'a str,
    },
}

/// Split on balanced fence pairs. An opener without a closer stays text.
fn split_fences(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut run_start = 0;
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(FENCE) {
        let open = cursor + rel;
        let Some((language, body_start)) = fence_opener(text, open) else {
            // Not an opener here (e.g. "````"); retry one character on.
            cursor = open + 1;
            continue;
        };
        let Some(close_rel) = text[body_start..].find(FENCE) else {
            // No closer anywhere after this point, so no later opener can
            // close either.
            break;
        };
        let close = body_start + close_rel;

        if open > run_start {
            blocks.push(Block::Text(&text[run_start..open]));
        }
        blocks.push(Block::Code {
            language,
            body: &text[body_start..close],
        });
        run_start = close + FENCE.len();
        cursor = run_start;
    }

    if run_start < text.len() {
        blocks.push(Block::Text(&text[run_start..]));
    }
    blocks
}

/// Match "```" + optional word tag + newline at `at`. Returns the tag and the
/// byte offset where the body starts.
fn fence_opener(text: &str, at: usize) -> Option<(Option<&str>, usize)> {
    // A bullet item is prose to its end of line.
    let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    if is_bullet_line(&text[line_start..at]) {
        return None;
    }
    let after = &text[at + FENCE.len()..];
    let tag_len = after
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(after.len());
    let rest = &after[tag_len..];
    let newline = if rest.starts_with("\r\n") {
        2
    } else if rest.starts_with('\n') {
        1
    } else {
        return None;
    };
    let language = (tag_len > 0).then(|| &after[..tag_len]);
    Some((language, at + FENCE.len() + tag_len + newline))
}

/// Drop whitespace-only lines at either end of a code body.
fn trim_blank_lines(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Split a text run on `[label](url)` links, formatting the prose between.
fn push_text_run(segments: &mut Vec<Segment>, run: &str) {
    let mut rest = run;
    while let Some((start, end, label, url)) = find_link(rest) {
        if start > 0 {
            segments.push(Segment::text(inline::format(&rest[..start])));
        }
        segments.push(Segment::Link {
            label: label.to_string(),
            url: url.to_string(),
        });
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push(Segment::text(inline::format(rest)));
    }
}

/// Leftmost `[label](url)` with non-empty label and url.
/// Returns (start, end, label, url) as byte offsets into `text`.
fn find_link(text: &str) -> Option<(usize, usize, &str, &str)> {
    let mut from = 0;
    while let Some(rel) = text[from..].find('[') {
        let start = from + rel;
        from = start + 1;

        let label_start = start + 1;
        let Some(label_len) = text[label_start..].find(']') else {
            return None;
        };
        if label_len == 0 {
            continue;
        }
        let after_label = label_start + label_len + 1;
        if !text[after_label..].starts_with('(') {
            continue;
        }
        let url_start = after_label + 1;
        let Some(url_len) = text[url_start..].find(')') else {
            continue;
        };
        if url_len == 0 {
            continue;
        }
        let end = url_start + url_len + 1;
        return Some((
            start,
            end,
            &text[label_start..label_start + label_len],
            &text[url_start..url_start + url_len],
        ));
    }
    None
}
