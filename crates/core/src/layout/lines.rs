//! Message text to classified, wrapped lines.

use serde::Serialize;

use crate::extract::BULLET_MARKER;
use crate::model::Message;

use super::{Font, LayoutBackend};

pub const BEGIN_CODE_PREFIX: &str = "[[BEGIN_CODE:";
pub const END_CODE_MARKER: &str = "[[END_CODE]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineKind {
    Header,
    Bullet,
    CodeLabel,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub kind: LineKind,
}

impl Line {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Line {
            text: text.into(),
            kind,
        }
    }
}

/// Message text with each code block expanded between begin/end markers.
pub fn expand_for_layout(message: &Message) -> String {
    message.expand_code_blocks(|block| {
        format!(
            "\n{}{}]]\n{}\n{}\n",
            BEGIN_CODE_PREFIX, block.language, block.code, END_CODE_MARKER
        )
    })
}

/// Split expanded text into lines and classify them.
///
/// Blank lines are dropped. Lines between the begin and end markers are body
/// lines verbatim (minus trailing whitespace), so code is never read as
/// headers or bullets.
pub fn classify(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if in_code {
            if trimmed == END_CODE_MARKER {
                in_code = false;
            } else {
                lines.push(Line::new(LineKind::Body, raw.trim_end()));
            }
            continue;
        }

        if let Some(language) = code_label(trimmed) {
            in_code = true;
            lines.push(Line::new(LineKind::CodeLabel, language));
        } else if trimmed == END_CODE_MARKER {
            continue;
        } else if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                lines.push(Line::new(LineKind::Header, heading.to_uppercase()));
            }
        } else if let Some(item) = bullet_item(trimmed) {
            lines.push(Line::new(
                LineKind::Bullet,
                format!("{}{}", BULLET_MARKER, item),
            ));
        } else {
            lines.push(Line::new(LineKind::Body, trimmed));
        }
    }

    lines
}

fn code_label(line: &str) -> Option<&str> {
    line.strip_prefix(BEGIN_CODE_PREFIX)?.strip_suffix("]]")
}

fn bullet_item(line: &str) -> Option<&str> {
    [BULLET_MARKER, "- ", "* "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim_start)
}

/// Greedy word wrap on spaces.
///
/// Runs of spaces are kept (code indentation survives); a word wider than
/// `max_width` is broken between characters. Always returns at least one line.
pub fn wrap(
    text: &str,
    max_width: f32,
    font: Font,
    size: f32,
    backend: &dyn LayoutBackend,
) -> Vec<String> {
    let fits = |s: &str| backend.text_width(s, font, size) <= max_width;

    let mut out = Vec::new();
    let mut current = String::new();
    let mut started = false;

    for word in text.split(' ') {
        let candidate = if started {
            format!("{} {}", current, word)
        } else {
            word.to_string()
        };
        if fits(&candidate) {
            current = candidate;
            started = true;
            continue;
        }

        if !current.trim().is_empty() {
            out.push(current.trim_end().to_string());
        }
        if fits(word) {
            current = word.to_string();
        } else {
            let mut pieces = break_word(word, &fits);
            current = pieces.pop().unwrap_or_default();
            out.extend(pieces);
        }
        started = true;
    }

    if !current.trim().is_empty() || out.is_empty() {
        out.push(current.trim_end().to_string());
    }
    out
}

fn break_word(word: &str, fits: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in word.chars() {
        piece.push(c);
        if !fits(&piece) && piece.chars().count() > 1 {
            piece.pop();
            pieces.push(std::mem::take(&mut piece));
            piece.push(c);
        }
    }
    pieces.push(piece);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ApproxMetrics;
    use crate::model::{CodeBlock, CodeBlockId, Role};

    fn kinds(lines: &[Line]) -> Vec<LineKind> {
        lines.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_expand_for_layout_wraps_code_in_markers() {
        let message = Message {
            role: Role::Assistant,
            text: "Run:\n[[CODE_BLOCK:code-0]]".to_string(),
            code_blocks: vec![CodeBlock {
                id: CodeBlockId::new(0),
                language: "sh".to_string(),
                code: "ls -la".to_string(),
            }],
            images: vec![],
        };
        assert_eq!(
            expand_for_layout(&message),
            "Run:\n\n[[BEGIN_CODE:sh]]\nls -la\n[[END_CODE]]\n"
        );
    }

    #[test]
    fn test_classify_kinds() {
        let lines = classify("## TITLE\n\nIntro\n• one\n- two\n* three\n\n\nOutro");
        assert_eq!(
            kinds(&lines),
            vec![
                LineKind::Header,
                LineKind::Body,
                LineKind::Bullet,
                LineKind::Bullet,
                LineKind::Bullet,
                LineKind::Body,
            ]
        );
        assert_eq!(lines[0].text, "TITLE");
        assert_eq!(lines[3].text, "• two");
    }

    #[test]
    fn test_classify_header_is_uppercased() {
        let lines = classify("# Mixed case");
        assert_eq!(lines, vec![Line::new(LineKind::Header, "MIXED CASE")]);
    }

    #[test]
    fn test_code_region_is_body() {
        let text = "[[BEGIN_CODE:python]]\n# comment\n- not a bullet\n    indented  \n\n[[END_CODE]]\nafter";
        let lines = classify(text);
        assert_eq!(
            lines,
            vec![
                Line::new(LineKind::CodeLabel, "python"),
                Line::new(LineKind::Body, "# comment"),
                Line::new(LineKind::Body, "- not a bullet"),
                Line::new(LineKind::Body, "    indented"),
                Line::new(LineKind::Body, "after"),
            ]
        );
    }

    #[test]
    fn test_stray_end_marker_is_dropped() {
        assert_eq!(classify("[[END_CODE]]\ntext"), vec![Line::new(LineKind::Body, "text")]);
    }

    #[test]
    fn test_wrap_greedy() {
        // ApproxMetrics at size 10: 5 points per char, 50 points = 10 chars.
        let lines = wrap("aaaa bbbb cccc dd", 50.0, Font::Helvetica, 10.0, &ApproxMetrics);
        assert_eq!(lines, vec!["aaaa bbbb", "cccc dd"]);
    }

    #[test]
    fn test_wrap_breaks_long_words() {
        let lines = wrap("abcdefghijklmnopqrstuvwxy z", 50.0, Font::Helvetica, 10.0, &ApproxMetrics);
        assert_eq!(lines, vec!["abcdefghij", "klmnopqrst", "uvwxy z"]);
    }

    #[test]
    fn test_wrap_keeps_indentation() {
        let lines = wrap("    x = 1", 100.0, Font::Helvetica, 10.0, &ApproxMetrics);
        assert_eq!(lines, vec!["    x = 1"]);
    }

    #[test]
    fn test_wrap_empty_and_fitting() {
        assert_eq!(wrap("", 50.0, Font::Helvetica, 10.0, &ApproxMetrics), vec![""]);
        assert_eq!(wrap("short", 50.0, Font::Helvetica, 10.0, &ApproxMetrics), vec!["short"]);
    }

    #[test]
    fn test_wrapped_lines_fit() {
        let text = "The quick brown fox jumps over the lazy dog and keeps running far away";
        for line in wrap(text, 80.0, Font::Helvetica, 10.0, &ApproxMetrics) {
            assert!(ApproxMetrics.text_width(&line, Font::Helvetica, 10.0) <= 80.0);
        }
    }
}
