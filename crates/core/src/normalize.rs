//! Text normalizer for extracted message prose.
//!
//! An ordered list of small rules, each undoing one artifact of scraping chat
//! pages: mis-decoded emoji surrogates, stray control glyphs, icon-font
//! codepoints, leaked button labels, fragmented capitals and noisy whitespace.
//! Code block content never goes through here.

use std::sync::OnceLock;

use regex::Regex;

/// A named text transform. Order in [`RULES`] matters.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

pub const RULES: [Rule; 8] = [
    Rule {
        name: "strip_mojibake_sequences",
        apply: strip_mojibake_sequences,
    },
    Rule {
        name: "strip_stray_control_glyphs",
        apply: strip_stray_control_glyphs,
    },
    Rule {
        name: "strip_private_use",
        apply: strip_private_use,
    },
    Rule {
        name: "strip_copy_code_labels",
        apply: strip_copy_code_labels,
    },
    Rule {
        name: "fold_fragmented_capitals",
        apply: fold_fragmented_capitals,
    },
    Rule {
        name: "collapse_horizontal_whitespace",
        apply: collapse_horizontal_whitespace,
    },
    Rule {
        name: "collapse_blank_lines",
        apply: collapse_blank_lines,
    },
    Rule {
        name: "trim",
        apply: trim,
    },
];

/// Run every rule in order until the text stops changing.
///
/// A removal can expose a new match for an earlier rule (for example a
/// control glyph sitting inside a mojibake sequence), so a single pass is not
/// a fixed point. Every rule either shortens the text or leaves it unchanged,
/// apart from tab-to-space rewrites, so the loop terminates.
pub fn normalize(text: &str) -> String {
    let mut current = apply_rules(text);
    loop {
        let next = apply_rules(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn apply_rules(text: &str) -> String {
    RULES
        .iter()
        .fold(text.to_string(), |acc, rule| (rule.apply)(&acc))
}

/// Remove emoji surrogate pairs that were decoded as Latin-1.
///
/// A high surrogate `D83C`..`D83E` shows up as `Ø` followed by `<`, `=` or
/// `>`; the low surrogate leaves one of `Ü Ý Þ ß` plus an ASCII byte.
pub fn strip_mojibake_sequences(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Ø[<=>][A-Za-z0-9=<>_\-ÜÝÞß]*").unwrap());
    re.replace_all(text, "").into_owned()
}

/// Remove C1 control characters and soft hyphens.
pub fn strip_stray_control_glyphs(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{0080}'..='\u{009F}' | '\u{00AD}'))
        .collect()
}

/// Remove Private Use Area codepoints (icon fonts).
pub fn strip_private_use(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}'
            )
        })
        .collect()
}

/// Remove the label of the code block copy button.
pub fn strip_copy_code_labels(text: &str) -> String {
    text.replace("Copy code", "")
}

/// Join a lone capital letter to the capital after it ("A B CD" -> "AB CD").
pub fn fold_fragmented_capitals(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\b([A-Z])[^\S\n]+([A-Z])\b").unwrap());
    re.replace_all(text, "$1$2").into_owned()
}

/// Collapse any run of non-newline whitespace to a single space.
pub fn collapse_horizontal_whitespace(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^\S\n]+").unwrap());
    re.replace_all(text, " ").into_owned()
}

/// Collapse three or more line breaks (blank lines may hold spaces) to two.
pub fn collapse_blank_lines(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n(?:[^\S\n]*\n){2,}").unwrap());
    re.replace_all(text, "\n\n").into_owned()
}

pub fn trim(text: &str) -> String {
    text.trim().to_string()
}
