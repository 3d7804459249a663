//! Document extractor: chat page markup -> [`Document`].
//!
//! Each conversation turn is located through an ordered list of candidate
//! selectors, its content container is copied into a detached fragment (the
//! page tree is never touched), noise is stripped from the copy, and the copy's
//! children are classified into text segments and code blocks.
//!
//! Nothing in here fails: a missing container or an empty turn is recorded in
//! the turn's [`TurnReport`] and extraction moves on to the next turn.

mod images;
mod walker;

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::model::{Document, Message, Role};
use crate::normalize::normalize;

pub use images::{collect_images, MIN_VECTOR_WIDTH};
pub use walker::{BULLET_MARKER, HEADING_MARKER};

/// Candidate selectors for conversation turns, tried in order.
pub const TURN_SELECTORS: &[&str] = &[
    r#"article[data-testid^="conversation-turn"]"#,
    r#"[data-testid^="conversation-turn"]"#,
    "[data-message-author-role]",
];

/// Candidate selectors for the content container inside a turn, tried in order.
pub const CONTAINER_SELECTORS: &[&str] = &[
    ".markdown",
    ".prose",
    ".whitespace-pre-wrap",
    "[data-message-content]",
];

/// Nodes removed from the container copy before it is walked.
pub const NOISE_SELECTORS: &[&str] = &[
    "button",
    r#"[role="button"]"#,
    r#"[role="toolbar"]"#,
    r#"[role="group"]"#,
    ".sr-only",
    ".visually-hidden",
];

pub const ROLE_ATTRIBUTE: &str = "data-message-author-role";

const DEFAULT_TITLE: &str = "Conversation";

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Overrides the page `<title>`.
    pub title: Option<String>,
    pub date: DateTime<Utc>,
}

impl ExtractOptions {
    pub fn new(date: DateTime<Utc>) -> Self {
        ExtractOptions { title: None, date }
    }
}

/// Why a turn contributed no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No content container matched.
    MissingContent,
    /// The normalized text was empty (images alone do not make a message).
    EmptyText,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingContent => write!(f, "no content container"),
            SkipReason::EmptyText => write!(f, "empty text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReport {
    pub index: usize,
    pub role: Role,
    pub container: Option<&'static str>,
    pub code_blocks: usize,
    pub images: usize,
    pub words: usize,
    pub skipped: Option<SkipReason>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub document: Document,
    /// The turn selector that matched, if any did.
    pub turn_selector: Option<&'static str>,
    pub turns: Vec<TurnReport>,
}

/// Parse a page and extract its conversation.
pub fn extract_html(source: &str, options: &ExtractOptions) -> Extraction {
    let page = Html::parse_document(source);
    extract(&page, options)
}

pub fn extract(page: &Html, options: &ExtractOptions) -> Extraction {
    let (turn_selector, turns) = find_turns(page);
    log::debug!(
        "found {} turns with selector {:?}",
        turns.len(),
        turn_selector
    );

    let title = options
        .title
        .clone()
        .or_else(|| page_title(page))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let (document, reports) = extract_turns(turns, title, options.date);
    Extraction {
        document,
        turn_selector,
        turns: reports,
    }
}

/// Build a document from already-located turn nodes.
pub fn extract_turns<'a, I>(
    turns: I,
    title: String,
    date: DateTime<Utc>,
) -> (Document, Vec<TurnReport>)
where
    I: IntoIterator<Item = ElementRef<'a>>,
{
    let mut messages = Vec::new();
    let mut reports = Vec::new();

    for (index, turn) in turns.into_iter().enumerate() {
        let (outcome, report) = extract_turn(index, turn);
        if let Some(reason) = report.skipped {
            log::warn!("skipping turn {}: {}", index, reason);
        }
        if let Some(message) = outcome {
            messages.push(message);
        }
        reports.push(report);
    }

    (Document::new(title, date, messages), reports)
}

/// Extract one turn, returning the message (if any) and its report.
pub fn extract_turn(index: usize, turn: ElementRef<'_>) -> (Option<Message>, TurnReport) {
    let role = detect_role(turn);
    let mut report = TurnReport {
        index,
        role,
        container: None,
        code_blocks: 0,
        images: 0,
        words: 0,
        skipped: None,
    };

    let Some((selector, container)) = find_container(turn) else {
        report.skipped = Some(SkipReason::MissingContent);
        return (None, report);
    };
    report.container = Some(selector);

    let fragment = detached_copy(container);
    let copy = fragment_root(&fragment);
    let content = walker::walk(copy);

    let text = normalize(&content.segments.join("\n"));
    let images = collect_images(turn);
    report.code_blocks = content.code_blocks.len();
    report.images = images.len();

    if text.is_empty() {
        report.skipped = Some(SkipReason::EmptyText);
        return (None, report);
    }

    let message = Message {
        role,
        text,
        code_blocks: content.code_blocks,
        images,
    };
    report.words = message.word_count();
    (Some(message), report)
}

/// Locate turn nodes with the first candidate selector that matches anything.
pub fn find_turns(page: &Html) -> (Option<&'static str>, Vec<ElementRef<'_>>) {
    for &css in TURN_SELECTORS {
        let Some(selector) = parse_selector(css) else {
            continue;
        };
        let turns: Vec<_> = page.select(&selector).collect();
        if !turns.is_empty() {
            return (Some(css), turns);
        }
    }
    (None, Vec::new())
}

/// A turn is the user's if it, or any descendant, carries the user role.
pub fn detect_role(turn: ElementRef<'_>) -> Role {
    if turn.value().attr(ROLE_ATTRIBUTE) == Some("user") {
        return Role::User;
    }
    let is_user = parse_selector(r#"[data-message-author-role="user"]"#)
        .is_some_and(|selector| turn.select(&selector).next().is_some());
    if is_user {
        Role::User
    } else {
        Role::Assistant
    }
}

pub fn find_container(turn: ElementRef<'_>) -> Option<(&'static str, ElementRef<'_>)> {
    CONTAINER_SELECTORS.iter().find_map(|css| {
        let selector = parse_selector(css)?;
        turn.select(&selector).next().map(|el| (*css, el))
    })
}

/// Copy a container into its own tree and strip noise from the copy.
fn detached_copy(container: ElementRef<'_>) -> Html {
    let mut fragment = Html::parse_fragment(&container.html());

    let noise: Vec<_> = NOISE_SELECTORS
        .iter()
        .filter_map(|css| parse_selector(css))
        .flat_map(|selector| {
            fragment
                .select(&selector)
                .map(|el| el.id())
                .collect::<Vec<_>>()
        })
        .collect();

    for id in noise {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }
    fragment
}

/// The copied container inside a fragment (the fragment wraps it in `<html>`).
fn fragment_root(fragment: &Html) -> ElementRef<'_> {
    let root = fragment.root_element();
    root.children().find_map(ElementRef::wrap).unwrap_or(root)
}

/// Page title without the assistant's site suffix.
pub fn page_title(page: &Html) -> Option<String> {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let suffix = SUFFIX.get_or_init(|| {
        Regex::new(r"\s+[-|–—]\s+(?:ChatGPT|Claude|Gemini|Copilot)\s*$").unwrap()
    });

    let selector = parse_selector("title")?;
    let raw: String = page.select(&selector).next()?.text().collect();
    let title = suffix.replace(raw.trim(), "").trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            log::warn!("ignoring invalid selector '{}': {:?}", css, e);
            None
        }
    }
}
