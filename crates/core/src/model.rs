//! Structured conversation document.
//!
//! A [`Document`] is built once per export by the extractor, handed to exactly
//! one writer, and never mutated afterwards. Code blocks are factored out of
//! the message text: the text carries a placeholder token per block and the
//! block itself keeps the raw, untransformed code.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opening half of a code-block placeholder token.
pub const PLACEHOLDER_PREFIX: &str = "[[CODE_BLOCK:";
/// Closing half of a code-block placeholder token.
pub const PLACEHOLDER_SUFFIX: &str = "]]";
/// What a literal placeholder prefix in prose is rewritten to, so that only
/// the extractor's own tokens parse as placeholders.
pub const ESCAPED_PREFIX: &str = "[[CODE BLOCK:";
/// Language recorded when no language hint is found.
pub const DEFAULT_LANGUAGE: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Human-readable label used by the writers.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeBlockId(String);

impl CodeBlockId {
    pub fn new(index: usize) -> Self {
        CodeBlockId(format!("code-{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The token that stands in for this block inside [`Message::text`].
    pub fn placeholder(&self) -> String {
        format!("{}{}{}", PLACEHOLDER_PREFIX, self.0, PLACEHOLDER_SUFFIX)
    }
}

impl fmt::Display for CodeBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: CodeBlockId,
    pub language: String,
    /// Raw code. Never passed through the text normalizer.
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Raster,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub kind: ImageKind,
    /// A URI or an inline `data:` URI.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// A piece of message text: either prose or a placeholder id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Split text into prose and placeholder segments, in order.
///
/// Anything that looks like the start of a token but does not close, or whose
/// id contains whitespace, is left as prose.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    let mut prose_start = 0usize;
    let mut offset = 0usize;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        let id_start = start + PLACEHOLDER_PREFIX.len();
        let after = &rest[id_start..];
        let Some(end) = after.find(PLACEHOLDER_SUFFIX) else {
            break;
        };
        let id = &after[..end];

        if id.is_empty() || id.contains(|c: char| c.is_whitespace() || c == '[') {
            rest = after;
            offset += id_start;
            continue;
        }

        let token_start = offset + start;
        if token_start > prose_start {
            out.push(Segment::Text(&text[prose_start..token_start]));
        }
        out.push(Segment::Placeholder(id));

        let consumed = id_start + end + PLACEHOLDER_SUFFIX.len();
        rest = &rest[consumed..];
        offset += consumed;
        prose_start = offset;
    }

    if prose_start < text.len() {
        out.push(Segment::Text(&text[prose_start..]));
    }
    out
}

/// Rewrite every placeholder prefix in prose text so it stays prose.
pub fn escape_placeholders(text: &str) -> String {
    text.replace(PLACEHOLDER_PREFIX, ESCAPED_PREFIX)
}

impl Message {
    pub fn code_block(&self, id: &str) -> Option<&CodeBlock> {
        self.code_blocks.iter().find(|b| b.id.as_str() == id)
    }

    /// Placeholder ids in the order they appear in the text.
    pub fn placeholder_ids(&self) -> Vec<&str> {
        segments(&self.text)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(id) => Some(id),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Replace every placeholder with `render(block)`.
    ///
    /// Tokens that do not resolve to a block are kept verbatim.
    pub fn expand_code_blocks<F>(&self, mut render: F) -> String
    where
        F: FnMut(&CodeBlock) -> String,
    {
        let mut out = String::with_capacity(self.text.len());
        for segment in segments(&self.text) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Placeholder(id) => match self.code_block(id) {
                    Some(block) => out.push_str(&render(block)),
                    None => {
                        out.push_str(PLACEHOLDER_PREFIX);
                        out.push_str(id);
                        out.push_str(PLACEHOLDER_SUFFIX);
                    }
                },
            }
        }
        out
    }

    /// Verify that text and code blocks reference each other one-to-one.
    pub fn check_placeholders(&self) -> Result<(), PlaceholderError> {
        for (i, block) in self.code_blocks.iter().enumerate() {
            if self.code_blocks[..i].iter().any(|b| b.id == block.id) {
                return Err(PlaceholderError::DuplicateId(block.id.to_string()));
            }
        }

        let referenced = self.placeholder_ids();
        for (i, id) in referenced.iter().enumerate() {
            if self.code_block(id).is_none() {
                return Err(PlaceholderError::UnknownBlock(id.to_string()));
            }
            if referenced[..i].contains(id) {
                return Err(PlaceholderError::DuplicateReference(id.to_string()));
            }
        }

        if let Some(block) = self
            .code_blocks
            .iter()
            .find(|b| !referenced.contains(&b.id.as_str()))
        {
            return Err(PlaceholderError::Unreferenced(block.id.to_string()));
        }

        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub word_count: usize,
}

impl Stats {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut stats = Stats::default();
        for message in messages {
            stats.total += 1;
            match message.role {
                Role::User => stats.user += 1,
                Role::Assistant => stats.assistant += 1,
            }
            stats.word_count += message.word_count();
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub date: DateTime<Utc>,
    pub stats: Stats,
    pub messages: Vec<Message>,
}

impl Document {
    /// Build a document, deriving its stats from the messages.
    pub fn new(title: impl Into<String>, date: DateTime<Utc>, messages: Vec<Message>) -> Self {
        let stats = Stats::from_messages(&messages);
        Document {
            title: title.into(),
            date,
            stats,
            messages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn check_placeholders(&self) -> Result<(), InvalidMessage> {
        for (index, message) in self.messages.iter().enumerate() {
            message
                .check_placeholders()
                .map_err(|source| InvalidMessage { index, source })?;
        }
        Ok(())
    }

    /// A copy of this document whose image sources are rewritten by `rewrite`.
    ///
    /// `rewrite` returns `None` to keep a source unchanged.
    pub fn map_image_sources<F>(&self, mut rewrite: F) -> Document
    where
        F: FnMut(&ImageRef) -> Option<String>,
    {
        let messages = self
            .messages
            .iter()
            .map(|message| Message {
                images: message
                    .images
                    .iter()
                    .map(|image| ImageRef {
                        source: rewrite(image).unwrap_or_else(|| image.source.clone()),
                        ..image.clone()
                    })
                    .collect(),
                ..message.clone()
            })
            .collect();

        Document {
            messages,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("placeholder references unknown code block '{0}'")]
    UnknownBlock(String),
    #[error("code block '{0}' is referenced more than once")]
    DuplicateReference(String),
    #[error("code block '{0}' is never referenced")]
    Unreferenced(String),
    #[error("code block id '{0}' is used by more than one block")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message {index}: {source}")]
pub struct InvalidMessage {
    pub index: usize,
    #[source]
    pub source: PlaceholderError,
}
