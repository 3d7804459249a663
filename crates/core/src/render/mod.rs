//! Text writers over a [`Document`](crate::model::Document).
//!
//! Both writers read message text through [`blocks`], which turns the flat
//! marker-prefixed text produced by the extractor back into headings, lists,
//! paragraphs and code blocks.

pub mod html;
pub mod markdown;

use crate::extract::{BULLET_MARKER, HEADING_MARKER};
use crate::model::{segments, CodeBlock, Message, Segment, PLACEHOLDER_PREFIX, PLACEHOLDER_SUFFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    Heading(String),
    /// Consecutive prose lines.
    Paragraph(Vec<String>),
    List(Vec<String>),
    Code(&'a CodeBlock),
}

/// Structure of a message's text, in order.
///
/// Placeholders that do not resolve to a block stay in the prose as written.
pub fn blocks(message: &Message) -> Vec<Block<'_>> {
    let mut builder = BlockBuilder::default();
    for segment in segments(&message.text) {
        match segment {
            Segment::Text(text) => {
                for line in text.split('\n') {
                    builder.line(line);
                }
            }
            Segment::Placeholder(id) => match message.code_block(id) {
                Some(block) => builder.push(Block::Code(block)),
                None => builder.line(&format!("{}{}{}", PLACEHOLDER_PREFIX, id, PLACEHOLDER_SUFFIX)),
            },
        }
    }
    builder.finish()
}

#[derive(Default)]
struct BlockBuilder<'a> {
    blocks: Vec<Block<'a>>,
    paragraph: Vec<String>,
    list: Vec<String>,
}

impl<'a> BlockBuilder<'a> {
    fn line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.flush();
        } else if let Some(heading) = trimmed.strip_prefix(HEADING_MARKER) {
            self.push(Block::Heading(heading.trim().to_string()));
        } else if let Some(item) = trimmed.strip_prefix(BULLET_MARKER) {
            self.flush_paragraph();
            self.list.push(item.trim().to_string());
        } else {
            self.flush_list();
            self.paragraph.push(trimmed.to_string());
        }
    }

    fn push(&mut self, block: Block<'a>) {
        self.flush();
        self.blocks.push(block);
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.blocks
                .push(Block::Paragraph(std::mem::take(&mut self.paragraph)));
        }
    }

    fn flush_list(&mut self) {
        if !self.list.is_empty() {
            self.blocks.push(Block::List(std::mem::take(&mut self.list)));
        }
    }

    fn finish(mut self) -> Vec<Block<'a>> {
        self.flush();
        self.blocks
    }
}
