use crate::model::{CodeBlock, Document, Message};

use super::{blocks, Block};

/// Render a whole conversation as Markdown.
pub fn render_document(doc: &Document) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", escape_markdown(&doc.title)));
    output.push_str(&format!(
        "- **Date:** {}\n- **Messages:** {} ({} user, {} assistant)\n- **Words:** {}\n\n---\n\n",
        doc.date.format("%Y-%m-%d %H:%M UTC"),
        doc.stats.total,
        doc.stats.user,
        doc.stats.assistant,
        doc.stats.word_count
    ));

    for message in &doc.messages {
        output.push_str(&render_message(message));
    }

    output.trim_end().to_string() + "\n"
}

pub fn render_message(message: &Message) -> String {
    let mut output = format!("### {}\n\n", message.role.label());

    for block in blocks(message) {
        match block {
            Block::Heading(text) => {
                output.push_str(&format!("#### {}\n\n", escape_markdown(&text)));
            }
            Block::Paragraph(lines) => {
                let lines: Vec<String> = lines.iter().map(|l| escape_line(l)).collect();
                output.push_str(&lines.join("\n"));
                output.push_str("\n\n");
            }
            Block::List(items) => {
                for item in items {
                    output.push_str(&format!("- {}\n", escape_markdown(&item)));
                }
                output.push('\n');
            }
            Block::Code(block) => {
                output.push_str(&fenced_code(block));
                output.push_str("\n\n");
            }
        }
    }

    for (i, image) in message.images.iter().enumerate() {
        output.push_str(&format!(
            "![Image {}]({})\n\n",
            i + 1,
            link_destination(&image.source)
        ));
    }

    output
}

/// A fenced code block whose fence is longer than any backtick run in the code.
pub fn fenced_code(block: &CodeBlock) -> String {
    let longest = block
        .code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    let code = block.code.trim_end_matches('\n');
    format!("{}{}\n{}\n{}", fence, block.language, code, fence)
}

/// A link destination that survives spaces and parentheses in the URL.
pub fn link_destination(url: &str) -> String {
    if !url.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>')) {
        return url.to_string();
    }
    let mut out = String::with_capacity(url.len() + 2);
    out.push('<');
    for c in url.chars() {
        match c {
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            _ => out.push(c),
        }
    }
    out.push('>');
    out
}

/// Escape Markdown special characters in text.
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '|' | '<' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

/// Escape a prose line, including line-start characters that would open a
/// heading or a quote.
fn escape_line(line: &str) -> String {
    let escaped = escape_markdown(line);
    if escaped.starts_with('#') || escaped.starts_with('>') {
        format!("\\{}", escaped)
    } else {
        escaped
    }
}
