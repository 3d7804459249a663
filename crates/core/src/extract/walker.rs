//! Classification of a content container's children into text segments.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Node, Selector};

use crate::model::{escape_placeholders, CodeBlock, CodeBlockId, DEFAULT_LANGUAGE};
use crate::normalize::fold_fragmented_capitals;

/// Prefix that marks a header line in message text.
pub const HEADING_MARKER: &str = "## ";
/// Prefix of a list item line in message text.
pub const BULLET_MARKER: &str = "• ";

const BLOCK_TAGS: &[&str] = &[
    "div",
    "section",
    "article",
    "main",
    "aside",
    "header",
    "footer",
    "nav",
    "blockquote",
    "figure",
    "figcaption",
    "details",
    "summary",
    "table",
    "thead",
    "tbody",
    "tr",
    "dl",
    "h5",
    "h6",
    "hr",
    "form",
    "fieldset",
    "address",
];

/// Descendants that make a generic block worth descending into.
const STRUCTURE_SELECTOR: &str = "pre, p, h1, h2, h3, h4, ul, ol";

#[derive(Debug, Default)]
pub struct Content {
    pub segments: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,
}

/// Walk a container's children in document order.
pub fn walk(container: ElementRef<'_>) -> Content {
    let mut content = Content::default();
    content.walk_children(container);
    content
}

impl Content {
    fn walk_children(&mut self, parent: ElementRef<'_>) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        self.push_prose(trimmed.to_string());
                    }
                }
                Node::Element(_) => {
                    if let Some(element) = ElementRef::wrap(child) {
                        self.visit(element);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        match name {
            "p" => self.push_block(element),
            "h1" | "h2" | "h3" | "h4" => self.push_heading(element),
            "ul" | "ol" => self.push_list(element),
            "pre" => self.push_code(element),
            _ if BLOCK_TAGS.contains(&name) => {
                if has_structure(element) {
                    self.walk_children(element);
                } else {
                    self.push_block(element);
                }
            }
            _ => {
                let text = text_of(element);
                if !text.trim().is_empty() {
                    self.push_prose(text);
                }
            }
        }
    }

    /// Every prose segment goes through here; only `push_code` adds tokens.
    fn push_prose(&mut self, text: String) {
        self.segments.push(escape_placeholders(&text));
    }

    fn push_block(&mut self, element: ElementRef<'_>) {
        let text = text_of(element);
        let text = text.trim();
        if !text.is_empty() {
            self.push_prose(format!("{}\n", text));
        }
    }

    fn push_heading(&mut self, element: ElementRef<'_>) {
        let text = fold_fragmented_capitals(text_of(element).trim());
        if !text.is_empty() {
            self.push_prose(format!("\n{}{}\n", HEADING_MARKER, text.to_uppercase()));
        }
    }

    fn push_list(&mut self, element: ElementRef<'_>) {
        let items = element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");
        for item in items {
            if contains_code(item) {
                let mut item_line = ItemLine::default();
                self.walk_item(item, &mut item_line);
                self.flush_item_line(&mut item_line);
            } else {
                let text = text_of(item);
                let text = text.trim();
                if !text.is_empty() {
                    self.push_prose(format!("{}{}", BULLET_MARKER, text));
                }
            }
        }
        self.segments.push(String::new());
    }

    /// Split a list item around its code blocks. Prose before the first
    /// block is the bullet line; prose after a block is a plain line.
    fn walk_item(&mut self, parent: ElementRef<'_>, line: &mut ItemLine) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => line.push(text),
                Node::Element(_) => {
                    let Some(element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if element.value().name() == "pre" {
                        self.flush_item_line(line);
                        self.push_code(element);
                    } else if contains_code(element) {
                        self.walk_item(element, line);
                    } else {
                        line.push(&text_of(element));
                    }
                }
                _ => {}
            }
        }
    }

    fn flush_item_line(&mut self, line: &mut ItemLine) {
        let text = line.text.trim().to_string();
        line.text.clear();
        if text.is_empty() {
            return;
        }
        if line.bulleted {
            self.push_prose(text);
        } else {
            line.bulleted = true;
            self.push_prose(format!("{}{}", BULLET_MARKER, text));
        }
    }

    fn push_code(&mut self, pre: ElementRef<'_>) {
        let code_element = Selector::parse("code")
            .ok()
            .and_then(|selector| pre.select(&selector).next());

        let code = match code_element {
            Some(code_element) => text_of(code_element),
            None => text_of(pre),
        };
        let language = code_element
            .and_then(language_hint)
            .or_else(|| language_hint(pre))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let id = CodeBlockId::new(self.code_blocks.len());
        self.segments.push(id.placeholder());
        self.code_blocks.push(CodeBlock { id, language, code });
    }
}

/// Prose of a list item collected between code blocks.
#[derive(Debug, Default)]
struct ItemLine {
    text: String,
    /// The item's bullet line has been pushed already.
    bulleted: bool,
}

impl ItemLine {
    fn push(&mut self, part: &str) {
        let part = part.trim();
        if part.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(part);
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn has_structure(element: ElementRef<'_>) -> bool {
    Selector::parse(STRUCTURE_SELECTOR)
        .map(|selector| element.select(&selector).next().is_some())
        .unwrap_or(false)
}

fn contains_code(element: ElementRef<'_>) -> bool {
    Selector::parse("pre")
        .map(|selector| element.select(&selector).next().is_some())
        .unwrap_or(false)
}

/// Language from a `language-xxx` (or `lang-xxx`) class.
pub fn language_hint(element: ElementRef<'_>) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)(?:language|lang)-([A-Za-z0-9_+#.\-]+)").unwrap()
    });

    let class = element.value().attr("class")?;
    re.captures(class)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn walk_fragment(html: &str) -> Content {
        let fragment = Html::parse_fragment(&format!(r#"<div id="root">{}</div>"#, html));
        let selector = Selector::parse("#root").unwrap();
        let root = fragment.select(&selector).next().unwrap();
        walk(root)
    }

    #[test]
    fn test_text_node_is_trimmed() {
        let content = walk_fragment("   plain text   ");
        assert_eq!(content.segments, vec!["plain text"]);
    }

    #[test]
    fn test_paragraph_gets_trailing_break() {
        let content = walk_fragment("<p> Hello <b>world</b> </p>");
        assert_eq!(content.segments, vec!["Hello world\n"]);
    }

    #[test]
    fn test_heading_is_folded_and_uppercased() {
        let content = walk_fragment("<h3>A B cd</h3>");
        assert_eq!(content.segments, vec!["\n## AB CD\n"]);
    }

    #[test]
    fn test_list_items_become_bullets() {
        let content = walk_fragment("<ul><li>one</li><li> </li><li>two</li></ul><ol><li>three</li></ol>");
        assert_eq!(
            content.segments,
            vec!["• one", "• two", "", "• three", ""]
        );
    }

    #[test]
    fn test_code_block_is_factored_out() {
        let content = walk_fragment(
            "<p>Try:</p><pre><code class=\"language-Rust\">fn main() {\n    println!(\"hi\");\n}\n</code></pre>",
        );
        assert_eq!(content.segments, vec!["Try:\n", "[[CODE_BLOCK:code-0]]"]);
        assert_eq!(content.code_blocks.len(), 1);
        assert_eq!(content.code_blocks[0].language, "rust");
        assert_eq!(
            content.code_blocks[0].code,
            "fn main() {\n    println!(\"hi\");\n}\n"
        );
    }

    #[test]
    fn test_code_without_code_element_or_language() {
        let content = walk_fragment("<pre>ls -la</pre>");
        assert_eq!(content.code_blocks[0].code, "ls -la");
        assert_eq!(content.code_blocks[0].language, "code");
    }

    #[test]
    fn test_language_on_pre() {
        let content = walk_fragment("<pre class=\"lang-go\"><code>x := 1</code></pre>");
        assert_eq!(content.code_blocks[0].language, "go");
    }

    #[test]
    fn test_code_ids_are_unique() {
        let content = walk_fragment("<pre><code>a</code></pre><pre><code>b</code></pre>");
        let ids: Vec<_> = content.code_blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["code-0", "code-1"]);
    }

    #[test]
    fn test_wrapper_with_code_is_descended() {
        let content = walk_fragment(
            "<div class=\"wrapper\"><p>Intro</p><div><pre><code class=\"language-sh\">echo hi</code></pre></div></div>",
        );
        assert_eq!(content.segments, vec!["Intro\n", "[[CODE_BLOCK:code-0]]"]);
        assert_eq!(content.code_blocks[0].language, "sh");
    }

    #[test]
    fn test_code_inside_list_item_is_factored_out() {
        let content = walk_fragment(
            "<ol><li><p>Run:</p><pre><code class=\"language-python\">def f():\n    return   1</code></pre><p>Then check.</p></li><li>Done</li></ol>",
        );
        assert_eq!(
            content.segments,
            vec!["• Run:", "[[CODE_BLOCK:code-0]]", "Then check.", "• Done", ""]
        );
        assert_eq!(content.code_blocks.len(), 1);
        assert_eq!(content.code_blocks[0].language, "python");
        assert_eq!(content.code_blocks[0].code, "def f():\n    return   1");
    }

    #[test]
    fn test_list_item_starting_with_code() {
        let content = walk_fragment("<ul><li><div><pre><code>ls</code></pre></div> lists files</li></ul>");
        assert_eq!(
            content.segments,
            vec!["[[CODE_BLOCK:code-0]]", "• lists files", ""]
        );
    }

    #[test]
    fn test_literal_placeholder_in_prose_is_escaped() {
        let content = walk_fragment(
            "<p>The token is [[CODE_BLOCK:code-0]] literally</p><pre><code>echo hi</code></pre>",
        );
        assert_eq!(
            content.segments,
            vec!["The token is [[CODE BLOCK:code-0]] literally\n", "[[CODE_BLOCK:code-0]]"]
        );
    }

    #[test]
    fn test_plain_block_is_flattened() {
        let content = walk_fragment("<blockquote>Quoted <i>text</i></blockquote>");
        assert_eq!(content.segments, vec!["Quoted text\n"]);
    }

    #[test]
    fn test_inline_element_is_verbatim() {
        let content = walk_fragment("<span> spaced </span>");
        assert_eq!(content.segments, vec![" spaced "]);
    }
}
