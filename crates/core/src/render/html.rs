use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::layout::{ASSISTANT_BUBBLE, CODE_LABEL_COLOR, TEXT_COLOR, USER_BUBBLE};
use crate::model::{Document, ImageKind, ImageRef, Message, Role};

use super::{blocks, Block};

/// Render a whole conversation as a standalone HTML page.
pub fn render_document(doc: &Document) -> String {
    let title = encode_text(&doc.title);
    let mut body = String::new();
    for message in &doc.messages {
        body.push_str(&render_message(message));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
{style}
</style>
</head>
<body>
<header>
<h1>{title}</h1>
<p class="meta">{date} · {total} messages ({user} user, {assistant} assistant) · {words} words</p>
</header>
<main>
{body}</main>
</body>
</html>
"#,
        title = title,
        style = stylesheet(),
        date = doc.date.format("%Y-%m-%d %H:%M UTC"),
        total = doc.stats.total,
        user = doc.stats.user,
        assistant = doc.stats.assistant,
        words = doc.stats.word_count,
        body = body,
    )
}

fn stylesheet() -> String {
    format!(
        "body {{ font-family: Helvetica, Arial, sans-serif; color: {text}; max-width: 820px; margin: 2rem auto; padding: 0 1rem; }}\n\
         .meta {{ color: #666; font-size: 0.9rem; }}\n\
         .message {{ border-radius: 8px; padding: 10px 12px; margin: 14px 0; max-width: 75%; }}\n\
         .message.user {{ background: {user}; margin-left: auto; }}\n\
         .message.assistant {{ background: {assistant}; margin-right: auto; }}\n\
         .role {{ font-weight: bold; font-size: 0.8rem; text-transform: uppercase; color: #555; }}\n\
         pre {{ background: #fff; border: 1px solid #ddd; border-radius: 4px; padding: 8px; overflow-x: auto; }}\n\
         .lang {{ color: {label}; font-weight: bold; font-size: 0.8rem; }}\n\
         img {{ max-width: 100%; display: block; margin: 8px 0; }}",
        text = TEXT_COLOR.hex(),
        user = USER_BUBBLE.hex(),
        assistant = ASSISTANT_BUBBLE.hex(),
        label = CODE_LABEL_COLOR.hex(),
    )
}

pub fn render_message(message: &Message) -> String {
    let class = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let mut out = format!(
        "<section class=\"message {}\">\n<div class=\"role\">{}</div>\n",
        class,
        message.role.label()
    );

    for block in blocks(message) {
        match block {
            Block::Heading(text) => {
                out.push_str(&format!("<h3>{}</h3>\n", encode_text(&text)));
            }
            Block::Paragraph(lines) => {
                let lines: Vec<_> = lines.iter().map(|l| encode_text(l)).collect();
                out.push_str(&format!("<p>{}</p>\n", lines.join("<br>\n")));
            }
            Block::List(items) => {
                out.push_str("<ul>\n");
                for item in items {
                    out.push_str(&format!("<li>{}</li>\n", encode_text(&item)));
                }
                out.push_str("</ul>\n");
            }
            Block::Code(block) => {
                let language = encode_double_quoted_attribute(&block.language);
                out.push_str(&format!(
                    "<div class=\"lang\">{}</div>\n<pre><code class=\"language-{}\">{}</code></pre>\n",
                    encode_text(&block.language),
                    language,
                    encode_text(&block.code)
                ));
            }
        }
    }

    for image in &message.images {
        out.push_str(&image_tag(image));
        out.push('\n');
    }

    out.push_str("</section>\n");
    out
}

fn image_tag(image: &ImageRef) -> String {
    let mut tag = format!(
        "<img src=\"{}\" alt=\"Image\"",
        encode_double_quoted_attribute(&image.source)
    );
    if image.kind == ImageKind::Vector {
        if let Some(width) = image.width {
            tag.push_str(&format!(" width=\"{}\"", width.round()));
        }
        if let Some(height) = image.height {
            tag.push_str(&format!(" height=\"{}\"", height.round()));
        }
    }
    tag.push('>');
    tag
}
