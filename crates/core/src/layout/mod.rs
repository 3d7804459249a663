//! Layout & pagination engine: [`Document`] -> positioned drawing instructions.
//!
//! A single forward pass over the messages. Each message is expanded (code
//! blocks between begin/end markers), classified into lines, word-wrapped with
//! the backend's font metrics and stacked into a bubble. The vertical cursor
//! carries over between messages and only resets on a new page.
//!
//! Coordinates use a top-left origin in points; `Text.y` is the baseline.
//! Writers with a bottom-left origin (PDF) flip them.

mod config;
mod lines;

use serde::Serialize;
use thiserror::Error;

use crate::model::{Document, ImageKind, ImageRef, Message, Role};

pub use config::{
    ConfigError, LayoutConfig, LayoutError, Rgb, ASSISTANT_BUBBLE, CODE_LABEL_COLOR, TEXT_COLOR,
    TITLE_COLOR, USER_BUBBLE,
};
pub use lines::{
    classify, expand_for_layout, wrap, Line, LineKind, BEGIN_CODE_PREFIX, END_CODE_MARKER,
};

/// Text drawn in place of an image that could not be placed.
pub const IMAGE_FALLBACK_TEXT: &str = "[Image Attachment]";

/// Width of one character relative to the font size, for [`ApproxMetrics`].
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Cap height relative to the font size, used to centre text in its row.
const CAP_HEIGHT_RATIO: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Font {
    Helvetica,
    HelveticaBold,
}

impl Font {
    /// The PostScript name of the standard font.
    pub fn base_name(&self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextStyle {
    pub font: Font,
    pub size: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImagePlacementError {
    #[error("unsupported image encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("image data could not be decoded: {0}")]
    Undecodable(String),
    #[error("image source was never fetched: {0}")]
    NotEmbedded(String),
}

/// What the layout needs from the drawing backend.
///
/// Widths must match what the backend actually draws or wrapped lines will
/// overflow their bubbles.
pub trait LayoutBackend {
    fn text_width(&self, text: &str, font: Font, size: f32) -> f32;

    /// Whether `image` can be drawn. The default accepts everything.
    fn check_image(&self, _image: &ImageRef) -> Result<(), ImagePlacementError> {
        Ok(())
    }
}

/// Fixed-ratio metrics for writers without real font data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMetrics;

impl LayoutBackend for ApproxMetrics {
    fn text_width(&self, text: &str, _font: Font, size: f32) -> f32 {
        text.chars().count() as f32 * size * APPROX_CHAR_WIDTH_RATIO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DrawOp {
    NewPage,
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        fill: Rgb,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        style: TextStyle,
        line: LineKind,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        source: String,
        vector: bool,
    },
}

/// The instruction stream for a whole document. The first page is implicit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    pub ops: Vec<DrawOp>,
}

impl Layout {
    pub fn page_count(&self) -> usize {
        1 + self
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::NewPage))
            .count()
    }

    /// The instructions of each page, in order.
    pub fn pages(&self) -> Vec<&[DrawOp]> {
        self.ops
            .split(|op| matches!(op, DrawOp::NewPage))
            .collect()
    }
}

/// One horizontal slice of a bubble.
enum Row<'a> {
    Text {
        line: Line,
        style: TextStyle,
        height: f32,
    },
    Image(&'a ImageRef),
}

impl Row<'_> {
    fn height(&self, config: &LayoutConfig) -> f32 {
        match self {
            Row::Text { height, .. } => *height,
            Row::Image(_) => config.image_slot_height(),
        }
    }
}

pub fn style_for(kind: LineKind, config: &LayoutConfig) -> TextStyle {
    match kind {
        LineKind::Header => TextStyle {
            font: Font::HelveticaBold,
            size: config.font_size_header,
            color: TEXT_COLOR,
        },
        LineKind::CodeLabel => TextStyle {
            font: Font::HelveticaBold,
            size: config.font_size_body,
            color: CODE_LABEL_COLOR,
        },
        LineKind::Bullet | LineKind::Body => TextStyle {
            font: Font::Helvetica,
            size: config.font_size_body,
            color: TEXT_COLOR,
        },
    }
}

/// Lay out every message of `doc`.
///
/// Only an invalid `config` is an error. Images the backend rejects become a
/// [`IMAGE_FALLBACK_TEXT`] line and the pass continues.
pub fn layout_document(
    doc: &Document,
    config: &LayoutConfig,
    backend: &dyn LayoutBackend,
) -> Result<Layout, LayoutError> {
    config.validate()?;

    let mut pager = Pager::new(config, backend);
    if config.title_block {
        pager.title_block(doc);
    }
    for (index, message) in doc.messages.iter().enumerate() {
        let rows = message_rows(message, config, backend);
        if rows.is_empty() {
            log::debug!("message {} has nothing to draw", index);
            continue;
        }
        pager.place_message(message.role, &rows);
    }

    log::debug!(
        "laid out {} messages on {} pages",
        doc.messages.len(),
        pager.page
    );
    Ok(Layout { ops: pager.ops })
}

/// Height of a message's bubble if it were drawn in one piece.
pub fn bubble_height(
    message: &Message,
    config: &LayoutConfig,
    backend: &dyn LayoutBackend,
) -> f32 {
    let rows = message_rows(message, config, backend);
    rows_height(&rows, config) + 2.0 * config.padding_y
}

fn message_rows<'a>(
    message: &'a Message,
    config: &LayoutConfig,
    backend: &dyn LayoutBackend,
) -> Vec<Row<'a>> {
    let mut rows = Vec::new();

    for line in classify(&expand_for_layout(message)) {
        let style = style_for(line.kind, config);
        let height = match line.kind {
            LineKind::Header => config.header_line_height(),
            _ => config.line_height,
        };
        for text in wrap(
            &line.text,
            config.content_width(),
            style.font,
            style.size,
            backend,
        ) {
            rows.push(Row::Text {
                line: Line {
                    text,
                    kind: line.kind,
                },
                style,
                height,
            });
        }
    }

    rows.extend(message.images.iter().map(Row::Image));
    rows
}

fn rows_height(rows: &[Row<'_>], config: &LayoutConfig) -> f32 {
    rows.iter().map(|row| row.height(config)).sum()
}

/// Baseline offset that centres text of `size` vertically in a row.
fn baseline_offset(line_height: f32, size: f32) -> f32 {
    (line_height + size * CAP_HEIGHT_RATIO) / 2.0
}

struct Pager<'a> {
    config: &'a LayoutConfig,
    backend: &'a dyn LayoutBackend,
    ops: Vec<DrawOp>,
    page: usize,
    cursor: f32,
}

impl<'a> Pager<'a> {
    fn new(config: &'a LayoutConfig, backend: &'a dyn LayoutBackend) -> Self {
        Pager {
            config,
            backend,
            ops: Vec::new(),
            page: 1,
            cursor: config.margin,
        }
    }

    fn at_top(&self) -> bool {
        self.cursor <= self.config.margin
    }

    fn remaining(&self) -> f32 {
        self.config.drawable_bottom() - self.cursor
    }

    fn new_page(&mut self) {
        self.ops.push(DrawOp::NewPage);
        self.page += 1;
        self.cursor = self.config.margin;
        log::debug!("page break, now on page {}", self.page);
    }

    fn title_block(&mut self, doc: &Document) {
        let config = self.config;
        let style = TextStyle {
            font: Font::HelveticaBold,
            size: config.font_size_header,
            color: TITLE_COLOR,
        };
        let width = config.page_width - 2.0 * config.margin;

        for text in wrap(&doc.title, width, style.font, style.size, self.backend) {
            if config.header_line_height() > self.remaining() {
                break;
            }
            let y = self.cursor
                + config.header_extra_spacing
                + baseline_offset(config.line_height, style.size);
            self.ops.push(DrawOp::Text {
                x: config.margin,
                y,
                text,
                style,
                line: LineKind::Header,
            });
            self.cursor += config.header_line_height();
        }

        let meta = format!(
            "{} · {} messages · {} words",
            doc.date.format("%Y-%m-%d %H:%M UTC"),
            doc.stats.total,
            doc.stats.word_count
        );
        let style = TextStyle {
            color: TITLE_COLOR,
            ..style_for(LineKind::Body, config)
        };
        self.ops.push(DrawOp::Text {
            x: config.margin,
            y: self.cursor + baseline_offset(config.line_height, style.size),
            text: meta,
            style,
            line: LineKind::Body,
        });
        self.cursor += config.line_height + config.message_spacing;
    }

    fn place_message(&mut self, role: Role, rows: &[Row<'_>]) {
        let config = self.config;
        let padding = 2.0 * config.padding_y;

        if rows_height(rows, config) + padding > self.remaining() && !self.at_top() {
            self.new_page();
        }

        let x = match role {
            Role::Assistant => config.margin,
            Role::User => config.page_width - config.margin - config.bubble_width,
        };

        let mut rest = rows;
        loop {
            let available = self.remaining() - padding;
            let mut used = 0.0;
            let mut take = rows_that_fit(rest, available, config, &mut used);
            if take == 0 && self.at_top() {
                // Validation guarantees a single row fits an empty page.
                take = 1;
            }
            if take == 0 {
                self.new_page();
                continue;
            }

            let (segment, tail) = rest.split_at(take);
            self.draw_segment(role, x, segment);
            rest = tail;
            if rest.is_empty() {
                break;
            }
            self.new_page();
        }

        self.cursor += config.message_spacing;
    }

    fn draw_segment(&mut self, role: Role, x: f32, rows: &[Row<'_>]) {
        let config = self.config;
        let height = rows_height(rows, config) + 2.0 * config.padding_y;
        let fill = match role {
            Role::User => USER_BUBBLE,
            Role::Assistant => ASSISTANT_BUBBLE,
        };
        self.ops.push(DrawOp::Rect {
            x,
            y: self.cursor,
            width: config.bubble_width,
            height,
            radius: config.corner_radius,
            fill,
        });

        let text_x = x + config.padding_x;
        let mut y = self.cursor + config.padding_y;
        for row in rows {
            match row {
                Row::Text {
                    line,
                    style,
                    height,
                } => {
                    let lead = height - config.line_height;
                    self.ops.push(DrawOp::Text {
                        x: text_x,
                        y: y + lead + baseline_offset(config.line_height, style.size),
                        text: line.text.clone(),
                        style: *style,
                        line: line.kind,
                    });
                }
                Row::Image(image) => {
                    let op = match self.backend.check_image(image) {
                        Ok(()) => DrawOp::Image {
                            x: text_x,
                            y,
                            width: config.image_width,
                            height: config.image_height,
                            source: image.source.clone(),
                            vector: image.kind == ImageKind::Vector,
                        },
                        Err(e) => {
                            log::warn!("image replaced by placeholder text: {}", e);
                            let style = style_for(LineKind::Body, config);
                            DrawOp::Text {
                                x: text_x,
                                y: y + baseline_offset(config.line_height, style.size),
                                text: IMAGE_FALLBACK_TEXT.to_string(),
                                style,
                                line: LineKind::Body,
                            }
                        }
                    };
                    self.ops.push(op);
                }
            }
            y += row.height(config);
        }

        self.cursor += height;
    }
}

/// Number of leading rows whose cumulative height fits in `available`.
fn rows_that_fit(rows: &[Row<'_>], available: f32, config: &LayoutConfig, used: &mut f32) -> usize {
    let mut count = 0;
    for row in rows {
        let next = *used + row.height(config);
        if next > available {
            break;
        }
        *used = next;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CodeBlock, CodeBlockId};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    const EPS: f32 = 0.01;

    fn config() -> LayoutConfig {
        LayoutConfig {
            title_block: false,
            ..LayoutConfig::default()
        }
    }

    fn message(role: Role, text: &str) -> Message {
        Message {
            role,
            text: text.to_string(),
            code_blocks: vec![],
            images: vec![],
        }
    }

    fn lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn doc(messages: Vec<Message>) -> Document {
        Document::new(
            "Chat",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            messages,
        )
    }

    fn image(source: &str) -> ImageRef {
        ImageRef {
            kind: ImageKind::Raster,
            source: source.to_string(),
            width: None,
            height: None,
        }
    }

    fn rects(layout: &Layout) -> Vec<(f32, f32, f32, f32)> {
        layout
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect {
                    x,
                    y,
                    width,
                    height,
                    ..
                } => Some((*x, *y, *width, *height)),
                _ => None,
            })
            .collect()
    }

    fn texts(layout: &Layout) -> Vec<&str> {
        layout
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    struct RejectImages;

    impl LayoutBackend for RejectImages {
        fn text_width(&self, text: &str, font: Font, size: f32) -> f32 {
            ApproxMetrics.text_width(text, font, size)
        }

        fn check_image(&self, image: &ImageRef) -> Result<(), ImagePlacementError> {
            Err(ImagePlacementError::UnsupportedEncoding(image.source.clone()))
        }
    }

    fn assert_within_pages(layout: &Layout, config: &LayoutConfig) {
        for page in layout.pages() {
            for op in page {
                if let DrawOp::Rect { y, height, .. } = op {
                    assert!(*y >= config.margin - EPS);
                    assert!(y + height <= config.drawable_bottom() + EPS);
                }
            }
        }
    }

    #[test]
    fn test_single_message_bubble() {
        let config = config();
        let layout =
            layout_document(&doc(vec![message(Role::Assistant, "Hi")]), &config, &ApproxMetrics)
                .unwrap();
        assert_eq!(layout.page_count(), 1);
        assert_eq!(rects(&layout), vec![(40.0, 40.0, 420.0, 34.0)]);
        match &layout.ops[1] {
            DrawOp::Text { x, y, text, line, .. } => {
                assert_eq!(text, "Hi");
                assert_eq!(*line, LineKind::Body);
                assert_eq!(*x, 52.0);
                assert!((y - (50.0 + baseline_offset(14.0, 10.0))).abs() < EPS);
            }
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_user_bubble_is_right_aligned() {
        let config = config();
        let layout =
            layout_document(&doc(vec![message(Role::User, "Hi")]), &config, &ApproxMetrics)
                .unwrap();
        let (x, _, width, _) = rects(&layout)[0];
        assert!((x + width - (config.page_width - config.margin)).abs() < EPS);
        assert!(matches!(layout.ops[0], DrawOp::Rect { fill, .. } if fill == USER_BUBBLE));
    }

    #[test]
    fn test_header_spacing_is_part_of_bubble() {
        let config = config();
        let m = message(Role::Assistant, "## Plan\n\nbody");
        assert_eq!(bubble_height(&m, &config, &ApproxMetrics), 14.0 + 4.0 + 14.0 + 20.0);
    }

    #[test]
    fn test_bubble_height_formula() {
        let config = config();
        let mut m = message(Role::Assistant, &lines(3));
        m.images.push(image("data:image/png;base64,AAAA"));
        assert_eq!(
            bubble_height(&m, &config, &ApproxMetrics),
            3.0 * 14.0 + 158.0 + 20.0
        );
    }

    #[test]
    fn test_code_block_lines() {
        let config = config();
        let m = Message {
            role: Role::Assistant,
            text: "See:\n[[CODE_BLOCK:code-0]]".to_string(),
            code_blocks: vec![CodeBlock {
                id: CodeBlockId::new(0),
                language: "rust".to_string(),
                code: "fn main() {\n    # not a header\n}".to_string(),
            }],
            images: vec![],
        };
        let layout = layout_document(&doc(vec![m]), &config, &ApproxMetrics).unwrap();
        assert_eq!(
            texts(&layout),
            vec!["See:", "rust", "fn main() {", "    # not a header", "}"]
        );
        let label = layout
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Text { line: LineKind::CodeLabel, style, .. } => Some(*style),
                _ => None,
            })
            .unwrap();
        assert_eq!(label.color, CODE_LABEL_COLOR);
    }

    #[test]
    fn test_page_break_before_message_that_does_not_fit() {
        let config = config();
        // 40 lines: 580pt bubble, cursor ends at 634. 20 lines need 300pt but
        // only ~168pt remain.
        let layout = layout_document(
            &doc(vec![
                message(Role::Assistant, &lines(40)),
                message(Role::User, &lines(20)),
            ]),
            &config,
            &ApproxMetrics,
        )
        .unwrap();

        assert_eq!(layout.page_count(), 2);
        let break_at = layout
            .ops
            .iter()
            .position(|op| matches!(op, DrawOp::NewPage))
            .unwrap();
        match &layout.ops[break_at + 1] {
            DrawOp::Rect { y, height, .. } => {
                assert_eq!(*y, config.margin);
                assert_eq!(*height, 20.0 * 14.0 + 20.0);
            }
            other => panic!("expected the second bubble, got {:?}", other),
        }
        assert_within_pages(&layout, &config);
    }

    #[test]
    fn test_message_taller_than_a_page_is_split() {
        let config = config();
        let layout = layout_document(
            &doc(vec![message(Role::Assistant, &lines(150))]),
            &config,
            &ApproxMetrics,
        )
        .unwrap();

        assert!(layout.page_count() >= 3);
        assert_eq!(texts(&layout).len(), 150);
        assert_eq!(rects(&layout).len(), layout.page_count());
        assert_within_pages(&layout, &config);
    }

    #[test]
    fn test_images_are_placed() {
        let config = config();
        let mut m = message(Role::User, "Look");
        m.images.push(image("data:image/png;base64,AAAA"));
        let layout = layout_document(&doc(vec![m]), &config, &ApproxMetrics).unwrap();
        let placed = layout
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Image { .. }))
            .count();
        assert_eq!(placed, 1);
    }

    #[test]
    fn test_rejected_image_falls_back_to_text() {
        let config = config();
        let mut first = message(Role::User, "Look");
        first.images.push(image("https://example.com/a.png"));
        let second = message(Role::Assistant, "Nice");

        let layout = layout_document(&doc(vec![first, second]), &config, &RejectImages).unwrap();
        assert_eq!(texts(&layout), vec!["Look", IMAGE_FALLBACK_TEXT, "Nice"]);
        assert!(!layout.ops.iter().any(|op| matches!(op, DrawOp::Image { .. })));
    }

    #[test]
    fn test_image_that_does_not_fit_moves_to_next_page() {
        let config = config();
        // 50 lines take 700pt, which leaves less than one image slot on page 1.
        let mut m = message(Role::Assistant, &lines(50));
        m.images.push(image("data:image/png;base64,AAAA"));
        let layout = layout_document(&doc(vec![m]), &config, &ApproxMetrics).unwrap();

        assert_eq!(layout.page_count(), 2);
        let pages = layout.pages();
        assert!(pages[1].iter().any(|op| matches!(op, DrawOp::Image { .. })));
        assert_within_pages(&layout, &config);
    }

    #[test]
    fn test_title_block() {
        let config = LayoutConfig::default();
        let layout =
            layout_document(&doc(vec![message(Role::User, "Hi")]), &config, &ApproxMetrics)
                .unwrap();
        assert_eq!(
            texts(&layout)[..2],
            ["Chat", "2024-05-01 12:00 UTC · 1 messages · 1 words"]
        );
        let (_, y, _, _) = rects(&layout)[0];
        assert!(y > config.margin);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LayoutConfig {
            bubble_width: 2000.0,
            ..config()
        };
        let result = layout_document(&doc(vec![]), &config, &ApproxMetrics);
        assert!(matches!(result, Err(LayoutError::BubbleTooWide { .. })));
    }

    #[test]
    fn test_empty_document_has_one_blank_page() {
        let layout = layout_document(&doc(vec![]), &config(), &ApproxMetrics).unwrap();
        assert_eq!(layout.page_count(), 1);
        assert!(layout.ops.is_empty());
    }

    #[test]
    fn test_ops_serialize_with_kind_tag() {
        let layout =
            layout_document(&doc(vec![message(Role::User, "Hi")]), &config(), &ApproxMetrics)
                .unwrap();
        let value = serde_json::to_value(&layout).unwrap();
        assert_eq!(value["ops"][0]["kind"], "rect");
        assert_eq!(value["ops"][1]["kind"], "text");
        assert_eq!(value["ops"][1]["line"], "body");
    }

    proptest! {
        #[test]
        fn prop_bubbles_never_cross_the_page_bottom(
            shapes in proptest::collection::vec((1usize..90, 0usize..3, any::<bool>()), 1..12),
        ) {
            let config = config();
            let messages = shapes
                .iter()
                .map(|(n, images, user)| {
                    let role = if *user { Role::User } else { Role::Assistant };
                    let mut m = message(role, &lines(*n));
                    for i in 0..*images {
                        m.images.push(image(&format!("data:image/png;base64,{}", i)));
                    }
                    m
                })
                .collect();
            let layout = layout_document(&doc(messages), &config, &ApproxMetrics).unwrap();

            for page in layout.pages() {
                for op in page {
                    match op {
                        DrawOp::Rect { y, height, .. } => {
                            prop_assert!(*y >= config.margin - EPS);
                            prop_assert!(y + height <= config.drawable_bottom() + EPS);
                        }
                        DrawOp::Text { y, .. } => {
                            prop_assert!(*y <= config.drawable_bottom() + EPS);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
