//! Execute a [`Layout`] into a PDF file with `lopdf`.
//!
//! Layout coordinates have a top-left origin; PDF user space starts at the
//! bottom-left, so every y is flipped against the page height here.

use std::collections::HashMap;

use chatexport_core::layout::{DrawOp, Font, Layout, LayoutConfig, Rgb, TextStyle};
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};

use crate::images::ImageCatalog;
use crate::metrics::encode_winansi;
use crate::PdfError;

/// Written into the Info dictionary of every file.
pub const CREATOR: &str = "chatexport";

/// Bezier control distance for a quarter circle of radius 1.
const KAPPA: f32 = 0.552_284_8;

/// Document-level fields of the Info dictionary.
#[derive(Debug, Clone)]
pub struct Metadata<'a> {
    pub title: &'a str,
    pub created: DateTime<Utc>,
}

pub struct PageWriter<'a> {
    config: &'a LayoutConfig,
    catalog: &'a ImageCatalog,
    doc: lopdf::Document,
    pages_id: ObjectId,
    fonts: Dictionary,
    xobjects: Dictionary,
    /// Image source -> XObject resource name.
    image_names: HashMap<String, String>,
}

impl<'a> PageWriter<'a> {
    pub fn new(config: &'a LayoutConfig, catalog: &'a ImageCatalog) -> Self {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in [Font::Helvetica, Font::HelveticaBold] {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_name(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font_resource(font), font_id);
        }

        PageWriter {
            config,
            catalog,
            doc,
            pages_id,
            fonts,
            xobjects: Dictionary::new(),
            image_names: HashMap::new(),
        }
    }

    /// Write every page of `layout` and serialize the document.
    pub fn write(mut self, layout: &Layout, meta: &Metadata<'_>) -> Result<Vec<u8>, PdfError> {
        let mut page_contents = Vec::new();
        for page in layout.pages() {
            let mut operations = Vec::new();
            for op in page {
                self.draw(op, &mut operations);
            }
            let bytes = Content { operations }
                .encode()
                .map_err(|e| PdfError::Write(e.to_string()))?;
            page_contents.push(bytes);
        }

        let resources_id = self.doc.add_object(dictionary! {
            "Font" => self.fonts.clone(),
            "XObject" => self.xobjects.clone(),
        });

        let mut kids = Vec::with_capacity(page_contents.len());
        for bytes in page_contents {
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, bytes));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    self.config.page_width.into(),
                    self.config.page_height.into(),
                ],
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => text_string(meta.title),
            "Creator" => Object::string_literal(CREATOR),
            "CreationDate" => Object::string_literal(pdf_date(&meta.created)),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        self.doc.compress();
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Write(e.to_string()))?;
        Ok(buffer)
    }

    fn draw(&mut self, op: &DrawOp, out: &mut Vec<Operation>) {
        match op {
            DrawOp::NewPage => {}
            DrawOp::Rect {
                x,
                y,
                width,
                height,
                radius,
                fill,
            } => {
                out.push(fill_color(*fill));
                let bottom = self.flip(y + height);
                rounded_rect(out, *x, bottom, *width, *height, *radius);
                out.push(Operation::new("f", vec![]));
            }
            DrawOp::Text { x, y, text, style, .. } => {
                text_run(out, *x, self.flip(*y), text, style);
            }
            DrawOp::Image {
                x,
                y,
                width,
                height,
                source,
                ..
            } => {
                let Some(name) = self.image_resource(source) else {
                    log::warn!("image was not decoded, leaving its slot empty");
                    return;
                };
                let Some(image) = self.catalog.get(source) else {
                    return;
                };
                let (w, h) = fit(image.width, image.height, *width, *height);
                out.push(Operation::new("q", vec![]));
                out.push(Operation::new(
                    "cm",
                    vec![
                        w.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        h.into(),
                        (*x).into(),
                        self.flip(y + h).into(),
                    ],
                ));
                out.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                out.push(Operation::new("Q", vec![]));
            }
        }
    }

    fn flip(&self, y: f32) -> f32 {
        self.config.page_height - y
    }

    /// The XObject name of `source`, embedding the image on first use.
    fn image_resource(&mut self, source: &str) -> Option<String> {
        if let Some(name) = self.image_names.get(source) {
            return Some(name.clone());
        }
        let image = self.catalog.get(source)?;
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            image.rgb.clone(),
        );
        let id = self.doc.add_object(stream);
        let name = format!("Im{}", self.image_names.len());
        self.xobjects.set(name.as_bytes().to_vec(), id);
        self.image_names.insert(source.to_string(), name.clone());
        Some(name)
    }
}

fn font_resource(font: Font) -> &'static str {
    match font {
        Font::Helvetica => "F1",
        Font::HelveticaBold => "F2",
    }
}

fn fill_color(color: Rgb) -> Operation {
    let [r, g, b] = color.to_unit();
    Operation::new("rg", vec![r.into(), g.into(), b.into()])
}

fn text_run(out: &mut Vec<Operation>, x: f32, baseline: f32, text: &str, style: &TextStyle) {
    out.push(Operation::new("BT", vec![]));
    out.push(Operation::new(
        "Tf",
        vec![
            Object::Name(font_resource(style.font).as_bytes().to_vec()),
            style.size.into(),
        ],
    ));
    out.push(fill_color(style.color));
    out.push(Operation::new("Td", vec![x.into(), baseline.into()]));
    out.push(Operation::new(
        "Tj",
        vec![Object::String(encode_winansi(text), StringFormat::Literal)],
    ));
    out.push(Operation::new("ET", vec![]));
}

/// Append a closed rectangle path with corners rounded by `radius`.
///
/// `(x, y)` is the bottom-left corner in PDF space.
fn rounded_rect(out: &mut Vec<Operation>, x: f32, y: f32, width: f32, height: f32, radius: f32) {
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    if r == 0.0 {
        out.push(Operation::new(
            "re",
            vec![x.into(), y.into(), width.into(), height.into()],
        ));
        return;
    }

    let k = r * KAPPA;
    let (left, right, bottom, top) = (x, x + width, y, y + height);
    let point = |op: &str, coords: &[f32]| {
        Operation::new(op, coords.iter().map(|&c| c.into()).collect())
    };

    out.push(point("m", &[left + r, bottom]));
    out.push(point("l", &[right - r, bottom]));
    out.push(point("c", &[right - r + k, bottom, right, bottom + r - k, right, bottom + r]));
    out.push(point("l", &[right, top - r]));
    out.push(point("c", &[right, top - r + k, right - r + k, top, right - r, top]));
    out.push(point("l", &[left + r, top]));
    out.push(point("c", &[left + r - k, top, left, top - r + k, left, top - r]));
    out.push(point("l", &[left, bottom + r]));
    out.push(point("c", &[left, bottom + r - k, left + r - k, bottom, left + r, bottom]));
    out.push(Operation::new("h", vec![]));
}

/// Scale `width x height` pixels to fit inside a `max_w x max_h` box,
/// keeping the aspect ratio.
fn fit(width: u32, height: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    if width == 0 || height == 0 {
        return (max_w, max_h);
    }
    let scale = (max_w / width as f32).min(max_h / height as f32);
    (width as f32 * scale, height as f32 * scale)
}

/// A PDF text string: a literal for plain ASCII, UTF-16BE with a BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// `D:YYYYMMDDHHmmSSZ`
fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}
