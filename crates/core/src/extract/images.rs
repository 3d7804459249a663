//! Image collection for a conversation turn.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::model::{ImageKind, ImageRef};

/// Vector images at most this wide are treated as decorative icons.
pub const MIN_VECTOR_WIDTH: f32 = 100.0;

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Collect raster and vector images in document order (rasters first).
pub fn collect_images(turn: ElementRef<'_>) -> Vec<ImageRef> {
    let mut images = raster_images(turn);
    images.extend(vector_images(turn));
    images
}

fn raster_images(turn: ElementRef<'_>) -> Vec<ImageRef> {
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };

    turn.select(&selector)
        .filter_map(|img| {
            let element = img.value();
            let source = element
                .attr("src")
                .or_else(|| element.attr("data-src"))?
                .trim();
            if source.is_empty() || is_icon_source(source) {
                return None;
            }
            Some(ImageRef {
                kind: ImageKind::Raster,
                source: source.to_string(),
                width: element.attr("width").and_then(parse_length),
                height: element.attr("height").and_then(parse_length),
            })
        })
        .collect()
}

fn vector_images(turn: ElementRef<'_>) -> Vec<ImageRef> {
    let Ok(selector) = Selector::parse("svg") else {
        return Vec::new();
    };

    turn.select(&selector)
        // Nested <svg> elements are serialized with their outermost parent.
        .filter(|svg| {
            !svg.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| a.value().name() == "svg")
        })
        .filter_map(|svg| {
            let (width, height) = svg_dimensions(svg);
            let width = width.filter(|w| *w > MIN_VECTOR_WIDTH)?;
            Some(ImageRef {
                kind: ImageKind::Vector,
                source: svg_data_uri(&svg.html()),
                width: Some(width),
                height,
            })
        })
        .collect()
}

/// Whether an image source looks like UI chrome rather than content.
pub fn is_icon_source(source: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re =
        RE.get_or_init(|| Regex::new(r"(?i)(icon|avatar|logo|favicon|emoji|sprite)").unwrap());
    re.is_match(source)
}

/// Bounding box of an `<svg>` from its attributes, inline style or viewBox.
pub fn svg_dimensions(svg: ElementRef<'_>) -> (Option<f32>, Option<f32>) {
    let element = svg.value();
    let view_box = element.attr("viewBox").and_then(parse_view_box);
    let style = element.attr("style").unwrap_or("");

    let width = element
        .attr("width")
        .and_then(parse_length)
        .or_else(|| style_length(style, "width"))
        .or(view_box.map(|(w, _)| w));
    let height = element
        .attr("height")
        .and_then(parse_length)
        .or_else(|| style_length(style, "height"))
        .or_else(|| match (width, view_box) {
            (Some(w), Some((vw, vh))) if vw > 0.0 => Some(w * vh / vw),
            _ => None,
        });

    (width, height)
}

/// Self-contained `data:` URI for serialized SVG markup.
pub fn svg_data_uri(markup: &str) -> String {
    let markup = if markup.contains("xmlns=") {
        markup.to_string()
    } else {
        markup.replacen("<svg", &format!(r#"<svg xmlns="{}""#, SVG_NAMESPACE), 1)
    };
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(markup.as_bytes())
    )
}

/// Leading number of a CSS/HTML length ("300", "300px", "12.5pt").
/// Percentages are relative and yield `None`.
fn parse_length(value: &str) -> Option<f32> {
    let value = value.trim();
    if value.ends_with('%') {
        return None;
    }
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    value[..end].parse::<f32>().ok().filter(|v| *v > 0.0)
}

fn style_length(style: &str, property: &str) -> Option<f32> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        (name.trim() == property)
            .then(|| parse_length(value))
            .flatten()
    })
}

fn parse_view_box(value: &str) -> Option<(f32, f32)> {
    let nums: Vec<f32> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match nums.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
        _ => None,
    }
}
