use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use chatexport_core::layout::ImagePlacementError;
use chatexport_core::model::{Document, ImageRef};

/// Longest side, in pixels, an embedded image is downscaled to.
pub const MAX_EMBED_DIMENSION: u32 = 1600;

const SVG_MIME: &str = "image/svg+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Jpeg2000,
    Gif,
    Tiff,
    Bmp,
    WebP,
    Unknown,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "jpeg"),
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Jpeg2000 => write!(f, "jpeg2000"),
            ImageFormat::Gif => write!(f, "gif"),
            ImageFormat::Tiff => write!(f, "tiff"),
            ImageFormat::Bmp => write!(f, "bmp"),
            ImageFormat::WebP => write!(f, "webp"),
            ImageFormat::Unknown => write!(f, "unknown"),
        }
    }
}

impl ImageFormat {
    /// The decoder for this format, when one is compiled in.
    fn decoder(&self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
            ImageFormat::WebP => Some(image::ImageFormat::WebP),
            ImageFormat::Jpeg2000 | ImageFormat::Tiff | ImageFormat::Unknown => None,
        }
    }
}

/// Detect the image format from raw bytes using magic byte signatures.
///
/// Returns `ImageFormat::Unknown` if the bytes are too short (< 8) or no
/// known signature matches.
pub fn detect_image_format(bytes: &[u8]) -> ImageFormat {
    if bytes.len() < 8 {
        return ImageFormat::Unknown;
    }

    // JPEG: FF D8 FF
    if bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
        return ImageFormat::Jpeg;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if bytes[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return ImageFormat::Png;
    }

    // JPEG2000: 00 00 00 0C 6A 50 20 20
    if bytes[..8] == [0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20] {
        return ImageFormat::Jpeg2000;
    }

    // GIF: "GIF87a" or "GIF89a"
    if &bytes[..6] == b"GIF87a" || &bytes[..6] == b"GIF89a" {
        return ImageFormat::Gif;
    }

    // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
    if bytes[..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[..4] == [0x4D, 0x4D, 0x00, 0x2A] {
        return ImageFormat::Tiff;
    }

    // BMP: "BM"
    if bytes[0] == b'B' && bytes[1] == b'M' {
        return ImageFormat::Bmp;
    }

    // WebP: "RIFF" at offset 0 and "WEBP" at offset 8
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return ImageFormat::WebP;
    }

    ImageFormat::Unknown
}

/// A `data:` URI split into its media type and decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Parse a base64 `data:` URI.
///
/// Remote sources have to be fetched into a data URI before rendering, so
/// anything else is reported as not embedded.
pub fn parse_data_uri(source: &str) -> Result<DataUri, ImagePlacementError> {
    let Some(rest) = source.strip_prefix("data:") else {
        return Err(ImagePlacementError::NotEmbedded(truncate(source)));
    };
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImagePlacementError::Undecodable("data URI without payload".into()))?;

    let mut params = header.split(';');
    let mime = params.next().unwrap_or("").trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ImagePlacementError::UnsupportedEncoding(format!(
            "{} without base64",
            mime
        )));
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ImagePlacementError::Undecodable(e.to_string()))?;

    Ok(DataUri { mime, bytes })
}

/// Decoded pixels ready to become a DeviceRGB image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    /// 8-bit RGB, row-major, alpha already composited onto white.
    pub rgb: Vec<u8>,
}

/// Decode an image source into embeddable pixels.
pub fn decode_image(source: &str) -> Result<EmbeddedImage, ImagePlacementError> {
    let uri = parse_data_uri(source)?;
    if uri.mime == SVG_MIME {
        return rasterize_svg(&uri.bytes);
    }

    let format = detect_image_format(&uri.bytes);
    let decoder = format.decoder().ok_or_else(|| {
        ImagePlacementError::UnsupportedEncoding(format!("{} ({})", uri.mime, format))
    })?;

    let mut decoded = image::load_from_memory_with_format(&uri.bytes, decoder)
        .map_err(|e| ImagePlacementError::Undecodable(e.to_string()))?;
    if decoded.width() > MAX_EMBED_DIMENSION || decoded.height() > MAX_EMBED_DIMENSION {
        decoded = decoded.thumbnail(MAX_EMBED_DIMENSION, MAX_EMBED_DIMENSION);
    }

    let rgba = decoded.to_rgba8();
    Ok(EmbeddedImage {
        width: rgba.width(),
        height: rgba.height(),
        rgb: composite_on_white(rgba.as_raw()),
    })
}

/// Render an SVG document at its intrinsic size, capped at
/// [`MAX_EMBED_DIMENSION`] on the longest side.
pub fn rasterize_svg(bytes: &[u8]) -> Result<EmbeddedImage, ImagePlacementError> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| ImagePlacementError::Undecodable(format!("svg: {}", e)))?;

    let size = tree.size();
    let longest = size.width().max(size.height());
    let scale = if longest > MAX_EMBED_DIMENSION as f32 {
        MAX_EMBED_DIMENSION as f32 / longest
    } else {
        1.0
    };
    let width = ((size.width() * scale).round() as u32).max(1);
    let height = ((size.height() * scale).round() as u32).max(1);

    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        ImagePlacementError::Undecodable(format!("svg: cannot allocate {}x{}", width, height))
    })?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    // tiny-skia stores premultiplied alpha.
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    Ok(EmbeddedImage {
        width,
        height,
        rgb: composite_on_white(&rgba),
    })
}

/// Flatten RGBA pixels onto a white background.
fn composite_on_white(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        let alpha = px[3] as u32;
        for &channel in &px[..3] {
            let blended = (channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

fn truncate(source: &str) -> String {
    const MAX: usize = 80;
    match source.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &source[..end]),
        None => source.to_string(),
    }
}

/// Every distinct image source of a document, decoded once.
#[derive(Debug, Default)]
pub struct ImageCatalog {
    images: HashMap<String, Result<EmbeddedImage, ImagePlacementError>>,
}

impl ImageCatalog {
    pub fn from_document(doc: &Document) -> Self {
        let mut images = HashMap::new();
        for image in doc.messages.iter().flat_map(|m| &m.images) {
            if images.contains_key(&image.source) {
                continue;
            }
            let decoded = decode_image(&image.source);
            if let Err(e) = &decoded {
                log::warn!("image will not be embedded: {}", e);
            }
            images.insert(image.source.clone(), decoded);
        }
        ImageCatalog { images }
    }

    pub fn get(&self, source: &str) -> Option<&EmbeddedImage> {
        self.images.get(source).and_then(|r| r.as_ref().ok())
    }

    pub fn check(&self, image: &ImageRef) -> Result<(), ImagePlacementError> {
        match self.images.get(&image.source) {
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ImagePlacementError::NotEmbedded(truncate(&image.source))),
        }
    }

    /// Number of sources that decoded successfully.
    pub fn embedded(&self) -> usize {
        self.images.values().filter(|r| r.is_ok()).count()
    }
}
