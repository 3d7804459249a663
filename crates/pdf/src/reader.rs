//! Read back what the writer produced: Info fields, page count and the text
//! shown on each page.

use lopdf::content::Content;
use lopdf::Object;
use serde::Serialize;

use crate::PdfError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfInfo {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix) -- strips BOM and decodes.
/// 2. Valid UTF-8 -- returned as-is.
/// 3. Fallback to Latin-1 -- each byte mapped to its Unicode code point.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let code_units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

fn load(bytes: &[u8]) -> Result<lopdf::Document, PdfError> {
    lopdf::Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))
}

/// Document metadata and page count.
pub fn info(bytes: &[u8]) -> Result<PdfInfo, PdfError> {
    let doc = load(bytes)?;

    let info_dict = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        });

    let field = |key: &[u8]| -> Option<String> {
        match info_dict?.get(key).ok()? {
            Object::String(bytes, _) => Some(decode_text_simple(bytes)),
            Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    };

    Ok(PdfInfo {
        title: field(b"Title"),
        creator: field(b"Creator"),
        creation_date: field(b"CreationDate"),
        page_count: doc.get_pages().len(),
    })
}

/// The strings shown by `Tj` on each page, in drawing order.
pub fn page_texts(bytes: &[u8]) -> Result<Vec<Vec<String>>, PdfError> {
    let doc = load(bytes)?;
    let mut pages = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))?;
        let content = Content::decode(&data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;
        let texts = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => {
                    Some(bytes.iter().map(|&b| b as char).collect())
                }
                _ => None,
            })
            .collect();
        pages.push(texts);
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_text_simple_utf8() {
        assert_eq!(decode_text_simple("Hello, world!".as_bytes()), "Hello, world!");
    }

    #[test]
    fn decode_text_simple_latin1_high_bytes() {
        assert_eq!(decode_text_simple(&[b'c', b'a', b'f', 0xE9]), "caf\u{00E9}");
    }

    #[test]
    fn decode_text_simple_utf16be() {
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0xE9]), "\u{00E9}");
    }

    #[test]
    fn decode_text_simple_utf16be_odd_trailing_byte() {
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41, 0x00]), "A");
    }

    #[test]
    fn decode_text_simple_empty() {
        assert_eq!(decode_text_simple(&[]), "");
    }

    #[test]
    fn info_rejects_garbage() {
        assert!(matches!(info(&[]), Err(PdfError::Parse(_))));
        assert!(matches!(page_texts(b"not a pdf"), Err(PdfError::Parse(_))));
    }
}
