use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::prelude::*;
use base64::Engine;
use chatexport_core::model::Document;
use futures::future::join_all;
use pdf::images::{detect_image_format, ImageFormat};

/// Responses shorter than this are error pages or tracking pixels.
pub const MIN_IMAGE_BYTES: usize = 64;

/// How one attempt at downloading an image authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Send the chat site's session cookie.
    WithCookies(String),
    Anonymous,
}

impl FetchStrategy {
    fn name(&self) -> &'static str {
        match self {
            FetchStrategy::WithCookies(_) => "with-cookies",
            FetchStrategy::Anonymous => "anonymous",
        }
    }
}

/// The strategies to try, in order.
pub fn strategies(cookie: Option<&str>) -> Vec<FetchStrategy> {
    let mut strategies = Vec::new();
    if let Some(cookie) = cookie.filter(|c| !c.trim().is_empty()) {
        strategies.push(FetchStrategy::WithCookies(cookie.to_string()));
    }
    strategies.push(FetchStrategy::Anonymous);
    strategies
}

pub fn is_remote(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Media type of a downloaded image: the sniffed format wins over the
/// response header, which is often `application/octet-stream`.
pub fn mime_type(content_type: Option<&str>, bytes: &[u8]) -> String {
    let sniffed = match detect_image_format(bytes) {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Jpeg2000 => Some("image/jp2"),
        ImageFormat::Unknown => None,
    };
    if let Some(mime) = sniffed {
        return mime.to_string();
    }

    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    f!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Download every remote image of `doc` and return a copy whose sources are
/// `data:` URIs. Images that cannot be fetched keep their original source.
pub async fn embed_remote_images(
    doc: &Document,
    cookie: Option<&str>,
    timeout: Duration,
) -> Result<Document> {
    let remote: BTreeSet<&str> = doc
        .messages
        .iter()
        .flat_map(|m| &m.images)
        .map(|image| image.source.as_str())
        .filter(|source| is_remote(source))
        .collect();
    if remote.is_empty() {
        return Ok(doc.clone());
    }

    let client = reqwest::Client::new();
    let strategies = strategies(cookie);
    let fetches = remote
        .iter()
        .map(|url| fetch_image(&client, url, &strategies, timeout));
    let fetched: HashMap<&str, String> = remote
        .iter()
        .copied()
        .zip(join_all(fetches).await)
        .filter_map(|(url, result)| match result {
            Ok(uri) => Some((url, uri)),
            Err(e) => {
                log::warn!("could not fetch {}: {}", url, e);
                None
            }
        })
        .collect();

    log::info!("embedded {} of {} remote images", fetched.len(), remote.len());
    Ok(doc.map_image_sources(|image| fetched.get(image.source.as_str()).cloned()))
}

async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    strategies: &[FetchStrategy],
    timeout: Duration,
) -> std::result::Result<String, Error> {
    let mut last_error = Error::Network(f!("no strategy tried for {}", url));
    for strategy in strategies {
        match tokio::time::timeout(timeout, try_strategy(client, url, strategy)).await {
            Ok(Ok(uri)) => return Ok(uri),
            Ok(Err(e)) => {
                log::debug!("{} fetch of {} failed: {}", strategy.name(), url, e);
                last_error = e;
            }
            Err(_) => {
                log::debug!("{} fetch of {} timed out", strategy.name(), url);
                last_error = Error::Network(f!("timed out after {:?}", timeout));
            }
        }
    }
    Err(last_error)
}

async fn try_strategy(
    client: &reqwest::Client,
    url: &str,
    strategy: &FetchStrategy,
) -> std::result::Result<String, Error> {
    let mut request = client.get(url);
    if let FetchStrategy::WithCookies(cookie) = strategy {
        request = request.header(reqwest::header::COOKIE, cookie);
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::Network(f!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(Error::Network(f!("response too small ({} bytes)", bytes.len())));
    }

    Ok(data_uri(&mime_type(content_type.as_deref(), &bytes), &bytes))
}
