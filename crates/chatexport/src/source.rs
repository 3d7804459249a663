use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::*;
use chatexport_core::extract::{extract_html, ExtractOptions, Extraction, TurnReport};
use chatexport_core::model::Document;
use chrono::Utc;
use headless_chrome::Browser;

/// Where a conversation comes from.
#[derive(Debug, clap::Args, serde::Serialize, serde::Deserialize, Clone)]
pub struct InputArgs {
    /// HTML page or JSON document to read, `-` for stdin
    #[clap(env = "CHATEXPORT_INPUT", required_unless_present = "url")]
    pub input: Option<String>,

    /// Render a live conversation page in headless Chrome instead of reading a file
    #[arg(long, conflicts_with = "input")]
    pub url: Option<String>,

    /// Title to use instead of the page title
    #[arg(long)]
    pub title: Option<String>,

    /// Browser timeout in seconds
    #[arg(short, long, env = "CHATEXPORT_TIMEOUT", default_value = "30")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Stdin,
    Url(String),
}

impl InputArgs {
    pub fn source(&self) -> Result<Source> {
        match (&self.url, self.input.as_deref()) {
            (Some(url), _) => Ok(Source::Url(url.clone())),
            (None, Some("-")) => Ok(Source::Stdin),
            (None, Some(path)) => Ok(Source::File(PathBuf::from(path))),
            (None, None) => Err(eyre!("Provide an input file, `-` for stdin, or --url")),
        }
    }
}

/// A conversation, with per-turn reports when it was extracted from a page.
#[derive(Debug, Clone)]
pub enum Loaded {
    Page(Extraction),
    Document(Document),
}

impl Loaded {
    pub fn document(&self) -> &Document {
        match self {
            Loaded::Page(extraction) => &extraction.document,
            Loaded::Document(document) => document,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            Loaded::Page(extraction) => extraction.document,
            Loaded::Document(document) => document,
        }
    }

    pub fn turns(&self) -> Option<&[TurnReport]> {
        match self {
            Loaded::Page(extraction) => Some(&extraction.turns),
            Loaded::Document(_) => None,
        }
    }
}

pub async fn load(args: &InputArgs) -> Result<Loaded> {
    let options = ExtractOptions {
        title: args.title.clone(),
        date: Utc::now(),
    };

    match args.source()? {
        Source::File(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| f!("Failed to read {}", path.display()))?;
            parse_input(&content, is_json_path(&path), &options)
        }
        Source::Stdin => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            parse_input(&content, false, &options)
        }
        Source::Url(url) => {
            let timeout = Duration::from_secs(args.timeout);
            // headless_chrome is synchronous.
            let html = tokio::time::timeout(
                timeout + Duration::from_secs(5),
                tokio::task::spawn_blocking(move || render_page(&url, timeout)),
            )
            .await
            .map_err(|_| Error::Browser("timed out rendering the page".into()))???;
            Ok(Loaded::Page(extract_html(&html, &options)))
        }
    }
}

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Parse file or stdin content. Content starting with `{` is a serialized
/// document even without a `.json` extension.
pub fn parse_input(content: &str, json: bool, options: &ExtractOptions) -> Result<Loaded> {
    if json || content.trim_start().starts_with('{') {
        let parsed: Document =
            serde_json::from_str(content).context("Failed to parse JSON document")?;
        parsed
            .check_placeholders()
            .map_err(|e| eyre!("Invalid document: {}", e))?;
        // Stats are derived from the messages, never taken from the file.
        let title = options.title.clone().unwrap_or(parsed.title);
        let document = Document::new(title, parsed.date, parsed.messages);
        if document.stats != parsed.stats {
            log::warn!("recomputed document stats differ from the ones in the file");
        }
        return Ok(Loaded::Document(document));
    }

    Ok(Loaded::Page(extract_html(content, options)))
}

fn render_page(url: &str, timeout: Duration) -> std::result::Result<String, Error> {
    let browser = Browser::default().map_err(|e| {
        Error::Browser(f!(
            "Failed to launch browser: {}. Make sure Chrome or Chromium is installed.",
            e
        ))
    })?;

    let tab = browser
        .new_tab()
        .map_err(|e| Error::Browser(f!("Failed to create new tab: {}", e)))?;
    tab.set_default_timeout(timeout);

    tab.navigate_to(url)
        .map_err(|e| Error::Browser(f!("Failed to navigate to {}: {}", url, e)))?
        .wait_until_navigated()
        .map_err(|e| Error::Browser(f!("Failed to wait for navigation: {}", e)))?;

    tab.get_content()
        .map_err(|e| Error::Browser(f!("Failed to get page content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatexport_core::model::{Message, Role};
    use chrono::TimeZone;

    fn options() -> ExtractOptions {
        ExtractOptions::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn args(input: Option<&str>, url: Option<&str>) -> InputArgs {
        InputArgs {
            input: input.map(String::from),
            url: url.map(String::from),
            title: None,
            timeout: 30,
        }
    }

    #[test]
    fn test_source_selection() {
        assert_eq!(args(Some("-"), None).source().unwrap(), Source::Stdin);
        assert_eq!(
            args(Some("chat.html"), None).source().unwrap(),
            Source::File(PathBuf::from("chat.html"))
        );
        assert_eq!(
            args(None, Some("https://chatgpt.com/c/1")).source().unwrap(),
            Source::Url("https://chatgpt.com/c/1".to_string())
        );
        assert!(args(None, None).source().is_err());
    }

    #[test]
    fn test_json_detection() {
        assert!(is_json_path(Path::new("chat.JSON")));
        assert!(!is_json_path(Path::new("chat.html")));
    }

    #[test]
    fn test_parse_html_input() {
        let html = r#"<html><head><title>Trip plan - ChatGPT</title></head><body>
            <div data-message-author-role="user"><div class="whitespace-pre-wrap">Where to?</div></div>
            <div data-message-author-role="assistant"><div class="markdown"><p>Lisbon.</p></div></div>
        </body></html>"#;
        let loaded = parse_input(html, false, &options()).unwrap();
        assert!(matches!(loaded, Loaded::Page(_)));
        assert_eq!(loaded.turns().map(|t| t.len()), Some(2));
        let doc = loaded.into_document();
        assert_eq!(doc.title, "Trip plan");
        assert_eq!(doc.stats.total, 2);
    }

    #[test]
    fn test_parse_json_input() {
        let doc = Document::new(
            "Saved",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            vec![Message {
                role: Role::User,
                text: "hello".to_string(),
                code_blocks: vec![],
                images: vec![],
            }],
        );
        let json = serde_json::to_string(&doc).unwrap();
        let loaded = parse_input(&json, false, &options()).unwrap();
        assert!(loaded.turns().is_none());
        assert_eq!(loaded.document(), &doc);

        let mut titled = options();
        titled.title = Some("Renamed".to_string());
        let loaded = parse_input(&json, true, &titled).unwrap();
        assert_eq!(loaded.document().title, "Renamed");
    }

    #[test]
    fn test_json_stats_are_recomputed() {
        let json = r#"{"title":"t","date":"2024-05-01T12:00:00Z",
            "stats":{"total":7,"user":5,"assistant":2,"wordCount":99},
            "messages":[{"role":"user","text":"just three words"}]}"#;
        let stats = parse_input(json, true, &options()).unwrap().document().stats;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.user + stats.assistant, stats.total);
        assert_eq!(stats.user, 1);
        assert_eq!(stats.word_count, 3);
    }

    #[test]
    fn test_json_with_dangling_placeholder_is_rejected() {
        let json = r#"{"title":"t","date":"2024-05-01T12:00:00Z",
            "stats":{"total":1,"user":1,"assistant":0,"wordCount":1},
            "messages":[{"role":"user","text":"[[CODE_BLOCK:code-0]]"}]}"#;
        assert!(parse_input(json, true, &options()).is_err());
    }
}
