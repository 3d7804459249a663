use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::{eprintln, println, *};
use crate::source::{load, InputArgs};
use chatexport_core::layout::LayoutConfig;
use chatexport_core::model::Document;
use chatexport_core::render::{html, markdown};
use colored::Colorize;
use pdf::PdfRenderer;

/// Longest file stem derived from a conversation title.
const MAX_STEM_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Markdown with fenced code blocks
    Md,
    /// Standalone HTML page
    Html,
    /// Paginated PDF with chat bubbles
    Pdf,
    /// The extracted document as JSON
    Json,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Md => "md",
            Format::Html => "html",
            Format::Pdf => "pdf",
            Format::Json => "json",
        }
    }
}

#[derive(Debug, clap::Args, serde::Serialize, serde::Deserialize, Clone)]
pub struct ExportOptions {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pdf")]
    pub format: Format,

    /// Output file (default: derived from the conversation title)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// TOML file overriding the PDF page geometry
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Download remote images and embed them before rendering
    #[arg(long)]
    pub fetch_images: bool,

    /// Cookie header sent when downloading images
    #[arg(long, env = "CHATEXPORT_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
}

pub async fn run(options: ExportOptions, global: crate::Global) -> Result<()> {
    let config = match &options.layout {
        Some(path) => load_layout(path)?,
        None => LayoutConfig::default(),
    };

    let mut document = load(&options.input).await?.into_document();
    if options.fetch_images && !document.is_empty() {
        document = crate::fetch::embed_remote_images(
            &document,
            options.cookie.as_deref(),
            Duration::from_secs(options.input.timeout),
        )
        .await?;
    }

    let path = options
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&document.title, options.format));

    match export_document(&document, options.format, &config, &path) {
        Ok(()) => {
            if global.verbose {
                eprintln!(
                    "{} {} messages ({} words)",
                    "Exported".green().bold(),
                    document.stats.total,
                    document.stats.word_count
                );
            }
            println!("{}", path.display());
            Ok(())
        }
        Err(Error::EmptyDocument) => {
            eprintln!("{}", Error::EmptyDocument.to_string().yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn load_layout(path: &Path) -> Result<LayoutConfig> {
    let source = std::fs::read_to_string(path)
        .with_context(|| f!("Failed to read layout file {}", path.display()))?;
    LayoutConfig::from_toml_str(&source)
        .with_context(|| f!("Invalid layout file {}", path.display()))
}

/// Render `doc` as `format`.
pub fn render(
    doc: &Document,
    format: Format,
    config: &LayoutConfig,
) -> std::result::Result<Vec<u8>, Error> {
    if doc.is_empty() {
        return Err(Error::EmptyDocument);
    }

    let bytes = match format {
        Format::Md => markdown::render_document(doc).into_bytes(),
        Format::Html => html::render_document(doc).into_bytes(),
        Format::Json => serde_json::to_vec_pretty(doc).map_err(|e| Error::Generic(e.to_string()))?,
        Format::Pdf => PdfRenderer::new(config.clone())
            .render(doc)
            .map_err(|e| Error::Generic(e.to_string()))?,
    };
    Ok(bytes)
}

/// Render `doc` and write it to `path`. Nothing is written on error.
pub fn export_document(
    doc: &Document,
    format: Format,
    config: &LayoutConfig,
    path: &Path,
) -> std::result::Result<(), Error> {
    let bytes = render(doc, format, config)?;
    std::fs::write(path, bytes)
        .map_err(|e| Error::Generic(f!("Failed to write {}: {}", path.display(), e)))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// A file name built from the conversation title.
pub fn default_output_path(title: &str, format: Format) -> PathBuf {
    let mut stem = String::new();
    for c in title.chars() {
        if c.is_alphanumeric() || c == '-' {
            stem.push(c);
        } else if !stem.is_empty() && !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end_matches('_');
    let stem = if stem.is_empty() { "conversation" } else { stem };
    PathBuf::from(f!("{}.{}", stem, format.extension()))
}
