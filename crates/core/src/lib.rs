//! Core library for chatexport
//!
//! This crate implements the **Functional Core** of the chatexport application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! - **`chatexport_core`** (this crate): Pure transformation functions with zero I/O
//! - **`pdf`**: The PDF drawing backend (font metrics, image embedding, `lopdf` writer)
//! - **`chatexport`**: Input acquisition, image fetching and orchestration (the Imperative Shell)
//!
//! Nothing in this crate reads files, talks to the network or looks at the
//! clock. The export date is handed in by the caller, which keeps every
//! transformation reproducible from fixture data.
//!
//! # Module Organization
//!
//! - [`model`]: The structured [`model::Document`] shared by every stage
//! - [`normalize`]: The ordered text cleanup rules applied to extracted prose
//! - [`extract`]: Chat page markup to [`model::Document`]
//! - [`layout`]: Line classification, word wrap and pagination into drawing instructions
//! - [`render`]: Markdown and HTML writers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use chatexport_core::extract::{extract_html, ExtractOptions};
//! use chatexport_core::layout::{layout_document, ApproxMetrics, LayoutConfig};
//!
//! let extraction = extract_html(&page, &ExtractOptions::new(date));
//! let layout = layout_document(&extraction.document, &LayoutConfig::default(), &ApproxMetrics)?;
//!
//! assert!(layout.page_count() >= 1);
//! ```

pub mod extract;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod render;
