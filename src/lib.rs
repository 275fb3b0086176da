//! Epub press
//!
//! A Rust library for assembling documents into EPUB packages.
//!
//! This library renders an in-memory document model into the full set
//! of files a compliant reader requires (container descriptor, package
//! document, navigation files, chapter documents) and writes them into
//! a single EPUB archive. Embedded fonts can be masked with the IDPF
//! font obfuscation algorithm, keyed from the package's own unique
//! identifiers, before they enter the archive.
//!
//! ## Features
//!
//! - Typed document model: chapters, sections, resources, cover and
//!   metadata, populated from plain configuration structures.
//! - Exact-format generation of every package artifact, with
//!   well-formedness and text escaping guaranteed by construction.
//! - IDPF font obfuscation (http://www.idpf.org/2008/embedding) driven
//!   by the rendered encryption manifest.
//! - Per-item problems are collected as warnings; a build only aborts
//!   on structural failures.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # fn main() -> Result<(), epub_press::error::EpubError> {
//! use epub_press::{Chapter, Document, MetadataConfig, ResourceConfig, TextSection};
//!
//! let mut document = Document::new("my-book", "My Book");
//! document.set_metadata(MetadataConfig {
//!     title: Some("My Book".to_string()),
//!     author: Some("Jane Doe".to_string()),
//!     ..Default::default()
//! });
//!
//! let mut chapter = Chapter::new("intro", "Introduction");
//! chapter.add_section(Box::new(TextSection::new(
//!     "opening",
//!     vec!["It begins.".to_string()],
//! )));
//! document.add_chapter(chapter);
//!
//! document.add_resource(ResourceConfig {
//!     src: "assets/Body.otf".into(),
//!     uri: "fonts/Body.otf".to_string(),
//!     media_type: None,
//!     obfuscate: true,
//! });
//!
//! let report = document.build("build/epub", "my-book.epub")?;
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok(())
//! # }
//! ```

pub(crate) mod utils;

pub mod document;
pub mod error;
pub mod metadata;
pub mod obfuscation;
pub mod packager;
pub mod render;
pub mod types;

pub use document::{
    Chapter, ChapterConfig, ChapterContent, Cover, CoverConfig, Document, Resource,
    ResourceConfig, Section, TextSection,
};
pub use metadata::{IdentifierProvider, Metadata, MetadataConfig, RandomIdentifier};
pub use types::{BuildReport, EpubVersion};
pub use utils::media_type_for;
