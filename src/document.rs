//! Document Model Module
//!
//! This module defines the in-memory model of a publication: a
//! [Document] owning its chapters, resources, cover and metadata. The
//! model is populated from typed configuration structures, then read
//! only from the point rendering begins.
//!
//! The model also exposes the derived views the file generators need:
//! the ordered manifest, the spine, the navigation points and the
//! per-chapter file names. Deriving these in one place keeps the
//! package document, the navigation files and the chapter files
//! consistent with each other by construction.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use infer::Infer;
use log::warn;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::{
    error::EpubError,
    metadata::{IdentifierProvider, Metadata, MetadataConfig},
    obfuscation,
    packager,
    render::{self, XmlWriter},
    types::{BuildReport, EpubVersion, ManifestEntry, NavPoint, SpineEntry},
    utils,
};

/// A renderable unit of chapter content
///
/// Sections write their markup through the shared XML writer, so text
/// escaping and tag matching hold for section content just like for
/// the generated page frame around it.
pub trait Section {
    /// The name of this section, used for diagnostics only
    fn name(&self) -> &str;

    /// Write this section's markup fragment
    fn write_into(&self, writer: &mut XmlWriter) -> Result<(), EpubError>;
}

/// The stock [Section] implementation: a run of plain paragraphs
pub struct TextSection {
    name: String,
    paragraphs: Vec<String>,
}

impl TextSection {
    pub fn new(name: &str, paragraphs: Vec<String>) -> Self {
        TextSection {
            name: name.to_string(),
            paragraphs,
        }
    }
}

impl Section for TextSection {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_into(&self, writer: &mut XmlWriter) -> Result<(), EpubError> {
        for paragraph in &self.paragraphs {
            writer.write_event(Event::Start(BytesStart::new("p")))?;
            writer.write_event(Event::Text(BytesText::new(paragraph)))?;
            writer.write_event(Event::End(BytesEnd::new("p")))?;
        }

        Ok(())
    }
}

/// The content of a chapter
///
/// A chapter either renders a sequence of sections into a generated
/// page, or copies a source file verbatim. The two forms are mutually
/// exclusive by construction.
pub enum ChapterContent {
    Sections(Vec<Box<dyn Section>>),
    Source(PathBuf),
}

/// Configuration for one chapter
///
/// A configuration carrying a source path maps to a verbatim-copy
/// chapter; one without maps to an empty chapter whose sections are
/// added programmatically.
#[derive(Debug, Default, Clone)]
pub struct ChapterConfig {
    pub id: String,
    pub title: String,
    pub src: Option<PathBuf>,
}

pub struct Chapter {
    pub id: String,
    pub title: String,
    pub content: ChapterContent,
}

impl Chapter {
    /// Create an empty chapter to be filled with sections
    pub fn new(id: &str, title: &str) -> Self {
        Chapter {
            id: id.to_string(),
            title: title.to_string(),
            content: ChapterContent::Sections(Vec::new()),
        }
    }

    /// Create a chapter whose content is copied verbatim from a file
    pub fn from_source(id: &str, title: &str, src: PathBuf) -> Self {
        Chapter {
            id: id.to_string(),
            title: title.to_string(),
            content: ChapterContent::Source(src),
        }
    }

    pub fn from_config(config: ChapterConfig) -> Self {
        match config.src {
            Some(src) => Chapter::from_source(&config.id, &config.title, src),
            None => Chapter::new(&config.id, &config.title),
        }
    }

    /// Append a section to a generated chapter
    ///
    /// Sections of a source-file chapter are ignored: the source is
    /// copied verbatim instead.
    pub fn add_section(&mut self, section: Box<dyn Section>) -> &mut Self {
        match &mut self.content {
            ChapterContent::Sections(sections) => sections.push(section),
            ChapterContent::Source(_) => {
                warn!(
                    "chapter '{}' copies its content from a source file; section '{}' is ignored",
                    self.id,
                    section.name()
                );
            }
        }

        self
    }
}

/// Configuration for one embedded resource
#[derive(Debug, Default, Clone)]
pub struct ResourceConfig {
    /// Source path of the file on disk
    pub src: PathBuf,

    /// Target URI inside the package content root
    pub uri: String,

    /// Explicit media type; guessed from content and extension when absent
    pub media_type: Option<String>,

    /// Whether the resource bytes are masked before archiving
    pub obfuscate: bool,
}

/// An embedded resource of the publication
///
/// When `obfuscate` is set the resource must be a binary font asset;
/// the obfuscation subsystem selects targets purely by URI and performs
/// no content-type check of its own.
pub struct Resource {
    pub src: PathBuf,
    pub uri: String,
    pub media_type: String,
    pub obfuscate: bool,
}

impl Resource {
    pub fn from_config(config: ResourceConfig) -> Self {
        let media_type = config
            .media_type
            .unwrap_or_else(|| guess_media_type(&config.src, &config.uri));

        Resource {
            src: config.src,
            uri: config.uri,
            media_type,
            obfuscate: config.obfuscate,
        }
    }
}

/// Configuration for the cover image
#[derive(Debug, Default, Clone)]
pub struct CoverConfig {
    pub src: PathBuf,
    pub uri: String,
    pub media_type: Option<String>,
    pub obfuscate: bool,

    /// Display size of the image; both must be known or the rendered
    /// cover page is degraded
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub struct Cover {
    pub src: PathBuf,
    pub uri: String,
    pub media_type: String,
    pub obfuscate: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Cover {
    pub fn from_config(config: CoverConfig) -> Self {
        let media_type = config
            .media_type
            .unwrap_or_else(|| guess_media_type(&config.src, &config.uri));

        Cover {
            src: config.src,
            uri: config.uri,
            media_type,
            obfuscate: config.obfuscate,
            width: config.width,
            height: config.height,
        }
    }
}

/// Guess the media type of an asset
///
/// Sniffs the file content when the source is readable, refining XML
/// and plain-text verdicts by extension; otherwise falls back to the
/// static extension table.
fn guess_media_type(src: &Path, uri: &str) -> String {
    let extension = uri.rsplit('.').next().unwrap_or_default().to_lowercase();

    if let Ok(buf) = fs::read(src) {
        if let Some(sniffed) = Infer::new().get(&buf) {
            return utils::refine_media_type(sniffed.mime_type(), &extension);
        }
    }

    utils::media_type_for(uri).to_string()
}

/// The in-memory model of one publication
///
/// A document exclusively owns its chapters, resources, cover and
/// metadata for its lifetime; nothing is shared across documents. All
/// parts are created during a build invocation and discarded after
/// packaging.
pub struct Document {
    /// Stable identifier of the document itself
    pub id: String,

    pub title: String,
    pub chapters: Vec<Chapter>,
    pub resources: Vec<Resource>,
    pub cover: Option<Cover>,

    /// URI of the stylesheet linked from generated pages, relative to
    /// the content root; the stylesheet file itself is added as a
    /// regular resource
    pub stylesheet: Option<String>,

    pub metadata: Option<Metadata>,
}

impl Document {
    pub fn new(id: &str, title: &str) -> Self {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            chapters: Vec::new(),
            resources: Vec::new(),
            cover: None,
            stylesheet: None,
            metadata: None,
        }
    }

    /// Set the publication metadata from a configuration
    pub fn set_metadata(&mut self, config: MetadataConfig) -> &mut Self {
        self.metadata = Some(Metadata::from_config(config));
        self
    }

    /// Set the publication metadata with an explicit identifier provider
    pub fn set_metadata_with_provider(
        &mut self,
        config: MetadataConfig,
        provider: &dyn IdentifierProvider,
    ) -> &mut Self {
        self.metadata = Some(Metadata::with_provider(config, provider));
        self
    }

    pub fn set_cover(&mut self, config: CoverConfig) -> &mut Self {
        self.cover = Some(Cover::from_config(config));
        self
    }

    pub fn set_stylesheet(&mut self, uri: &str) -> &mut Self {
        self.stylesheet = Some(uri.to_string());
        self
    }

    pub fn add_chapter(&mut self, chapter: Chapter) -> &mut Self {
        self.chapters.push(chapter);
        self
    }

    pub fn add_chapters(&mut self, configs: Vec<ChapterConfig>) -> &mut Self {
        for config in configs {
            self.chapters.push(Chapter::from_config(config));
        }
        self
    }

    pub fn add_resource(&mut self, config: ResourceConfig) -> &mut Self {
        self.resources.push(Resource::from_config(config));
        self
    }

    pub fn add_resources(&mut self, configs: Vec<ResourceConfig>) -> &mut Self {
        for config in configs {
            self.resources.push(Resource::from_config(config));
        }
        self
    }

    /// The format version of this document, 2.0 when no metadata is set
    pub fn version(&self) -> EpubVersion {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.version)
            .unwrap_or_default()
    }

    /// The generated file name of the chapter at `index`
    ///
    /// Chapter files are a zero-padded 3-digit sequence in spine order,
    /// 1-indexed: `001.xhtml`, `002.xhtml`, ...
    pub fn chapter_file_name(index: usize) -> String {
        format!("{:03}.xhtml", index + 1)
    }

    /// The ordered package manifest, keyed by item id
    ///
    /// Entries follow a fixed priority order: navigation files, then
    /// the cover page and image, then chapter documents, then
    /// resources. Insertion order is what the package document renders,
    /// so the manifest is deterministic across builds.
    pub fn manifest_entries(&self) -> IndexMap<String, ManifestEntry> {
        let mut entries = IndexMap::new();

        let mut insert = |entry: ManifestEntry| {
            entries.insert(entry.id.clone(), entry);
        };

        insert(ManifestEntry {
            id: "ncx".to_string(),
            href: "toc.ncx".to_string(),
            media_type: "application/x-dtbncx+xml".to_string(),
            properties: None,
        });

        if self.version().requires_nav_document() {
            insert(ManifestEntry {
                id: "nav".to_string(),
                href: "nav.xhtml".to_string(),
                media_type: "application/xhtml+xml".to_string(),
                properties: Some("nav".to_string()),
            });
        }

        if let Some(cover) = &self.cover {
            insert(ManifestEntry {
                id: "cover-page".to_string(),
                href: "cover.xhtml".to_string(),
                media_type: "application/xhtml+xml".to_string(),
                properties: None,
            });
            insert(ManifestEntry {
                id: "cover".to_string(),
                href: cover.uri.clone(),
                media_type: cover.media_type.clone(),
                properties: None,
            });
        }

        for (index, _) in self.chapters.iter().enumerate() {
            insert(ManifestEntry {
                id: format!("chapter{}", index + 1),
                href: Self::chapter_file_name(index),
                media_type: "application/xhtml+xml".to_string(),
                properties: None,
            });
        }

        for (index, resource) in self.resources.iter().enumerate() {
            insert(ManifestEntry {
                id: format!("res{}", index + 1),
                href: resource.uri.clone(),
                media_type: resource.media_type.clone(),
                properties: None,
            });
        }

        entries
    }

    /// The spine: cover page first when present, then the chapters in
    /// declared order
    pub fn spine_entries(&self) -> Vec<SpineEntry> {
        let mut entries = Vec::with_capacity(self.chapters.len() + 1);

        if self.cover.is_some() {
            entries.push(SpineEntry {
                idref: "cover-page".to_string(),
            });
        }

        for index in 0..self.chapters.len() {
            entries.push(SpineEntry {
                idref: format!("chapter{}", index + 1),
            });
        }

        entries
    }

    /// One navigation point per chapter, with 1-based play order
    pub fn nav_points(&self) -> Vec<NavPoint> {
        self.chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| NavPoint {
                label: chapter.title.clone(),
                content: Self::chapter_file_name(index),
                play_order: index + 1,
            })
            .collect()
    }

    /// URIs of all obfuscation targets, relative to the container root
    ///
    /// These are the URIs the encryption manifest declares; the
    /// obfuscation subsystem later reads them back from that manifest
    /// rather than from the model.
    pub fn obfuscated_uris(&self) -> Vec<String> {
        let mut uris = Vec::new();

        if let Some(cover) = &self.cover {
            if cover.obfuscate {
                uris.push(format!("{}/{}", render::CONTENT_ROOT, cover.uri));
            }
        }

        for resource in &self.resources {
            if resource.obfuscate {
                uris.push(format!("{}/{}", render::CONTENT_ROOT, resource.uri));
            }
        }

        uris
    }

    /// Render the publication into a directory tree at `build_root`
    ///
    /// The tree mirrors the final package layout. Per-item problems are
    /// reported in the returned [BuildReport]; only structural failures
    /// (I/O on the tree root, XML writer errors) abort.
    pub fn render<P: AsRef<Path>>(&self, build_root: P) -> Result<BuildReport, EpubError> {
        render::TreeRenderer::new(self, build_root.as_ref()).render()
    }

    /// Render, obfuscate and package the publication
    ///
    /// The full pipeline: the tree is rendered at `build_root`, the
    /// obfuscation key is derived from the rendered package documents,
    /// flagged resources are masked, and everything is written into a
    /// single archive at `output_path`.
    pub fn build<P, Q>(&self, build_root: P, output_path: Q) -> Result<BuildReport, EpubError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let mut report = self.render(&build_root)?;

        let masked = obfuscation::mask_tree(&build_root, &mut report.warnings)?;
        packager::package_tree(&build_root, &masked, output_path, &mut report.warnings)?;

        Ok(report)
    }
}
