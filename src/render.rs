//! File Generators
//!
//! This module renders the document model into the directory tree a
//! compliant reader expects: the container descriptor, the package
//! document, the navigation files, the chapter and cover documents,
//! the encryption manifest and the platform display-options file.
//!
//! Each generator is a function from the model to exact bytes; the
//! [TreeRenderer] drives them in order and lays the results out under
//! the build root. All markup is produced through `quick_xml::Writer`,
//! so tags are matched and text fields (titles, authors, labels) are
//! escaped by construction.

mod page;

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use log::warn;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    document::{Chapter, ChapterContent, Cover, Document},
    error::{BuildWarning, EpubError},
    metadata::{Metadata, MetadataConfig},
    obfuscation,
    render::page::Page,
    types::BuildReport,
};

pub type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Directory holding every content document and resource
pub(crate) const CONTENT_ROOT: &str = "OEBPS";

/// Path of the container descriptor inside the package
pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Path of the encryption manifest inside the package
pub(crate) const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";

/// Path of the package document inside the package
pub(crate) const PACKAGE_PATH: &str = "OEBPS/content.opf";

/// Media type of the whole container, also the exact content of the
/// `mimetype` marker file
pub(crate) const EPUB_MEDIA_TYPE: &str = "application/epub+zip";

const DISPLAY_OPTIONS_PATH: &str = "META-INF/com.apple.ibooks.display-options.xml";

/// Fixed content of the platform display-options file; enables
/// embedded fonts on every platform
const DISPLAY_OPTIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<display_options>
  <platform name="*">
    <option name="specified-fonts">true</option>
  </platform>
</display_options>
"#;

/// Renders a document model into a package tree
///
/// The renderer owns the warning accumulator for the render phase;
/// per-item problems (missing chapter sources, missing resources) are
/// recorded and skipped while rendering continues.
pub struct TreeRenderer<'a> {
    document: &'a Document,
    root: PathBuf,
    warnings: Vec<BuildWarning>,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(document: &'a Document, root: &Path) -> Self {
        TreeRenderer {
            document,
            root: root.to_path_buf(),
            warnings: Vec::new(),
        }
    }

    /// Render every artifact of the package into the build root
    ///
    /// # Return
    /// - `Ok(BuildReport)`: The tree was rendered; the report lists
    ///   items that were skipped or degraded
    /// - `Err(EpubError)`: A structural failure aborted rendering
    pub fn render(mut self) -> Result<BuildReport, EpubError> {
        let document = self.document;

        fs::create_dir_all(self.root.join("META-INF"))?;
        fs::create_dir_all(self.root.join(CONTENT_ROOT))?;

        let metadata = self.resolve_metadata();

        fs::write(self.root.join("mimetype"), EPUB_MEDIA_TYPE)?;
        self.write(CONTAINER_PATH, container_xml()?)?;
        self.write(DISPLAY_OPTIONS_PATH, DISPLAY_OPTIONS.as_bytes().to_vec())?;

        self.write(PACKAGE_PATH, package_document(document, &metadata)?)?;
        self.write("OEBPS/toc.ncx", toc_ncx(document, &metadata)?)?;

        if metadata.version.requires_nav_document() {
            self.write("OEBPS/nav.xhtml", nav_document(document, &metadata)?)?;
        }

        if let Some(cover) = &document.cover {
            self.render_cover(cover, &metadata)?;
        }

        for (index, chapter) in document.chapters.iter().enumerate() {
            self.render_chapter(index, chapter, &metadata)?;
        }

        for resource in &document.resources {
            if !self.copy_asset(&resource.src, &resource.uri)? {
                let warning = BuildWarning::ResourceSourceNotFound {
                    uri: resource.uri.clone(),
                    path: resource.src.to_string_lossy().to_string(),
                };
                warn!("{}", warning);
                self.warnings.push(warning);
            }
        }

        // The encryption manifest is conditional-absent: no file at all
        // when nothing is flagged for obfuscation. The obfuscation
        // subsystem and the packager both key off that absence.
        let targets = document.obfuscated_uris();
        if !targets.is_empty() {
            self.write(ENCRYPTION_PATH, encryption_xml(&targets)?)?;
        }

        Ok(BuildReport {
            warnings: self.warnings,
        })
    }

    /// The metadata to render, substituting defaults when none was set
    fn resolve_metadata(&mut self) -> Metadata {
        match &self.document.metadata {
            Some(metadata) => metadata.clone(),
            None => {
                let warning = BuildWarning::MissingMetadata;
                warn!("{}", warning);
                self.warnings.push(warning);

                Metadata::from_config(MetadataConfig {
                    title: Some(self.document.title.clone()),
                    ..Default::default()
                })
            }
        }
    }

    fn render_cover(&mut self, cover: &Cover, metadata: &Metadata) -> Result<(), EpubError> {
        if cover.width.is_none() || cover.height.is_none() {
            let warning = BuildWarning::MissingCoverSize;
            warn!("{}", warning);
            self.warnings.push(warning);
        }

        let stylesheet = self.document.stylesheet.as_deref();
        self.write("OEBPS/cover.xhtml", cover_page(cover, metadata, stylesheet)?)?;

        if !self.copy_asset(&cover.src, &cover.uri)? {
            let warning = BuildWarning::CoverSourceNotFound {
                path: cover.src.to_string_lossy().to_string(),
            };
            warn!("{}", warning);
            self.warnings.push(warning);
        }

        Ok(())
    }

    fn render_chapter(
        &mut self,
        index: usize,
        chapter: &Chapter,
        metadata: &Metadata,
    ) -> Result<(), EpubError> {
        let file_name = Document::chapter_file_name(index);

        match &chapter.content {
            ChapterContent::Sections(sections) => {
                let stylesheet = self.document.stylesheet.as_deref();
                let bytes = chapter_page(chapter, sections, metadata, stylesheet)?;
                self.write(&format!("{}/{}", CONTENT_ROOT, file_name), bytes)?;
            }

            // Chapter content is copied verbatim from the source file
            ChapterContent::Source(src) => {
                if src.is_file() {
                    fs::copy(src, self.root.join(CONTENT_ROOT).join(&file_name))?;
                } else {
                    let warning = BuildWarning::ChapterSourceNotFound {
                        chapter: chapter.id.clone(),
                        path: src.to_string_lossy().to_string(),
                    };
                    warn!("{}", warning);
                    self.warnings.push(warning);
                }
            }
        }

        Ok(())
    }

    /// Copy an asset file under the content root, creating parent
    /// directories as needed
    ///
    /// Returns `false` when the source does not exist; the caller
    /// records the appropriate warning.
    fn copy_asset(&self, src: &Path, uri: &str) -> Result<bool, EpubError> {
        if !src.is_file() {
            return Ok(false);
        }

        let target = self.root.join(CONTENT_ROOT).join(uri);
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::copy(src, target)?;
        Ok(true)
    }

    fn write(&self, relative: &str, bytes: Vec<u8>) -> Result<(), EpubError> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Generate the container descriptor
///
/// Fixed content: the descriptor only declares where the package
/// document lives.
pub(crate) fn container_xml() -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("container").with_attributes([
        ("version", "1.0"),
        ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
    ])))?;
    writer.write_event(Event::Start(BytesStart::new("rootfiles")))?;
    writer.write_event(Event::Empty(BytesStart::new("rootfile").with_attributes([
        ("full-path", PACKAGE_PATH),
        ("media-type", "application/oebps-package+xml"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("rootfiles")))?;
    writer.write_event(Event::End(BytesEnd::new("container")))?;

    Ok(writer.into_inner().into_inner())
}

/// Generate the package document: identification metadata, manifest
/// and spine
pub(crate) fn package_document(
    document: &Document,
    metadata: &Metadata,
) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("package").with_attributes([
        ("xmlns", "http://www.idpf.org/2007/opf"),
        ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
        ("xmlns:opf", "http://www.idpf.org/2007/opf"),
        ("unique-identifier", "pub-id"),
        ("version", metadata.version.as_str()),
    ])))?;

    write_package_metadata(&mut writer, document, metadata)?;
    write_package_manifest(&mut writer, document)?;
    write_package_spine(&mut writer, document)?;

    writer.write_event(Event::End(BytesEnd::new("package")))?;

    Ok(writer.into_inner().into_inner())
}

/// Write the identification metadata block
///
/// Absent optional fields are omitted entirely, never emitted empty.
fn write_package_metadata(
    writer: &mut XmlWriter,
    document: &Document,
    metadata: &Metadata,
) -> Result<(), EpubError> {
    writer.write_event(Event::Start(BytesStart::new("metadata")))?;

    if let Some(publisher) = &metadata.publisher {
        write_text_element(writer, "dc:publisher", publisher, &[])?;
    }
    if let Some(rights) = &metadata.rights {
        write_text_element(writer, "dc:rights", rights, &[])?;
    }

    write_text_element(writer, "dc:language", metadata.language_or_default(), &[])?;

    if let Some(author) = &metadata.author {
        match &metadata.author_sortname {
            Some(sortname) => write_text_element(
                writer,
                "dc:creator",
                author,
                &[("opf:file-as", sortname.as_str()), ("opf:role", "aut")],
            )?,
            None => write_text_element(writer, "dc:creator", author, &[("opf:role", "aut")])?,
        }
    }

    if let Some(title) = &metadata.title {
        write_text_element(writer, "dc:title", title, &[])?;
    }

    if document.cover.is_some() {
        writer.write_event(Event::Empty(BytesStart::new("meta").with_attributes([
            ("name", "cover"),
            ("content", "cover"),
        ])))?;
    }

    let date = metadata.date_or_now();
    write_text_element(writer, "dc:date", &date, &[])?;

    write_text_element(
        writer,
        "dc:identifier",
        &metadata.identifier,
        &[("id", "pub-id"), ("opf:scheme", "uuid")],
    )?;

    if let Some(subject) = &metadata.subject {
        write_text_element(writer, "dc:subject", subject, &[])?;
    }

    writer.write_event(Event::End(BytesEnd::new("metadata")))?;

    Ok(())
}

fn write_package_manifest(writer: &mut XmlWriter, document: &Document) -> Result<(), EpubError> {
    writer.write_event(Event::Start(BytesStart::new("manifest")))?;

    for entry in document.manifest_entries().values() {
        let mut item = BytesStart::new("item");
        item.push_attribute(("id", entry.id.as_str()));
        item.push_attribute(("href", entry.href.as_str()));
        item.push_attribute(("media-type", entry.media_type.as_str()));
        if let Some(properties) = &entry.properties {
            item.push_attribute(("properties", properties.as_str()));
        }

        writer.write_event(Event::Empty(item))?;
    }

    writer.write_event(Event::End(BytesEnd::new("manifest")))?;

    Ok(())
}

fn write_package_spine(writer: &mut XmlWriter, document: &Document) -> Result<(), EpubError> {
    writer.write_event(Event::Start(
        BytesStart::new("spine").with_attributes([("toc", "ncx")]),
    ))?;

    for entry in document.spine_entries() {
        writer.write_event(Event::Empty(
            BytesStart::new("itemref").with_attributes([("idref", entry.idref.as_str())]),
        ))?;
    }

    writer.write_event(Event::End(BytesEnd::new("spine")))?;

    Ok(())
}

/// Generate the legacy NCX table of contents
pub(crate) fn toc_ncx(document: &Document, metadata: &Metadata) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ncx").with_attributes([
        ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
        ("version", "2005-1"),
        ("xml:lang", metadata.language_or_default()),
    ])))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    for (content, name) in [
        (metadata.identifier.as_str(), "dtb:uid"),
        ("1", "dtb:depth"),
        ("0", "dtb:totalPageCount"),
        ("0", "dtb:maxPageNumber"),
    ] {
        writer.write_event(Event::Empty(BytesStart::new("meta").with_attributes([
            ("content", content),
            ("name", name),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    let title = metadata.title.as_deref().unwrap_or(&document.title);
    writer.write_event(Event::Start(BytesStart::new("docTitle")))?;
    write_text_element(&mut writer, "text", title, &[])?;
    writer.write_event(Event::End(BytesEnd::new("docTitle")))?;

    if let Some(author) = &metadata.author {
        writer.write_event(Event::Start(BytesStart::new("docAuthor")))?;
        write_text_element(&mut writer, "text", author, &[])?;
        writer.write_event(Event::End(BytesEnd::new("docAuthor")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("navMap")))?;
    for point in document.nav_points() {
        let id = format!("navpoint-{}", point.play_order);
        let play_order = point.play_order.to_string();

        writer.write_event(Event::Start(BytesStart::new("navPoint").with_attributes([
            ("class", "chapter"),
            ("id", id.as_str()),
            ("playOrder", play_order.as_str()),
        ])))?;

        writer.write_event(Event::Start(BytesStart::new("navLabel")))?;
        write_text_element(&mut writer, "text", &point.label, &[])?;
        writer.write_event(Event::End(BytesEnd::new("navLabel")))?;

        writer.write_event(Event::Empty(
            BytesStart::new("content").with_attributes([("src", point.content.as_str())]),
        ))?;

        writer.write_event(Event::End(BytesEnd::new("navPoint")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("navMap")))?;

    writer.write_event(Event::End(BytesEnd::new("ncx")))?;

    Ok(writer.into_inner().into_inner())
}

/// Generate the navigation document required by version 3.0
pub(crate) fn nav_document(document: &Document, metadata: &Metadata) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
        ("xmlns", "http://www.w3.org/1999/xhtml"),
        ("xmlns:epub", "http://www.idpf.org/2007/ops"),
        ("xml:lang", metadata.language_or_default()),
    ])))?;

    let title = metadata.title.as_deref().unwrap_or(&document.title);

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    write_text_element(&mut writer, "title", title, &[])?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;
    writer.write_event(Event::Start(
        BytesStart::new("nav").with_attributes([("epub:type", "toc")]),
    ))?;

    if !title.is_empty() {
        write_text_element(&mut writer, "h1", title, &[])?;
    }

    writer.write_event(Event::Start(BytesStart::new("ol")))?;
    for point in document.nav_points() {
        writer.write_event(Event::Start(BytesStart::new("li")))?;
        write_text_element(
            &mut writer,
            "a",
            &point.label,
            &[("href", point.content.as_str())],
        )?;
        writer.write_event(Event::End(BytesEnd::new("li")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("ol")))?;

    writer.write_event(Event::End(BytesEnd::new("nav")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    Ok(writer.into_inner().into_inner())
}

/// Generate one chapter document from its sections
pub(crate) fn chapter_page(
    chapter: &Chapter,
    sections: &[Box<dyn crate::document::Section>],
    metadata: &Metadata,
    stylesheet: Option<&str>,
) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let page = Page::new(&chapter.title, metadata.language_or_default())
        .with_stylesheet(stylesheet);
    page.begin(&mut writer)?;

    write_text_element(&mut writer, "h1", &chapter.title, &[])?;
    for section in sections {
        section.write_into(&mut writer)?;
    }

    Page::end(&mut writer)?;

    Ok(writer.into_inner().into_inner())
}

/// Generate the cover document
///
/// The regular form wraps the image in an SVG viewport at the declared
/// size; without known dimensions the page degrades to a bare `img`
/// element.
pub(crate) fn cover_page(
    cover: &Cover,
    metadata: &Metadata,
    stylesheet: Option<&str>,
) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let page = Page::new("Cover", metadata.language_or_default()).with_stylesheet(stylesheet);
    page.begin(&mut writer)?;

    match (cover.width, cover.height) {
        (Some(width), Some(height)) => {
            let view_box = format!("0 0 {} {}", width, height);
            let width = width.to_string();
            let height = height.to_string();

            writer.write_event(Event::Start(BytesStart::new("svg").with_attributes([
                ("version", "1.1"),
                ("xmlns", "http://www.w3.org/2000/svg"),
                ("xmlns:xlink", "http://www.w3.org/1999/xlink"),
                ("width", "100%"),
                ("height", "100%"),
                ("viewBox", view_box.as_str()),
                ("preserveAspectRatio", "xMidYMid meet"),
            ])))?;
            writer.write_event(Event::Empty(BytesStart::new("image").with_attributes([
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("xlink:href", cover.uri.as_str()),
            ])))?;
            writer.write_event(Event::End(BytesEnd::new("svg")))?;
        }

        _ => {
            writer.write_event(Event::Empty(BytesStart::new("img").with_attributes([
                ("src", cover.uri.as_str()),
                ("alt", "Cover"),
            ])))?;
        }
    }

    Page::end(&mut writer)?;

    Ok(writer.into_inner().into_inner())
}

/// Generate the encryption manifest listing every obfuscation target
///
/// Callers must not invoke this with an empty target list; an empty
/// obfuscation set is expressed by the absence of the manifest file.
pub(crate) fn encryption_xml(uris: &[String]) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("encryption").with_attributes([
        ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
        ("xmlns:enc", "http://www.w3.org/2001/04/xmlenc#"),
    ])))?;

    for uri in uris {
        writer.write_event(Event::Start(BytesStart::new("enc:EncryptedData")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("enc:EncryptionMethod")
                .with_attributes([("Algorithm", obfuscation::IDPF_ALGORITHM)]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("enc:CipherData")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("enc:CipherReference").with_attributes([("URI", uri.as_str())]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("enc:CipherData")))?;
        writer.write_event(Event::End(BytesEnd::new("enc:EncryptedData")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("encryption")))?;

    Ok(writer.into_inner().into_inner())
}

/// Write one element whose content is a single escaped text node
fn write_text_element(
    writer: &mut XmlWriter,
    tag: &str,
    text: &str,
    attributes: &[(&str, &str)],
) -> Result<(), EpubError> {
    writer.write_event(Event::Start(
        BytesStart::new(tag).with_attributes(attributes.iter().copied()),
    ))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;

    Ok(())
}
