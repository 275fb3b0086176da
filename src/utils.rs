use std::collections::HashMap;

#[cfg(test)]
use chrono::Local;
use quick_xml::{Reader, escape::unescape, events::Event};

use crate::error::EpubError;

/// Returns the current time with custom format
///
/// Used to name disposable scratch directories; the fractional-seconds
/// component keeps concurrent test runs from colliding.
#[cfg(test)]
pub(crate) fn local_time() -> String {
    Local::now().format("%Y-%m-%dT%H-%M-%S.%fU%z").to_string()
}

/// Guesses the media type of a file from its URI extension
///
/// This is the static lookup used when a resource omits an explicit
/// media type and its content cannot be sniffed. Unknown extensions map
/// to `application/octet-stream`.
pub fn media_type_for(uri: &str) -> &'static str {
    let extension = uri.rsplit('.').next().unwrap_or_default();

    match extension.to_ascii_lowercase().as_str() {
        "css" => "text/css",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "js" => "application/javascript",
        "ncx" => "application/x-dtbncx+xml",
        "opf" => "application/oebps-package+xml",
        "otf" => "application/x-font-opentype",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "ttf" => "application/x-font-truetype",
        "woff" => "application/font-woff",
        "woff2" => "font/woff2",
        "xhtml" | "xht" => "application/xhtml+xml",
        _ => "application/octet-stream",
    }
}

/// Refine a media type sniffed from file content
///
/// Content sniffing cannot distinguish XML dialects or plain-text
/// formats from each other, so the file extension settles those cases.
pub(crate) fn refine_media_type(sniffed: &str, extension: &str) -> String {
    match (sniffed, extension) {
        ("text/xml", "xhtml")
        | ("application/xml", "xhtml")
        | ("text/xml", "xht")
        | ("application/xml", "xht") => "application/xhtml+xml".to_string(),

        ("text/xml", "svg") | ("application/xml", "svg") | ("text/plain", "svg") => {
            "image/svg+xml".to_string()
        }

        ("text/plain", "css") => "text/css".to_string(),
        ("text/plain", "js") => "application/javascript".to_string(),

        _ => sniffed.to_string(),
    }
}

/// Represents an element node in an XML document
///
/// A deliberately small tree: element names are local names with any
/// namespace prefix stripped, attributes keep the name they were
/// written with. This is all the obfuscation subsystem needs to walk
/// the package files it reads back from the rendered tree.
#[derive(Debug)]
pub(crate) struct XmlElement {
    /// The local name of the element (excluding namespace prefix)
    pub name: String,

    /// The attributes of the element, keyed by attribute name
    pub attributes: HashMap<String, String>,

    /// The direct text content of the element
    pub text: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(name: String) -> Self {
        Self {
            name,
            attributes: HashMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Returns the value of the specified attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Collects every element with the specified local name,
    /// in document order, starting from this element
    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect_descendants(name, found);
        }
    }

    /// Gets the text content of the element and all its child elements,
    /// with leading and trailing whitespace removed
    pub fn text_content(&self) -> String {
        let mut result = String::new();

        if let Some(text) = &self.text {
            result.push_str(text);
        }
        for child in &self.children {
            result.push_str(&child.text_content());
        }

        result.trim().to_string()
    }
}

/// XML parser used to parse XML content and build an element tree
pub(crate) struct XmlReader {}

impl XmlReader {
    /// Parses an XML string and builds the root element
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    /// - `file`: The name reported when the document has no root element
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(EpubError)`: An error occurred during parsing
    pub fn parse(content: &str, file: &str) -> Result<XmlElement, EpubError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let mut element = XmlElement::new(name);

                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        element.attributes.insert(key, value);
                    }

                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        } else {
                            root = Some(element);
                        }
                    }
                }

                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let mut element = XmlElement::new(name);

                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        element.attributes.insert(key, value);
                    }

                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    } else {
                        // A document consisting of a single self-closing element
                        root = Some(element);
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let raw = String::from_utf8_lossy(e.as_ref()).to_string();
                        let text = unescape(&raw)
                            .map(|s| s.into_owned())
                            .unwrap_or_else(|_| raw.clone());
                        if !text.trim().is_empty() {
                            element.text = Some(text);
                        }
                    }
                }

                Err(err) => return Err(err.into()),

                // Declarations, comments, doctypes and processing
                // instructions carry nothing the callers look at
                _ => continue,
            }
        }

        root.ok_or(EpubError::MalformedXml {
            file: file.to_string(),
        })
    }

    /// Parse XML from raw bytes and build the root element
    pub fn parse_bytes(bytes: Vec<u8>, file: &str) -> Result<XmlElement, EpubError> {
        let content = String::from_utf8(bytes)?;
        Self::parse(&content, file)
    }
}

#[cfg(test)]
mod tests {
    use super::{XmlReader, media_type_for, refine_media_type};

    #[test]
    fn test_media_type_table() {
        assert_eq!(media_type_for("style/stylesheet.css"), "text/css");
        assert_eq!(media_type_for("fonts/Body.otf"), "application/x-font-opentype");
        assert_eq!(media_type_for("fonts/Body.WOFF"), "application/font-woff");
        assert_eq!(media_type_for("img/cover.jpg"), "image/jpeg");
        assert_eq!(media_type_for("binary.data"), "application/octet-stream");
        assert_eq!(media_type_for("no-extension"), "application/octet-stream");
    }

    #[test]
    fn test_refine_media_type() {
        assert_eq!(refine_media_type("text/xml", "xhtml"), "application/xhtml+xml");
        assert_eq!(refine_media_type("text/plain", "css"), "text/css");
        assert_eq!(refine_media_type("image/png", "png"), "image/png");
        assert_eq!(refine_media_type("text/plain", "unknown"), "text/plain");
    }

    #[test]
    fn test_parse_prefixed_elements_and_text() {
        let content = r#"<?xml version="1.0"?>
            <encryption xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
                <enc:EncryptedData>
                    <enc:CipherReference URI="OEBPS/fonts/a.otf"/>
                </enc:EncryptedData>
                <note>  trimmed text  </note>
            </encryption>"#;

        let root = XmlReader::parse(content, "encryption.xml").unwrap();
        assert_eq!(root.name, "encryption");

        let references = root.descendants("CipherReference");
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].attr("URI"), Some("OEBPS/fonts/a.otf"));

        let note = root.descendants("note");
        assert_eq!(note[0].text_content(), "trimmed text");
    }

    #[test]
    fn test_parse_identifier_lookup() {
        let content = r#"<package unique-identifier="pub-id" version="2.0">
                <metadata>
                    <dc:identifier id="pub-id" opf:scheme="uuid">abc-123</dc:identifier>
                    <dc:identifier id="isbn">978-3-16-148410-0</dc:identifier>
                </metadata>
            </package>"#;

        let root = XmlReader::parse(content, "content.opf").unwrap();
        assert_eq!(root.attr("unique-identifier"), Some("pub-id"));

        let identifier = root
            .descendants("identifier")
            .into_iter()
            .find(|element| element.attr("id") == Some("pub-id"))
            .unwrap();
        assert_eq!(identifier.text_content(), "abc-123");
    }

    #[test]
    fn test_parse_no_root() {
        let result = XmlReader::parse("   ", "empty.xml");
        assert!(result.is_err());
    }
}
