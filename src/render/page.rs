//! Page frame renderer
//!
//! Every generated content document shares the same XHTML frame: an
//! XML declaration, the `html` element with its namespace and language,
//! a `head` carrying the title and the optional stylesheet link, and a
//! `body` that the caller fills. [Page] writes the frame; chapter and
//! cover generators write what goes between `begin` and `end`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{error::EpubError, render::XmlWriter};

pub(crate) struct Page<'a> {
    title: &'a str,
    language: &'a str,
    stylesheet: Option<&'a str>,
}

impl<'a> Page<'a> {
    pub fn new(title: &'a str, language: &'a str) -> Self {
        Page {
            title,
            language,
            stylesheet: None,
        }
    }

    /// Link a stylesheet from the page head; the href is relative to
    /// the content root
    pub fn with_stylesheet(mut self, href: Option<&'a str>) -> Self {
        self.stylesheet = href;
        self
    }

    /// Write the page header: declaration, `html`, `head` and the
    /// opening `body` tag
    pub fn begin(&self, writer: &mut XmlWriter) -> Result<(), EpubError> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
            ("xmlns", "http://www.w3.org/1999/xhtml"),
            ("xml:lang", self.language),
        ])))?;

        writer.write_event(Event::Start(BytesStart::new("head")))?;
        writer.write_event(Event::Start(BytesStart::new("title")))?;
        writer.write_event(Event::Text(BytesText::new(self.title)))?;
        writer.write_event(Event::End(BytesEnd::new("title")))?;

        if let Some(href) = self.stylesheet {
            writer.write_event(Event::Empty(BytesStart::new("link").with_attributes([
                ("href", href),
                ("type", "text/css"),
                ("rel", "stylesheet"),
            ])))?;
        }

        writer.write_event(Event::End(BytesEnd::new("head")))?;
        writer.write_event(Event::Start(BytesStart::new("body")))?;

        Ok(())
    }

    /// Close the `body` and `html` elements opened by [Page::begin]
    pub fn end(writer: &mut XmlWriter) -> Result<(), EpubError> {
        writer.write_event(Event::End(BytesEnd::new("body")))?;
        writer.write_event(Event::End(BytesEnd::new("html")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use quick_xml::Writer;

    use super::Page;
    use crate::utils::XmlReader;

    #[test]
    fn test_page_frame_is_well_formed() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let page = Page::new("A <Title> & More", "en").with_stylesheet(Some("style/main.css"));
        page.begin(&mut writer).unwrap();
        Page::end(&mut writer).unwrap();

        let bytes = writer.into_inner().into_inner();
        let root = XmlReader::parse_bytes(bytes, "page.xhtml").unwrap();

        assert_eq!(root.name, "html");
        assert_eq!(root.attr("xml:lang"), Some("en"));

        let title = root.descendants("title");
        assert_eq!(title[0].text_content(), "A <Title> & More");

        let link = root.descendants("link");
        assert_eq!(link[0].attr("href"), Some("style/main.css"));
    }

    #[test]
    fn test_page_without_stylesheet_has_no_link() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let page = Page::new("Plain", "de");
        page.begin(&mut writer).unwrap();
        Page::end(&mut writer).unwrap();

        let bytes = writer.into_inner().into_inner();
        let root = XmlReader::parse_bytes(bytes, "page.xhtml").unwrap();
        assert!(root.descendants("link").is_empty());
    }
}
