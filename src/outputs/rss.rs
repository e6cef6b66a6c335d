//! RSS 2.0 serialization.
//!
//! The output is indented UTF-8 XML. Newlines inside text are written as
//! character references (`&#xA;`) so that multi-line entry bodies survive
//! readers that normalize whitespace. Text holding a character XML 1.0 cannot
//! represent (C0 controls other than tab, LF and CR, or U+FFFE/U+FFFF) is
//! refused rather than written as a malformed document.
//!
//! # Output Structure
//!
//! ```text
//! <rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
//!   <channel>
//!     <title/> <link/> <description/> <lastBuildDate/> <atom:link/>
//!     <item> <title/> <pubDate/> <description/> </item>
//!     …
//!   </channel>
//! </rss>
//! ```

use crate::error::RunError;
use crate::models::{FeedDocument, FeedEntry};
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;
use tracing::{debug, instrument};

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn xml_err(e: impl std::fmt::Display) -> RunError {
    RunError::Serialize(e.to_string())
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{fffe}' && c != '\u{ffff}')
}

fn check_xml_text<'a>(element: &str, text: &'a str) -> Result<&'a str, RunError> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(bad) => Err(RunError::Serialize(format!(
            "<{element}> contains U+{:04X}, which XML cannot represent",
            bad as u32
        ))),
        None => Ok(text),
    }
}

/// Escape markup characters and turn line breaks into character references.
fn escape_text(text: &str) -> String {
    escape(text).replace('\r', "&#xD;").replace('\n', "&#xA;")
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), RunError> {
    let text = check_xml_text(name, text)?;
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped(escape_text(text))))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn write_entry(writer: &mut XmlWriter, entry: &FeedEntry) -> Result<(), RunError> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .map_err(xml_err)?;
    text_element(writer, "title", &entry.title)?;
    text_element(writer, "pubDate", &entry.published.to_rfc2822())?;
    text_element(writer, "description", &entry.body)?;
    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .map_err(xml_err)?;
    Ok(())
}

/// Serialize a feed document to RSS 2.0 bytes.
///
/// # Errors
///
/// [`RunError::Serialize`] if any text holds a character XML cannot
/// represent, or if the XML writer fails.
#[instrument(level = "info", skip_all, fields(entries = feed.entries.len()))]
pub fn render_rss(feed: &FeedDocument) -> Result<Vec<u8>, RunError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("rss").with_attributes([("version", "2.0"), ("xmlns:atom", ATOM_NAMESPACE)]),
        ))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .map_err(xml_err)?;

    text_element(&mut writer, "title", &feed.title)?;
    text_element(&mut writer, "link", feed.link.href.as_str())?;
    text_element(&mut writer, "description", &feed.description)?;
    text_element(&mut writer, "lastBuildDate", &feed.last_updated.to_rfc2822())?;

    let length = feed.link.length.to_string();
    for value in [&feed.link.relationship, &feed.link.media_type, &feed.link.title] {
        check_xml_text("atom:link", value)?;
    }
    writer
        .write_event(Event::Empty(BytesStart::new("atom:link").with_attributes([
            ("href", feed.link.href.as_str()),
            ("rel", feed.link.relationship.as_str()),
            ("type", feed.link.media_type.as_str()),
            ("title", feed.link.title.as_str()),
            ("length", length.as_str()),
        ])))
        .map_err(xml_err)?;

    for entry in &feed.entries {
        write_entry(&mut writer, entry)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .map_err(xml_err)?;

    let bytes = writer.into_inner().into_inner();
    debug!(bytes = bytes.len(), "Rendered RSS document");
    Ok(bytes)
}
