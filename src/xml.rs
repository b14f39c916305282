//! Small helpers for writing the XML documents the build service accepts.

use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::ObsError;

/// Incremental writer for indented XML documents.
pub struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// Opens `<name attrs...>`.
    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start))?;
        Ok(self)
    }

    /// Closes `</name>`.
    pub fn close(&mut self, name: &str) -> Result<&mut Self> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    /// Writes `<name attrs.../>`.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(start))?;
        Ok(self)
    }

    /// Writes `<name>text</name>`, escaping the text. Empty text gives `<name/>`.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self> {
        if text.is_empty() {
            self.writer.write_event(Event::Empty(BytesStart::new(name)))?;
            return Ok(self);
        }
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    pub fn finish(self) -> String {
        String::from_utf8_lossy(&self.writer.into_inner()).into_owned()
    }
}

/// Unescaped value of attribute `key`; decoding failures are reported
/// against `subject`.
pub(crate) fn attribute(
    subject: &str,
    e: &BytesStart<'_>,
    key: &str,
) -> crate::Result<Option<String>> {
    let Some(attr) = e
        .try_get_attribute(key)
        .map_err(|err| ObsError::malformed(subject, err))?
    else {
        return Ok(None);
    };
    let value = attr
        .unescape_value()
        .map_err(|err| ObsError::malformed(subject, err))?;
    Ok(Some(value.into_owned()))
}
