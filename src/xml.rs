//! Bridge between XML and the event stream.
//!
//! Decoding walks XML tokens and emits markup events: an element becomes
//! `Markup(name)`, its attributes as alternating key and value strings, an
//! `End` closing the attribute section, then the contents and a final `End`.
//! Encoding runs the reverse state machine, buffering attributes until the
//! attribute section ends so the start tag can be written in one piece.

use std::io::{BufRead, Write};

use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;
use tracing::debug;

use crate::{
    ArrayBuffer, ArrayType, CONCISE_ENCODING_VERSION, ConvertError, Event, EventReceiver, Format,
    Result,
};

/// Decode an XML document from `reader`, sending its events to `receiver`.
///
/// Everything before the first start tag (declaration, doctype, comments) is
/// skipped. Character data is trimmed and dropped when only whitespace
/// remains. Processing instructions and doctype declarations produce no
/// events.
pub fn decode_xml<R: BufRead>(reader: R, receiver: &mut dyn EventReceiver) -> Result<()> {
    let mut reader = NsReader::from_reader(reader);
    let mut buf = Vec::new();
    let mut in_document = false;
    let mut open_elements: Vec<String> = Vec::new();

    receiver.on_event(Event::BeginDocument)?;
    receiver.on_event(Event::Version(CONCISE_ENCODING_VERSION))?;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            XmlEvent::Eof => {
                if let Some(name) = open_elements.pop() {
                    let missing = IllFormedError::MissingEndTag(name);
                    return Err(quick_xml::Error::IllFormed(missing).into());
                }
                break;
            }
            XmlEvent::Start(ref start) | XmlEvent::Empty(ref start) => {
                in_document = true;
                let name = qualified_name(&reader, start.name(), false);
                receiver.on_event(Event::Markup(name.into()))?;
                for attribute in start.attributes() {
                    let attribute = attribute.map_err(quick_xml::Error::from)?;
                    let key = qualified_name(&reader, attribute.key, true);
                    let value = attribute.unescape_value()?;
                    receiver.on_event(Event::string(key))?;
                    receiver.on_event(Event::string(value))?;
                }
                receiver.on_event(Event::End)?;
                if matches!(event, XmlEvent::Empty(_)) {
                    receiver.on_event(Event::End)?;
                } else {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    open_elements.push(name);
                }
            }
            _ if !in_document => {}
            XmlEvent::End(_) => {
                open_elements.pop();
                receiver.on_event(Event::End)?;
            }
            XmlEvent::Text(text) => {
                let text = text.unescape()?;
                emit_character_data(&text, receiver)?;
            }
            XmlEvent::CData(data) => {
                let data = std::str::from_utf8(&data)?;
                emit_character_data(data, receiver)?;
            }
            XmlEvent::Comment(comment) => {
                let contents = std::str::from_utf8(&comment)?;
                receiver.on_event(Event::Comment { multiline: true })?;
                receiver.on_event(Event::string(contents))?;
                receiver.on_event(Event::End)?;
            }
            // Processing instructions, declarations and doctypes carry no events.
            _ => {}
        }
        buf.clear();
    }

    receiver.on_event(Event::EndDocument)
}

fn emit_character_data(text: &str, receiver: &mut dyn EventReceiver) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    receiver.on_event(Event::string(text))
}

/// Namespace and local part joined without a separator.
///
/// Element names use their resolved namespace (the default namespace
/// included); attributes only pick up a namespace through an explicit
/// prefix. An unbound prefix stands in for its namespace, and namespace
/// declarations keep `xmlns` as their namespace part.
fn qualified_name<R>(reader: &NsReader<R>, name: QName<'_>, is_attribute: bool) -> String {
    let raw = name.as_ref();
    if let Some(prefix) = raw.strip_prefix(b"xmlns:") {
        return format!("xmlns{}", String::from_utf8_lossy(prefix));
    }
    if raw == b"xmlns" {
        return "xmlns".to_string();
    }

    let (namespace, local) = if is_attribute {
        reader.resolve_attribute(name)
    } else {
        reader.resolve_element(name)
    };
    let mut qualified = match namespace {
        ResolveResult::Bound(namespace) => String::from_utf8_lossy(namespace.as_ref()).into_owned(),
        ResolveResult::Unknown(prefix) => String::from_utf8_lossy(&prefix).into_owned(),
        ResolveResult::Unbound => String::new(),
    };
    qualified.push_str(&String::from_utf8_lossy(local.as_ref()));
    qualified
}

/// What the next string or scalar means for the innermost open element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkupStage {
    /// Outside of any element.
    #[default]
    NonMarkup,
    AttributeKey,
    AttributeValue,
    Contents,
}

/// Writes an event stream as XML.
///
/// Only markup, strings, scalars and comments have an XML form. Lists, maps
/// and graph events fail with `UnsupportedConstruct`. The document must have
/// exactly one root element.
pub struct XmlEncoder<W: Write> {
    writer: Writer<W>,
    stage: MarkupStage,
    stack: Vec<String>,
    attributes: Vec<(String, String)>,
    pending_key: Option<String>,
    array: ArrayBuffer,
    comment: Option<String>,
    comment_depth: usize,
    root_closed: bool,
}

impl<W: Write> XmlEncoder<W> {
    /// Create an encoder; `indent_spaces > 0` pretty-prints nested elements.
    pub fn new(output: W, indent_spaces: usize) -> Self {
        let writer = if indent_spaces > 0 {
            Writer::new_with_indent(output, b' ', indent_spaces)
        } else {
            Writer::new(output)
        };
        Self {
            writer,
            stage: MarkupStage::NonMarkup,
            stack: Vec::new(),
            attributes: Vec::new(),
            pending_key: None,
            array: ArrayBuffer::new(),
            comment: None,
            comment_depth: 0,
            root_closed: false,
        }
    }

    pub fn stage(&self) -> MarkupStage {
        self.stage
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn on_markup(&mut self, name: &str) -> Result<()> {
        match self.stage {
            MarkupStage::AttributeKey | MarkupStage::AttributeValue => {
                return Err(ConvertError::InvalidEvents(format!(
                    "markup <{}> used as an attribute",
                    name
                )));
            }
            MarkupStage::NonMarkup if self.root_closed => {
                return Err(ConvertError::InvalidEvents(format!(
                    "second root element <{}>",
                    name
                )));
            }
            MarkupStage::NonMarkup | MarkupStage::Contents => {}
        }
        self.stack.push(name.to_string());
        self.attributes.clear();
        self.stage = MarkupStage::AttributeKey;
        Ok(())
    }

    fn on_string(&mut self, text: String) -> Result<()> {
        if let Some(comment) = self.comment.as_mut() {
            comment.push_str(&text);
            return Ok(());
        }

        match self.stage {
            MarkupStage::AttributeKey => {
                self.pending_key = Some(text);
                self.stage = MarkupStage::AttributeValue;
            }
            MarkupStage::AttributeValue => {
                let key = self.pending_key.take().unwrap_or_default();
                self.attributes.push((key, text));
                self.stage = MarkupStage::AttributeKey;
            }
            MarkupStage::Contents => {
                self.writer
                    .write_event(XmlEvent::Text(BytesText::new(&text)))?;
            }
            MarkupStage::NonMarkup => {
                return Err(ConvertError::InvalidEvents(
                    "non-markup content at document top level".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn on_array(&mut self, array_type: ArrayType, data: Vec<u8>) -> Result<()> {
        if !matches!(array_type, ArrayType::String | ArrayType::ResourceId) {
            return Err(self.unsupported(Event::ArrayBegin(array_type)));
        }
        let text = String::from_utf8(data).map_err(|err| err.utf8_error())?;
        self.on_string(text)
    }

    fn on_comment(&mut self) {
        self.comment_depth += 1;
        if self.comment.is_none() {
            self.comment = Some(String::new());
        }
    }

    fn on_end(&mut self) -> Result<()> {
        if self.comment_depth > 0 {
            self.comment_depth -= 1;
            if self.comment_depth == 0 {
                let comment = self.comment.take().unwrap_or_default();
                if comment.contains("--") || comment.ends_with('-') {
                    return Err(ConvertError::InvalidEvents(format!(
                        "comment {:?} cannot be written as XML",
                        comment
                    )));
                }
                self.writer
                    .write_event(XmlEvent::Comment(BytesText::from_escaped(comment)))?;
            }
            return Ok(());
        }

        match self.stage {
            MarkupStage::AttributeKey => {
                let name = self.current_markup_name()?;
                let mut start = BytesStart::new(name);
                for (key, value) in &self.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                self.writer.write_event(XmlEvent::Start(start))?;
                self.attributes.clear();
                self.stage = MarkupStage::Contents;
            }
            MarkupStage::Contents => {
                let name = self.current_markup_name()?;
                self.writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
                self.stack.pop();
                if self.stack.is_empty() {
                    self.root_closed = true;
                    self.stage = MarkupStage::NonMarkup;
                }
            }
            MarkupStage::AttributeValue => {
                return Err(ConvertError::InvalidEvents(format!(
                    "attribute {:?} has no value",
                    self.pending_key.as_deref().unwrap_or_default()
                )));
            }
            MarkupStage::NonMarkup => {
                return Err(ConvertError::InvalidEvents(
                    "end of container outside of markup".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn on_end_document(&mut self) -> Result<()> {
        if let Some(name) = self.stack.last() {
            return Err(ConvertError::InvalidEvents(format!(
                "document ended inside <{}>",
                name
            )));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn current_markup_name(&self) -> Result<String> {
        self.stack.last().cloned().ok_or_else(|| {
            ConvertError::InvalidEvents("end of container without open markup".to_string())
        })
    }

    fn unsupported(&self, event: Event<'_>) -> ConvertError {
        debug!(stage = ?self.stage, depth = self.stack.len(), "rejecting {}", event.kind());
        ConvertError::UnsupportedConstruct {
            kind: event.kind(),
            destination: Format::Xml,
        }
    }
}

impl<W: Write> EventReceiver for XmlEncoder<W> {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        if let Some(text) = event.scalar_text() {
            return self.on_string(text);
        }

        match event {
            Event::BeginDocument => Ok(()),
            Event::Version(_) => {
                self.stage = MarkupStage::NonMarkup;
                Ok(())
            }
            Event::Markup(name) => {
                if self.comment.is_some() {
                    return Err(self.unsupported(Event::Markup(name)));
                }
                self.on_markup(&name)
            }
            Event::Comment { .. } => {
                self.on_comment();
                Ok(())
            }
            Event::End => self.on_end(),
            Event::Array { array_type, data } => self.on_array(array_type, data.into_owned()),
            Event::ArrayBegin(array_type) => {
                if !matches!(array_type, ArrayType::String | ArrayType::ResourceId) {
                    return Err(self.unsupported(event));
                }
                self.array.begin(array_type);
                Ok(())
            }
            Event::ArrayChunk {
                length,
                more_chunks,
            } => match self.array.chunk(length, more_chunks)? {
                Some((array_type, data)) => self.on_array(array_type, data),
                None => Ok(()),
            },
            Event::ArrayData(data) => match self.array.data(&data)? {
                Some((array_type, data)) => self.on_array(array_type, data),
                None => Ok(()),
            },
            Event::EndDocument => self.on_end_document(),
            other => Err(self.unsupported(other)),
        }
    }
}
