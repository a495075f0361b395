//! JSON on either side of the event stream.
//!
//! The grammar itself belongs to `serde_json`; this module only maps between
//! `serde_json::Value` and events.

use std::io::{Read, Write};

use base64::Engine;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Serializer, Value};

use crate::{
    ArrayBuffer, ArrayType, CONCISE_ENCODING_VERSION, ConvertError, Event, EventReceiver, Format,
    Result,
};

/// Parse one JSON document and replay it as events. Object members keep
/// their document order.
pub fn decode_json<R: Read>(reader: R, receiver: &mut dyn EventReceiver) -> Result<()> {
    let value: Value = serde_json::from_reader(reader)?;
    receiver.on_event(Event::BeginDocument)?;
    receiver.on_event(Event::Version(CONCISE_ENCODING_VERSION))?;
    emit_value(&value, receiver)?;
    receiver.on_event(Event::EndDocument)
}

fn emit_value(value: &Value, receiver: &mut dyn EventReceiver) -> Result<()> {
    match value {
        Value::Null => receiver.on_event(Event::Null),
        Value::Bool(value) => receiver.on_event(Event::Bool(*value)),
        Value::Number(number) => receiver.on_event(number_event(number)),
        Value::String(text) => receiver.on_event(Event::string(text.as_str())),
        Value::Array(items) => {
            receiver.on_event(Event::List)?;
            for item in items {
                emit_value(item, receiver)?;
            }
            receiver.on_event(Event::End)
        }
        Value::Object(members) => {
            receiver.on_event(Event::Map)?;
            for (key, value) in members {
                receiver.on_event(Event::string(key.as_str()))?;
                emit_value(value, receiver)?;
            }
            receiver.on_event(Event::End)
        }
    }
}

fn number_event(number: &Number) -> Event<'static> {
    if let Some(value) = number.as_u64() {
        Event::Uint(value)
    } else if let Some(value) = number.as_i64() {
        Event::Int(value)
    } else if let Some(value) = number.as_f64() {
        Event::Float(value)
    } else {
        Event::BigFloat(number.to_string().into())
    }
}

enum Frame {
    List(Vec<Value>),
    Map {
        members: Map<String, Value>,
        key: Option<String>,
    },
}

/// Builds a JSON value from events and writes it once the document ends.
pub struct JsonEncoder<W: Write> {
    output: W,
    indent_spaces: usize,
    stack: Vec<Frame>,
    root: Option<Value>,
    array: ArrayBuffer,
}

impl<W: Write> JsonEncoder<W> {
    pub fn new(output: W, indent_spaces: usize) -> Self {
        Self {
            output,
            indent_spaces,
            stack: Vec::new(),
            root: None,
            array: ArrayBuffer::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn add_value(&mut self, value: Value) -> Result<()> {
        match self.stack.last_mut() {
            None if self.root.is_some() => Err(ConvertError::InvalidEvents(
                "more than one top-level value".to_string(),
            )),
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(Frame::List(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Map { members, key }) => {
                match key.take() {
                    Some(key) => {
                        members.insert(key, value);
                    }
                    None => *key = Some(member_name(value)),
                }
                Ok(())
            }
        }
    }

    fn add_array(&mut self, array_type: ArrayType, data: Vec<u8>) -> Result<()> {
        let text = if array_type.is_textual() {
            String::from_utf8(data).map_err(|err| err.utf8_error())?
        } else {
            base64::engine::general_purpose::STANDARD.encode(&data)
        };
        self.add_value(Value::String(text))
    }

    fn close_container(&mut self) -> Result<()> {
        let value = match self.stack.pop() {
            Some(Frame::List(items)) => Value::Array(items),
            Some(Frame::Map { members, key: None }) => Value::Object(members),
            Some(Frame::Map { key: Some(key), .. }) => {
                return Err(ConvertError::InvalidEvents(format!(
                    "map key {:?} has no value",
                    key
                )));
            }
            None => {
                return Err(ConvertError::InvalidEvents(
                    "end of container at top level".to_string(),
                ));
            }
        };
        self.add_value(value)
    }

    fn finish(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(ConvertError::InvalidEvents(format!(
                "document ended with {} open containers",
                self.stack.len()
            )));
        }
        let root = self
            .root
            .take()
            .ok_or_else(|| ConvertError::InvalidEvents("document has no value".to_string()))?;

        if self.indent_spaces == 0 {
            serde_json::to_writer(&mut self.output, &root)?;
        } else {
            let indent = " ".repeat(self.indent_spaces);
            let formatter = PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = Serializer::with_formatter(&mut self.output, formatter);
            root.serialize(&mut serializer)?;
        }
        self.output.flush()?;
        Ok(())
    }
}

/// JSON object keys must be strings; anything else is spelled out.
fn member_name(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn unsupported(event: &Event<'_>) -> ConvertError {
    ConvertError::UnsupportedConstruct {
        kind: event.kind(),
        destination: Format::Json,
    }
}

impl<W: Write> EventReceiver for JsonEncoder<W> {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::BeginDocument | Event::Version(_) => Ok(()),
            Event::Null => self.add_value(Value::Null),
            Event::Bool(value) => self.add_value(Value::Bool(value)),
            Event::Int(value) => self.add_value(Value::from(value)),
            Event::Uint(value) => self.add_value(Value::from(value)),
            Event::Float(value) => match Number::from_f64(value) {
                Some(number) => self.add_value(Value::Number(number)),
                None => Err(unsupported(&event)),
            },
            Event::BigInt { .. }
            | Event::BigFloat(_)
            | Event::DecimalFloat { .. }
            | Event::Uid(_)
            | Event::Timestamp(_) => {
                let text = event.scalar_text().unwrap_or_default();
                self.add_value(Value::String(text))
            }
            Event::Array { array_type, data } => self.add_array(array_type, data.into_owned()),
            Event::ArrayBegin(array_type) => {
                self.array.begin(array_type);
                Ok(())
            }
            Event::ArrayChunk {
                length,
                more_chunks,
            } => match self.array.chunk(length, more_chunks)? {
                Some((array_type, data)) => self.add_array(array_type, data),
                None => Ok(()),
            },
            Event::ArrayData(data) => match self.array.data(&data)? {
                Some((array_type, data)) => self.add_array(array_type, data),
                None => Ok(()),
            },
            Event::List => {
                self.stack.push(Frame::List(Vec::new()));
                Ok(())
            }
            Event::Map => {
                self.stack.push(Frame::Map {
                    members: Map::new(),
                    key: None,
                });
                Ok(())
            }
            Event::End => self.close_container(),
            Event::EndDocument => self.finish(),
            other => Err(unsupported(&other)),
        }
    }
}
