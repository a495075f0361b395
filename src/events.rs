//! Structural events shared by every decoder and encoder.
//!
//! A decoder visits a document tree and emits a flat, well-nested sequence of
//! [`Event`]s; an encoder implements [`EventReceiver`] and acts on each event as
//! it arrives. Containers (lists, maps, markup, comments, edges, structs) open
//! with their own event and close with [`Event::End`]. Markup is closed twice:
//! once after its attributes and once after its contents.
//!
//! ```text
//! <r k="v">hi</r>
//!
//! Markup("r")
//! String("k")
//! String("v")
//! End            // attributes done
//! String("hi")
//! End            // contents done
//! ```

use std::borrow::Cow;
use std::fmt;
use std::mem;

use crate::{ConvertError, Result};

/// Version announced by decoders right after `BeginDocument`.
pub const CONCISE_ENCODING_VERSION: u64 = 1;

/// Element type of an array event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayType {
    String,
    ResourceId,
    CustomText,
    CustomBinary,
    Uint8,
}

impl ArrayType {
    /// True for array types whose payload is UTF-8 text.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            ArrayType::String | ArrayType::ResourceId | ArrayType::CustomText
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ArrayType::String => "string",
            ArrayType::ResourceId => "resource ID",
            ArrayType::CustomText => "custom text",
            ArrayType::CustomBinary => "custom binary",
            ArrayType::Uint8 => "uint8",
        }
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A calendar timestamp with nanosecond precision and a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
    /// Offset from UTC in minutes; 0 renders as `Z`.
    pub offset_minutes: i16,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.nanosecond > 0 {
            let fraction = format!("{:09}", self.nanosecond);
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        if self.offset_minutes == 0 {
            return f.write_str("Z");
        }
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let offset = self.offset_minutes.unsigned_abs();
        write!(f, "{}{:02}:{:02}", sign, offset / 60, offset % 60)
    }
}

/// One step of a document visit.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<'a> {
    BeginDocument,
    Version(u64),
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    /// Arbitrary-size integer as a big-endian magnitude.
    BigInt {
        negative: bool,
        magnitude: Cow<'a, [u8]>,
    },
    Float(f64),
    /// Arbitrary-precision float in canonical decimal notation.
    BigFloat(Cow<'a, str>),
    /// `significand * 10^exponent`
    DecimalFloat {
        significand: i64,
        exponent: i32,
    },
    Nan {
        signaling: bool,
    },
    Uid([u8; 16]),
    Timestamp(Timestamp),
    /// Start of a chunked array; followed by chunk/data pairs.
    ArrayBegin(ArrayType),
    ArrayChunk {
        length: u64,
        more_chunks: bool,
    },
    ArrayData(Cow<'a, [u8]>),
    /// A complete array delivered in one piece.
    Array {
        array_type: ArrayType,
        data: Cow<'a, [u8]>,
    },
    List,
    Map,
    Markup(Cow<'a, str>),
    Comment {
        multiline: bool,
    },
    Edge,
    StructTemplate(Cow<'a, str>),
    StructInstance(Cow<'a, str>),
    End,
    Marker(Cow<'a, str>),
    Reference(Cow<'a, str>),
    ResourceIdReference,
    Constant(Cow<'a, str>),
    Na,
    EndDocument,
}

/// Payload-free discriminant of an [`Event`], carried by errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BeginDocument,
    Version,
    Null,
    Bool,
    Int,
    Uint,
    BigInt,
    Float,
    BigFloat,
    DecimalFloat,
    Nan,
    Uid,
    Timestamp,
    Array(ArrayType),
    ArrayChunk,
    ArrayData,
    List,
    Map,
    Markup,
    Comment,
    Edge,
    StructTemplate,
    StructInstance,
    End,
    Marker,
    Reference,
    ResourceIdReference,
    Constant,
    Na,
    EndDocument,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Array(array_type) => return write!(f, "{} array", array_type),
            EventKind::BeginDocument => "begin document",
            EventKind::Version => "version",
            EventKind::Null => "null",
            EventKind::Bool => "boolean",
            EventKind::Int | EventKind::Uint => "integer",
            EventKind::BigInt => "big integer",
            EventKind::Float => "float",
            EventKind::BigFloat => "big float",
            EventKind::DecimalFloat => "decimal float",
            EventKind::Nan => "NaN",
            EventKind::Uid => "UID",
            EventKind::Timestamp => "timestamp",
            EventKind::ArrayChunk => "array chunk",
            EventKind::ArrayData => "array data",
            EventKind::List => "list",
            EventKind::Map => "map",
            EventKind::Markup => "markup",
            EventKind::Comment => "comment",
            EventKind::Edge => "edge",
            EventKind::StructTemplate => "struct template",
            EventKind::StructInstance => "struct instance",
            EventKind::End => "end of container",
            EventKind::Marker => "marker",
            EventKind::Reference => "reference",
            EventKind::ResourceIdReference => "resource ID reference",
            EventKind::Constant => "constant",
            EventKind::Na => "NA",
            EventKind::EndDocument => "end document",
        };
        f.write_str(name)
    }
}

impl<'a> Event<'a> {
    /// A complete string array.
    pub fn string(text: impl Into<Cow<'a, str>>) -> Self {
        let data = match text.into() {
            Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
            Cow::Owned(text) => Cow::Owned(text.into_bytes()),
        };
        Event::Array {
            array_type: ArrayType::String,
            data,
        }
    }

    pub fn markup(name: impl Into<Cow<'a, str>>) -> Self {
        Event::Markup(name.into())
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::BeginDocument => EventKind::BeginDocument,
            Event::Version(_) => EventKind::Version,
            Event::Null => EventKind::Null,
            Event::Bool(_) => EventKind::Bool,
            Event::Int(_) => EventKind::Int,
            Event::Uint(_) => EventKind::Uint,
            Event::BigInt { .. } => EventKind::BigInt,
            Event::Float(_) => EventKind::Float,
            Event::BigFloat(_) => EventKind::BigFloat,
            Event::DecimalFloat { .. } => EventKind::DecimalFloat,
            Event::Nan { .. } => EventKind::Nan,
            Event::Uid(_) => EventKind::Uid,
            Event::Timestamp(_) => EventKind::Timestamp,
            Event::ArrayBegin(array_type) => EventKind::Array(*array_type),
            Event::ArrayChunk { .. } => EventKind::ArrayChunk,
            Event::ArrayData(_) => EventKind::ArrayData,
            Event::Array { array_type, .. } => EventKind::Array(*array_type),
            Event::List => EventKind::List,
            Event::Map => EventKind::Map,
            Event::Markup(_) => EventKind::Markup,
            Event::Comment { .. } => EventKind::Comment,
            Event::Edge => EventKind::Edge,
            Event::StructTemplate(_) => EventKind::StructTemplate,
            Event::StructInstance(_) => EventKind::StructInstance,
            Event::End => EventKind::End,
            Event::Marker(_) => EventKind::Marker,
            Event::Reference(_) => EventKind::Reference,
            Event::ResourceIdReference => EventKind::ResourceIdReference,
            Event::Constant(_) => EventKind::Constant,
            Event::Na => EventKind::Na,
            Event::EndDocument => EventKind::EndDocument,
        }
    }

    /// True for events that must later be matched by [`Event::End`].
    pub fn opens_container(&self) -> bool {
        matches!(
            self,
            Event::List
                | Event::Map
                | Event::Markup(_)
                | Event::Comment { .. }
                | Event::Edge
                | Event::StructTemplate(_)
                | Event::StructInstance(_)
        )
    }

    /// Textual rendering of a non-array scalar, as used by text-based
    /// destinations. Returns `None` for events that are not scalars.
    pub fn scalar_text(&self) -> Option<String> {
        let text = match self {
            Event::Null => "null".to_string(),
            Event::Bool(true) => "true".to_string(),
            Event::Bool(false) => "false".to_string(),
            Event::Int(value) => value.to_string(),
            Event::Uint(value) => value.to_string(),
            Event::BigInt {
                negative,
                magnitude,
            } => big_int_to_decimal(*negative, magnitude),
            Event::Float(value) if value.is_nan() => "nan".to_string(),
            Event::Float(value) => value.to_string(),
            Event::BigFloat(text) => text.to_string(),
            Event::DecimalFloat {
                significand,
                exponent,
            } => decimal_float_to_string(*significand, *exponent),
            Event::Nan { signaling: true } => "snan".to_string(),
            Event::Nan { signaling: false } => "nan".to_string(),
            Event::Uid(uid) => hex::encode(uid),
            Event::Timestamp(timestamp) => timestamp.to_string(),
            _ => return None,
        };
        Some(text)
    }

    /// Detach the event from the buffer it borrows from.
    pub fn into_owned(self) -> Event<'static> {
        fn owned<T: ToOwned + ?Sized>(value: Cow<'_, T>) -> Cow<'static, T> {
            Cow::Owned(value.into_owned())
        }

        match self {
            Event::BeginDocument => Event::BeginDocument,
            Event::Version(version) => Event::Version(version),
            Event::Null => Event::Null,
            Event::Bool(value) => Event::Bool(value),
            Event::Int(value) => Event::Int(value),
            Event::Uint(value) => Event::Uint(value),
            Event::BigInt {
                negative,
                magnitude,
            } => Event::BigInt {
                negative,
                magnitude: owned(magnitude),
            },
            Event::Float(value) => Event::Float(value),
            Event::BigFloat(text) => Event::BigFloat(owned(text)),
            Event::DecimalFloat {
                significand,
                exponent,
            } => Event::DecimalFloat {
                significand,
                exponent,
            },
            Event::Nan { signaling } => Event::Nan { signaling },
            Event::Uid(uid) => Event::Uid(uid),
            Event::Timestamp(timestamp) => Event::Timestamp(timestamp),
            Event::ArrayBegin(array_type) => Event::ArrayBegin(array_type),
            Event::ArrayChunk {
                length,
                more_chunks,
            } => Event::ArrayChunk {
                length,
                more_chunks,
            },
            Event::ArrayData(data) => Event::ArrayData(owned(data)),
            Event::Array { array_type, data } => Event::Array {
                array_type,
                data: owned(data),
            },
            Event::List => Event::List,
            Event::Map => Event::Map,
            Event::Markup(name) => Event::Markup(owned(name)),
            Event::Comment { multiline } => Event::Comment { multiline },
            Event::Edge => Event::Edge,
            Event::StructTemplate(id) => Event::StructTemplate(owned(id)),
            Event::StructInstance(id) => Event::StructInstance(owned(id)),
            Event::End => Event::End,
            Event::Marker(id) => Event::Marker(owned(id)),
            Event::Reference(id) => Event::Reference(owned(id)),
            Event::ResourceIdReference => Event::ResourceIdReference,
            Event::Constant(name) => Event::Constant(owned(name)),
            Event::Na => Event::Na,
            Event::EndDocument => Event::EndDocument,
        }
    }
}

/// Consumer side of an event stream. Every encoder implements this.
pub trait EventReceiver {
    fn on_event(&mut self, event: Event<'_>) -> Result<()>;
}

impl<R: EventReceiver + ?Sized> EventReceiver for &mut R {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        (**self).on_event(event)
    }
}

/// Records the stream; mostly useful in tests and for buffering a document.
impl EventReceiver for Vec<Event<'static>> {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        self.push(event.into_owned());
        Ok(())
    }
}

/// Accepts and drops every event.
#[derive(Debug, Default)]
pub struct Discard;

impl EventReceiver for Discard {
    fn on_event(&mut self, _event: Event<'_>) -> Result<()> {
        Ok(())
    }
}

/// Collects a chunked array into one value.
///
/// Cleared on `ArrayBegin`; yields the full payload once the declared chunk
/// length is used up and no further chunk was announced.
#[derive(Debug, Default)]
pub struct ArrayBuffer {
    array_type: Option<ArrayType>,
    buffer: Vec<u8>,
    remaining: u64,
    more_chunks: bool,
}

impl ArrayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.array_type.is_some()
    }

    pub fn begin(&mut self, array_type: ArrayType) {
        self.array_type = Some(array_type);
        self.buffer.clear();
        self.remaining = 0;
        self.more_chunks = true;
    }

    /// Announce the next chunk. A final empty chunk completes the array.
    pub fn chunk(&mut self, length: u64, more_chunks: bool) -> Result<Option<(ArrayType, Vec<u8>)>> {
        if !self.is_active() {
            return Err(ConvertError::InvalidEvents(
                "array chunk outside of an array".to_string(),
            ));
        }
        if self.remaining > 0 {
            return Err(ConvertError::InvalidEvents(format!(
                "new array chunk with {} bytes of the previous chunk outstanding",
                self.remaining
            )));
        }
        self.remaining = length;
        self.more_chunks = more_chunks;
        Ok(self.take_if_complete())
    }

    pub fn data(&mut self, data: &[u8]) -> Result<Option<(ArrayType, Vec<u8>)>> {
        if !self.is_active() {
            return Err(ConvertError::InvalidEvents(
                "array data outside of an array".to_string(),
            ));
        }
        let length = data.len() as u64;
        if length > self.remaining {
            return Err(ConvertError::InvalidEvents(format!(
                "array data of {} bytes exceeds the {} bytes left in the chunk",
                length, self.remaining
            )));
        }
        self.buffer.extend_from_slice(data);
        self.remaining -= length;
        Ok(self.take_if_complete())
    }

    fn take_if_complete(&mut self) -> Option<(ArrayType, Vec<u8>)> {
        if self.remaining > 0 || self.more_chunks {
            return None;
        }
        let array_type = self.array_type.take()?;
        Some((array_type, mem::take(&mut self.buffer)))
    }
}

/// Decimal rendering of a big-endian magnitude.
fn big_int_to_decimal(negative: bool, magnitude: &[u8]) -> String {
    let mut bytes: Vec<u8> = magnitude
        .iter()
        .copied()
        .skip_while(|byte| *byte == 0)
        .collect();
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while !bytes.is_empty() {
        let mut remainder = 0u32;
        for byte in bytes.iter_mut() {
            let value = (remainder << 8) | u32::from(*byte);
            *byte = (value / 10) as u8;
            remainder = value % 10;
        }
        digits.push(char::from(b'0' + remainder as u8));
        let leading_zeros = bytes.iter().take_while(|byte| **byte == 0).count();
        bytes.drain(..leading_zeros);
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

// Beyond this many fraction digits the value is written in exponent form.
const MAX_FRACTION_DIGITS: usize = 32;

fn decimal_float_to_string(significand: i64, exponent: i32) -> String {
    if exponent == 0 || significand == 0 {
        return significand.to_string();
    }
    if exponent > 0 {
        return format!("{}e{}", significand, exponent);
    }

    let digits = significand.unsigned_abs().to_string();
    let shift = exponent.unsigned_abs() as usize;
    let sign = if significand < 0 { "-" } else { "" };
    if shift > MAX_FRACTION_DIGITS {
        return format!("{}e{}", significand, exponent);
    }
    if digits.len() > shift {
        let (whole, fraction) = digits.split_at(digits.len() - shift);
        format!("{}{}.{}", sign, whole, fraction)
    } else {
        format!("{}0.{}{}", sign, "0".repeat(shift - digits.len()), digits)
    }
}
