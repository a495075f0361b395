//! A library for converting documents between tree-structured encodings.
//!
//! Every conversion decodes the source into a stream of structural
//! [`Event`]s and re-encodes those events into the destination format. The
//! crate ships the XML and JSON bridges, the byte/text stream adapters used by
//! the raw hex/C/stringify modes, and a registry of converters keyed by
//! `"<source>-<destination>"`.
//!
//! # Examples
//!
//! ```no_run
//! use enctool::{EncoderConfig, Registry};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let registry = Registry::with_builtin();
//! let convert = registry.lookup("xml-xml").unwrap();
//!
//! let mut input = BufReader::new(File::open("input.xml").unwrap());
//! let mut output = File::create("output.xml").unwrap();
//! convert(&mut input, &mut output, &EncoderConfig::default()).unwrap();
//! ```

use std::io;
use std::str::Utf8Error;
use std::sync::Arc;
use thiserror::Error;

pub mod cli;
mod converter;
mod events;
mod json;
mod printer;
mod rules;
mod text_bytes;
mod xml;

pub use converter::{Converter, Decoder, EncoderConfig, Format, Registry, detect_format};
pub use events::{
    ArrayBuffer, ArrayType, CONCISE_ENCODING_VERSION, Discard, Event, EventKind, EventReceiver,
    Timestamp,
};
pub use json::{JsonEncoder, decode_json};
pub use printer::EventPrinter;
pub use rules::Validator;
pub use text_bytes::{CArrayWriter, HexReader, HexWriter, StringifyWriter, TextByteReader};
pub use xml::{MarkupStage, XmlEncoder, decode_xml};

/// Error types for decoding, encoding and conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(io::Error),
    #[error("offset {offset}: cannot convert {token:?}: {reason}")]
    MalformedInput {
        offset: u64,
        token: String,
        reason: &'static str,
    },
    #[error("cannot convert {kind} to {destination}")]
    UnsupportedConstruct {
        kind: EventKind,
        destination: Format,
    },
    #[error("{0}: unknown converter")]
    UnknownFormat(String),
    #[error("invalid event sequence: {0}")]
    InvalidEvents(String),
    #[error("XML error: {0}")]
    Xml(quick_xml::Error),
    #[error("JSON error: {0}")]
    Json(serde_json::Error),
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("{0}")]
    Usage(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ConvertError>;

// The byte readers report malformed tokens through `io::Error`; unwrap them so
// callers see the original error rather than a generic I/O failure.
impl From<io::Error> for ConvertError {
    fn from(err: io::Error) -> Self {
        match err.downcast::<ConvertError>() {
            Ok(inner) => inner,
            Err(err) => ConvertError::Io(err),
        }
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(shared) => match Arc::try_unwrap(shared) {
                Ok(err) => err.into(),
                Err(shared) => ConvertError::Io(io::Error::new(shared.kind(), shared.to_string())),
            },
            other => ConvertError::Xml(other),
        }
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            io::Error::from(err).into()
        } else {
            ConvertError::Json(err)
        }
    }
}

impl From<ConvertError> for io::Error {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_survives_io_round_trip() {
        let original = ConvertError::MalformedInput {
            offset: 4,
            token: "zz".to_string(),
            reason: "not hex",
        };
        let wrapped: io::Error = original.into();
        assert_eq!(wrapped.kind(), io::ErrorKind::InvalidData);

        match ConvertError::from(wrapped) {
            ConvertError::MalformedInput { offset, token, .. } => {
                assert_eq!(offset, 4);
                assert_eq!(token, "zz");
            }
            other => panic!("Expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let err = ConvertError::from(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(matches!(err, ConvertError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_error_messages() {
        let err = ConvertError::UnsupportedConstruct {
            kind: EventKind::List,
            destination: Format::Xml,
        };
        assert_eq!(err.to_string(), "cannot convert list to xml");
        assert_eq!(
            ConvertError::UnknownFormat("foo-bar".to_string()).to_string(),
            "foo-bar: unknown converter"
        );
    }
}
