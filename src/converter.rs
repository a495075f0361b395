use crate::{
    ConvertError, EventReceiver, JsonEncoder, Result, Validator, XmlEncoder, decode_json,
    decode_xml,
};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use tracing::debug;

/// Document formats known by name.
///
/// Only JSON and XML have built-in codecs. The concise binary/text encodings
/// and QR images are reached through converters registered with
/// [`Registry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Cbe,
    Cte,
    Json,
    Qr,
    Qrt,
    Xml,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Cbe,
        Format::Cte,
        Format::Json,
        Format::Qr,
        Format::Qrt,
        Format::Xml,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Format::Cbe => "cbe",
            Format::Cte => "cte",
            Format::Json => "json",
            Format::Qr => "qr",
            Format::Qrt => "qrt",
            Format::Xml => "xml",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Format::Cbe => "Concise Binary Encoding",
            Format::Cte => "Concise Text Encoding",
            Format::Json => "JSON",
            Format::Qr => "QR code image (PNG)",
            Format::Qrt => "QR code as text art",
            Format::Xml => "XML",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(name: &str) -> Result<Self> {
        let lowered = name.to_lowercase();
        Format::ALL
            .into_iter()
            .find(|format| format.name() == lowered)
            .ok_or(ConvertError::UnknownFormat(lowered))
    }
}

/// Options handed to every converter.
///
/// Built-in converters only look at `indent_spaces`; the image settings are
/// carried for externally registered QR converters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Pretty-print with this many spaces per level; 0 writes compact output.
    pub indent_spaces: usize,
    pub invert_text: bool,
    pub image_size: u32,
    pub error_correction: u8,
    pub border_size: u32,
}

/// A complete source-to-destination pipeline.
pub type Converter = fn(&mut dyn BufRead, &mut dyn Write, &EncoderConfig) -> Result<()>;

/// Replays a source document as events.
pub type Decoder = fn(&mut dyn BufRead, &mut dyn EventReceiver) -> Result<()>;

/// Converters keyed by (source, destination), plus the decoders used by the
/// `print` and `validate` commands.
pub struct Registry {
    converters: HashMap<(Format, Format), Converter>,
    decoders: HashMap<Format, Decoder>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
            decoders: HashMap::new(),
        }
    }

    /// A registry holding the JSON and XML codecs shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Format::Json, Format::Json, json_to_json);
        registry.register(Format::Xml, Format::Xml, xml_to_xml);
        registry.register_decoder(Format::Json, json_decoder);
        registry.register_decoder(Format::Xml, xml_decoder);
        registry
    }

    pub fn register(&mut self, source: Format, destination: Format, converter: Converter) {
        self.converters.insert((source, destination), converter);
    }

    pub fn register_decoder(&mut self, format: Format, decoder: Decoder) {
        self.decoders.insert(format, decoder);
    }

    pub fn get(&self, source: Format, destination: Format) -> Option<Converter> {
        self.converters.get(&(source, destination)).copied()
    }

    /// Look up a converter by its `"<source>-<destination>"` key, ignoring case.
    pub fn lookup(&self, id: &str) -> Result<Converter> {
        let id = id.to_lowercase();
        let pair = id.split_once('-').and_then(|(source, destination)| {
            Some((source.parse().ok()?, destination.parse().ok()?))
        });
        match pair.and_then(|(source, destination)| self.get(source, destination)) {
            Some(converter) => {
                debug!(converter = %id, "resolved converter");
                Ok(converter)
            }
            None => Err(ConvertError::UnknownFormat(id)),
        }
    }

    pub fn decoder(&self, format: Format) -> Result<Decoder> {
        self.decoders
            .get(&format)
            .copied()
            .ok_or_else(|| ConvertError::UnknownFormat(format.to_string()))
    }

    /// Registered (source, destination) pairs in a stable order.
    pub fn pairs(&self) -> Vec<(Format, Format)> {
        let mut pairs: Vec<_> = self.converters.keys().copied().collect();
        pairs.sort();
        pairs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Guess the source format from its first byte without consuming it.
pub fn detect_format<R: BufRead + ?Sized>(reader: &mut R) -> Result<Format> {
    let format = match reader.fill_buf()?.first() {
        None => {
            return Err(ConvertError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "empty input, cannot detect its format",
            )));
        }
        Some(b'c') => Format::Cte,
        Some(0x03) => Format::Cbe,
        Some(b'<') => Format::Xml,
        Some(_) => Format::Json,
    };
    debug!(%format, "detected source format");
    Ok(format)
}

fn json_to_json(input: &mut dyn BufRead, output: &mut dyn Write, config: &EncoderConfig) -> Result<()> {
    let mut encoder = Validator::new(JsonEncoder::new(output, config.indent_spaces));
    decode_json(input, &mut encoder)
}

fn xml_to_xml(input: &mut dyn BufRead, output: &mut dyn Write, config: &EncoderConfig) -> Result<()> {
    let mut encoder = Validator::new(XmlEncoder::new(output, config.indent_spaces));
    decode_xml(input, &mut encoder)
}

fn json_decoder(input: &mut dyn BufRead, receiver: &mut dyn EventReceiver) -> Result<()> {
    decode_json(input, receiver)
}

fn xml_decoder(input: &mut dyn BufRead, receiver: &mut dyn EventReceiver) -> Result<()> {
    decode_xml(input, receiver)
}
