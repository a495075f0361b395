//! Streaming adapters between raw bytes and their textual spellings.
//!
//! The readers turn text such as `01 fe 7a` or `1, 0x20, 255` back into bytes
//! so a textual dump can be fed to any decoder. The writers do the opposite
//! for the destination side: hex pairs, a C array body, or an escaped string.

use std::io::{self, BufRead, Read, Write};

use crate::ConvertError;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_hexdigit() || byte == b'x' || byte == b'X'
}

fn malformed(offset: u64, token: &[u8], reason: &'static str) -> io::Error {
    ConvertError::MalformedInput {
        offset,
        token: String::from_utf8_lossy(token).into_owned(),
        reason,
    }
    .into()
}

/// Splits a byte stream into runs of `[0-9a-fA-FxX]`, skipping everything else.
struct TokenReader<R: BufRead> {
    reader: R,
    offset: u64,
    token: Vec<u8>,
}

impl<R: BufRead> TokenReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            token: Vec::new(),
        }
    }

    /// Read the next token into `self.token`, returning its start offset, or
    /// `None` once the stream holds no further token.
    fn read_token(&mut self) -> io::Result<Option<u64>> {
        self.token.clear();

        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(None);
            }
            let skipped = available
                .iter()
                .take_while(|byte| !is_token_byte(**byte))
                .count();
            let found = skipped < available.len();
            self.reader.consume(skipped);
            self.offset += skipped as u64;
            if found {
                break;
            }
        }

        let start = self.offset;
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                break;
            }
            let run = available
                .iter()
                .take_while(|byte| is_token_byte(**byte))
                .count();
            self.token.extend_from_slice(&available[..run]);
            let ended = run < available.len();
            self.reader.consume(run);
            self.offset += run as u64;
            if ended {
                break;
            }
        }

        Ok(Some(start))
    }
}

/// Reads bytes spelled as two hex digits each, separated by anything that is
/// not a hex digit (`de ad,be:ef`).
pub struct HexReader<R: BufRead> {
    tokens: TokenReader<R>,
}

impl<R: BufRead> HexReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            tokens: TokenReader::new(reader),
        }
    }

    fn convert_one_byte(&mut self) -> io::Result<Option<u8>> {
        let Some(offset) = self.tokens.read_token()? else {
            return Ok(None);
        };
        let token = &self.tokens.token;
        if token.len() != 2 {
            return Err(malformed(offset, token, "not a two-digit hex byte"));
        }
        let mut byte = [0u8; 1];
        hex::decode_to_slice(token, &mut byte).map_err(|_| malformed(offset, token, "not hex"))?;
        Ok(Some(byte[0]))
    }
}

impl<R: BufRead> Read for HexReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for (count, slot) in buf.iter_mut().enumerate() {
            match self.convert_one_byte()? {
                Some(byte) => *slot = byte,
                None => return Ok(count),
            }
        }
        Ok(buf.len())
    }
}

/// Reads bytes written as decimal numbers (`255`) or `0x`-prefixed hex pairs
/// (`0xff`), separated by anything outside the token class.
pub struct TextByteReader<R: BufRead> {
    tokens: TokenReader<R>,
}

impl<R: BufRead> TextByteReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            tokens: TokenReader::new(reader),
        }
    }

    fn convert_one_byte(&mut self) -> io::Result<Option<u8>> {
        let Some(offset) = self.tokens.read_token()? else {
            return Ok(None);
        };
        let token = &self.tokens.token;

        if token.len() == 4 && token[0] == b'0' && matches!(token[1], b'x' | b'X') {
            let mut byte = [0u8; 1];
            hex::decode_to_slice(&token[2..], &mut byte)
                .map_err(|_| malformed(offset, token, "not hex"))?;
            return Ok(Some(byte[0]));
        }

        if !token.iter().all(u8::is_ascii_digit) {
            return Err(malformed(offset, token, "not decimal"));
        }
        let value = token.iter().fold(0u64, |value, digit| {
            value
                .saturating_mul(10)
                .saturating_add(u64::from(digit - b'0'))
        });
        u8::try_from(value)
            .map(Some)
            .map_err(|_| malformed(offset, token, "too big for a byte"))
    }
}

impl<R: BufRead> Read for TextByteReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for (count, slot) in buf.iter_mut().enumerate() {
            match self.convert_one_byte()? {
                Some(byte) => *slot = byte,
                None => return Ok(count),
            }
        }
        Ok(buf.len())
    }
}

fn push_hex(text: &mut Vec<u8>, byte: u8) {
    text.push(HEX_DIGITS[usize::from(byte >> 4)]);
    text.push(HEX_DIGITS[usize::from(byte & 0x0F)]);
}

/// Writes each byte as two lowercase hex digits, space separated.
pub struct HexWriter<W: Write> {
    inner: W,
    first_byte: bool,
}

impl<W: Write> HexWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            first_byte: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HexWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut text = Vec::with_capacity(buf.len() * 3);
        for &byte in buf {
            if self.first_byte {
                self.first_byte = false;
            } else {
                text.push(b' ');
            }
            push_hex(&mut text, byte);
        }
        self.inner.write_all(&text)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes bytes as the body of a C array initializer: `0x01, 0xab, ...`.
pub struct CArrayWriter<W: Write> {
    inner: W,
    first_byte: bool,
}

impl<W: Write> CArrayWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            first_byte: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CArrayWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut text = Vec::with_capacity(buf.len() * 6);
        for &byte in buf {
            if self.first_byte {
                self.first_byte = false;
            } else {
                text.extend_from_slice(b", ");
            }
            text.extend_from_slice(b"0x");
            push_hex(&mut text, byte);
        }
        self.inner.write_all(&text)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Passes bytes through, escaping `"` and `\` with a backslash.
pub struct StringifyWriter<W: Write> {
    inner: W,
}

impl<W: Write> StringifyWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for StringifyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while let Some(index) = rest.iter().position(|byte| matches!(byte, b'"' | b'\\')) {
            self.inner.write_all(&rest[..index])?;
            self.inner.write_all(&[b'\\', rest[index]])?;
            rest = &rest[index + 1..];
        }
        self.inner.write_all(rest)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn read_all<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        reader.read_to_end(&mut output)?;
        Ok(output)
    }

    fn malformed_parts(err: io::Error) -> (u64, String, &'static str) {
        match ConvertError::from(err) {
            ConvertError::MalformedInput {
                offset,
                token,
                reason,
            } => (offset, token, reason),
            other => panic!("Expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_hex_reader() {
        let bytes = read_all(HexReader::new(&b"de ad,BE:ef\n00"[..])).unwrap();
        assert_eq!(bytes, [0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
    }

    #[test]
    fn test_hex_reader_empty_input() {
        assert!(read_all(HexReader::new(&b""[..])).unwrap().is_empty());
        assert!(read_all(HexReader::new(&b"  ,\n"[..])).unwrap().is_empty());
    }

    #[test]
    fn test_hex_reader_rejects_single_digit() {
        let err = read_all(HexReader::new(&b"a"[..])).unwrap_err();
        let (offset, token, _) = malformed_parts(err);
        assert_eq!(offset, 0);
        assert_eq!(token, "a");
    }

    #[test]
    fn test_hex_reader_rejects_x_token() {
        let err = read_all(HexReader::new(&b"01 0x"[..])).unwrap_err();
        let (offset, token, reason) = malformed_parts(err);
        assert_eq!(offset, 3);
        assert_eq!(token, "0x");
        assert_eq!(reason, "not hex");
    }

    #[test]
    fn test_hex_reader_tokens_across_buffer_boundary() {
        // A one-byte buffer forces every token to span several fill_buf calls.
        let reader = BufReader::with_capacity(1, &b"12 34 5678"[..]);
        let err = read_all(HexReader::new(reader)).unwrap_err();
        let (offset, token, _) = malformed_parts(err);
        assert_eq!(offset, 6);
        assert_eq!(token, "5678");

        let reader = BufReader::with_capacity(1, &b"12 34"[..]);
        assert_eq!(read_all(HexReader::new(reader)).unwrap(), [0x12, 0x34]);
    }

    #[test]
    fn test_text_byte_reader() {
        let bytes = read_all(TextByteReader::new(&b"0xFF 255, 0X0a 7 0x00"[..])).unwrap();
        assert_eq!(bytes, [0xFF, 255, 0x0A, 7, 0]);
    }

    #[test]
    fn test_text_byte_reader_too_big() {
        let err = read_all(TextByteReader::new(&b"1 256"[..])).unwrap_err();
        let (offset, token, reason) = malformed_parts(err);
        assert_eq!(offset, 2);
        assert_eq!(token, "256");
        assert_eq!(reason, "too big for a byte");
    }

    #[test]
    fn test_text_byte_reader_not_decimal() {
        let err = read_all(TextByteReader::new(&b"1f"[..])).unwrap_err();
        assert_eq!(malformed_parts(err).2, "not decimal");

        // Only a four-character 0x token is hex.
        let err = read_all(TextByteReader::new(&b"0x1"[..])).unwrap_err();
        assert_eq!(malformed_parts(err).2, "not decimal");
    }

    #[test]
    fn test_text_byte_reader_huge_decimal() {
        let err = read_all(TextByteReader::new(&b"99999999999999999999999"[..])).unwrap_err();
        assert_eq!(malformed_parts(err).2, "too big for a byte");
    }

    #[test]
    fn test_hex_writer() {
        let mut writer = HexWriter::new(Vec::new());
        writer.write_all(&[0x01, 0xAB]).unwrap();
        writer.write_all(&[]).unwrap();
        writer.write_all(&[0xFF]).unwrap();
        assert_eq!(writer.into_inner(), b"01 ab ff");
    }

    #[test]
    fn test_c_array_writer() {
        let mut writer = CArrayWriter::new(Vec::new());
        writer.write_all(&[0x00]).unwrap();
        assert_eq!(writer.into_inner(), b"0x00");

        let mut writer = CArrayWriter::new(Vec::new());
        writer.write_all(&[0x01]).unwrap();
        writer.write_all(&[0xCD, 0xEF]).unwrap();
        assert_eq!(writer.into_inner(), b"0x01, 0xcd, 0xef");
    }

    #[test]
    fn test_writers_empty_input() {
        let mut hex = HexWriter::new(Vec::new());
        hex.write_all(b"").unwrap();
        assert!(hex.into_inner().is_empty());

        let mut c_array = CArrayWriter::new(Vec::new());
        c_array.write_all(b"").unwrap();
        assert!(c_array.into_inner().is_empty());

        let mut stringify = StringifyWriter::new(Vec::new());
        stringify.write_all(b"").unwrap();
        assert!(stringify.into_inner().is_empty());
    }

    #[test]
    fn test_stringify_writer() {
        let mut writer = StringifyWriter::new(Vec::new());
        writer.write_all(br#"{"a":"b\c"}"#).unwrap();
        assert_eq!(writer.into_inner(), br#"{\"a\":\"b\\c\"}"#);
    }

    #[test]
    fn test_writer_output_is_stable() {
        let input = [0x00, 0x22, 0x5C, 0x7F, 0xFF];
        let run = || {
            let mut writer = CArrayWriter::new(Vec::new());
            writer.write_all(&input).unwrap();
            writer.into_inner()
        };
        assert_eq!(run(), run());
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writers_propagate_sink_failure() {
        let err = HexWriter::new(FailingSink).write(&[1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = CArrayWriter::new(FailingSink).write(&[1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = StringifyWriter::new(FailingSink).write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
