use enctool::{
    ArrayType, CArrayWriter, ConvertError, EncoderConfig, Event, EventKind, EventReceiver, Format,
    HexReader, HexWriter, JsonEncoder, Registry, StringifyWriter, TextByteReader, Validator,
    XmlEncoder, decode_json, decode_xml,
};
use pretty_assertions::assert_eq;
use std::io::{BufReader, Cursor, Read, Write};

fn convert(id: &str, input: &[u8], config: &EncoderConfig) -> Result<String, ConvertError> {
    let converter = Registry::with_builtin().lookup(id)?;
    let mut output = Vec::new();
    converter(&mut Cursor::new(input), &mut output, config)?;
    Ok(String::from_utf8(output).unwrap())
}

fn encode_xml(events: Vec<Event<'static>>) -> Result<String, ConvertError> {
    let mut encoder = Validator::new(XmlEncoder::new(Vec::new(), 0));
    for event in events {
        encoder.on_event(event)?;
    }
    Ok(String::from_utf8(encoder.into_inner().into_inner()).unwrap())
}

#[test]
fn markup_events_encode_to_xml() {
    let xml = encode_xml(vec![
        Event::BeginDocument,
        Event::Version(1),
        Event::markup("r"),
        Event::string("k"),
        Event::string("v"),
        Event::End,
        Event::string("hi"),
        Event::End,
        Event::EndDocument,
    ])
    .unwrap();
    assert_eq!(xml, r#"<r k="v">hi</r>"#);
}

#[test]
fn list_event_is_fatal_for_xml() {
    let err = encode_xml(vec![Event::BeginDocument, Event::Version(1), Event::List]).unwrap_err();
    match err {
        ConvertError::UnsupportedConstruct { kind, destination } => {
            assert_eq!(kind, EventKind::List);
            assert_eq!(destination, Format::Xml);
        }
        other => panic!("Expected UnsupportedConstruct, got {:?}", other),
    }
}

#[test]
fn xml_round_trip_is_stable() {
    let source = r#"<doc lang="en"><title>A &amp; B</title><!--note--><body><p>one</p><p/></body></doc>"#;
    let once = convert("xml-xml", source.as_bytes(), &EncoderConfig::default()).unwrap();
    assert_eq!(once, source.replace("<p/>", "<p></p>"));

    let twice = convert("xml-xml", once.as_bytes(), &EncoderConfig::default()).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn xml_pretty_printing() {
    let config = EncoderConfig {
        indent_spaces: 4,
        ..EncoderConfig::default()
    };
    let output = convert("xml-xml", b"<a><b><c>x</c></b></a>", &config).unwrap();
    assert_eq!(output, "<a>\n    <b>\n        <c>x</c>\n    </b>\n</a>");
}

#[test]
fn json_pass_through_keeps_order() {
    let source = r#"{"zeta":1,"alpha":{"list":[true,false,null]},"mid":"x"}"#;
    let output = convert("json-json", source.as_bytes(), &EncoderConfig::default()).unwrap();
    assert_eq!(output, source);
}

#[test]
fn unknown_converter_is_reported() {
    let err = convert("foo-bar", b"", &EncoderConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "foo-bar: unknown converter");
}

#[test]
fn hex_reader_errors_surface_from_xml_decode() {
    let reader = BufReader::new(HexReader::new(Cursor::new("3c 61 3e 1x")));
    let mut events = Vec::new();
    let err = decode_xml(reader, &mut events).unwrap_err();
    match err {
        ConvertError::MalformedInput { offset, token, .. } => {
            assert_eq!(offset, 9);
            assert_eq!(token, "1x");
        }
        other => panic!("Expected MalformedInput, got {:?}", other),
    }
}

#[test]
fn text_bytes_feed_json_decode() {
    // {"a":1}
    let reader = TextByteReader::new(Cursor::new("123 34 97 34 0x3a 49 125"));
    let mut events = Vec::new();
    decode_json(reader, &mut events).unwrap();
    assert_eq!(
        events,
        vec![
            Event::BeginDocument,
            Event::Version(1),
            Event::Map,
            Event::string("a"),
            Event::Uint(1),
            Event::End,
            Event::EndDocument,
        ]
    );
}

#[test]
fn byte_writers_keep_state_across_writes() {
    let mut hex = HexWriter::new(Vec::new());
    hex.write_all(&[0x01]).unwrap();
    hex.write_all(&[0xab, 0xcd]).unwrap();
    assert_eq!(hex.into_inner(), b"01 ab cd");

    let mut c_array = CArrayWriter::new(Vec::new());
    c_array.write_all(&[0x01]).unwrap();
    c_array.write_all(&[0xff]).unwrap();
    assert_eq!(c_array.into_inner(), b"0x01, 0xff");

    let mut stringify = StringifyWriter::new(Vec::new());
    stringify.write_all(br#"say "hi" \ "#).unwrap();
    assert_eq!(stringify.into_inner(), br#"say \"hi\" \\ "#);
}

#[test]
fn json_encoder_writes_binary_as_base64_through_hex_writer() {
    let mut encoder = Validator::new(JsonEncoder::new(HexWriter::new(Vec::new()), 0));
    for event in [
        Event::BeginDocument,
        Event::Version(1),
        Event::List,
        Event::ArrayBegin(ArrayType::Uint8),
        Event::ArrayChunk {
            length: 1,
            more_chunks: true,
        },
        Event::ArrayData(vec![0xff].into()),
        Event::ArrayChunk {
            length: 0,
            more_chunks: false,
        },
        Event::End,
        Event::EndDocument,
    ] {
        encoder.on_event(event).unwrap();
    }
    let hex = encoder.into_inner().into_inner().into_inner();
    let mut json = String::new();
    HexReader::new(Cursor::new(hex))
        .read_to_string(&mut json)
        .unwrap();
    assert_eq!(json, r#"["/w=="]"#);
}
