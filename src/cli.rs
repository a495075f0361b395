use crate::{
    CArrayWriter, ConvertError, Discard, EncoderConfig, EventPrinter, Format, HexReader,
    HexWriter, Registry, Result, StringifyWriter, TextByteReader, Validator, detect_format,
};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadAdapter {
    None,
    Hex,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteAdapter {
    None,
    Hex,
    CArray,
    Stringify,
}

pub struct Cli;

impl Cli {
    pub fn build_command() -> Command {
        Command::new("enctool")
            .about("Converts documents between concise encodings, JSON and XML")
            .long_about("Converts documents between formats by decoding the source into a stream of structural events and re-encoding them.\n\nFiles can be '-' to use stdin or stdout. Raw byte formats can be read from and written as hex or decimal text.")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Log pipeline decisions to stderr")
                    .global(true)
                    .action(ArgAction::SetTrue),
            )
            .subcommand(Self::convert_command())
            .subcommand(Command::new("formats").about("Print a list of supported formats"))
            .subcommand(
                Command::new("print")
                    .about("Print a document's structure")
                    .arg(file_arg())
                    .arg(format_arg())
                    .arg(
                        Arg::new("indent")
                            .short('i')
                            .help("Indentation (spaces)")
                            .value_parser(value_parser!(usize))
                            .default_value("4"),
                    ),
            )
            .subcommand(
                Command::new("validate")
                    .about("Validate a document")
                    .arg(file_arg())
                    .arg(format_arg()),
            )
    }

    fn convert_command() -> Command {
        let flag = |name: &'static str, short: char, help: &'static str| {
            Arg::new(name).short(short).help(help).action(ArgAction::SetTrue)
        };

        Command::new("convert")
            .about("Convert between formats")
            .arg(
                Arg::new("source")
                    .short('s')
                    .help("The source file to read from ('-' for stdin, the default)"),
            )
            .arg(
                Arg::new("destination")
                    .short('d')
                    .help("The destination file to write to ('-' for stdout, the default)"),
            )
            .arg(
                Arg::new("source-format")
                    .long("sf")
                    .help("The source format to convert from (auto-detected if not specified)"),
            )
            .arg(
                Arg::new("destination-format")
                    .long("df")
                    .help("The destination format to convert to")
                    .required(true),
            )
            .arg(
                Arg::new("indent")
                    .short('i')
                    .help("Indentation to use")
                    .value_parser(value_parser!(usize))
                    .default_value("0"),
            )
            .arg(flag(
                "text-bytes",
                't',
                "Interpret source as text-encoded byte values (decimal numbers or 0xff style hex, separated by non-numeric chars)",
            ))
            .arg(flag(
                "hex-bytes",
                'x',
                "Interpret source as text hex-encoded byte values (2 digits per byte), separated by non-numeric chars",
            ))
            .arg(flag(
                "hex-output",
                'X',
                "Write destination as text hex-encoded byte values (2 digits per byte), separated by a space",
            ))
            .arg(flag(
                "c-output",
                'C',
                "Write destination as C-style byte values (in the format '0xab, 0xcd, ...')",
            ))
            .arg(flag(
                "stringify-output",
                'S',
                "Write destination as stringified (escapes \" and \\ characters)",
            ))
            .arg(
                Arg::new("invert")
                    .long("invert")
                    .help("Invert text-art QR output")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("image-size")
                    .long("image-size")
                    .help("QR image size in pixels")
                    .value_parser(value_parser!(u32))
                    .default_value("400"),
            )
            .arg(
                Arg::new("ecc")
                    .long("ecc")
                    .help("QR error correction level (0-3)")
                    .value_parser(value_parser!(u8).range(0..=3))
                    .default_value("0"),
            )
            .arg(
                Arg::new("border")
                    .long("border")
                    .help("QR border size in modules")
                    .value_parser(value_parser!(u32))
                    .default_value("4"),
            )
    }

    pub fn run_with_matches(matches: ArgMatches) -> Result<()> {
        let registry = Registry::with_builtin();
        match matches.subcommand() {
            Some(("convert", matches)) => run_convert(&registry, matches),
            Some(("formats", _)) => {
                let mut stdout = io::stdout().lock();
                write_formats(&registry, &mut stdout)?;
                stdout.flush()?;
                Ok(())
            }
            Some(("print", matches)) => run_print(&registry, matches),
            Some(("validate", matches)) => run_validate(&registry, matches),
            _ => Err(ConvertError::Usage("a command is required".to_string())),
        }
    }
}

fn file_arg() -> Arg {
    Arg::new("file")
        .short('f')
        .help("File to read from ('-' for stdin, the default)")
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("fmt")
        .help("File format (auto-detected if not specified)")
}

fn read_adapter(matches: &ArgMatches) -> Result<ReadAdapter> {
    match (matches.get_flag("hex-bytes"), matches.get_flag("text-bytes")) {
        (true, true) => Err(ConvertError::Usage(
            "Cannot choose modes -x and -t simultaneously".to_string(),
        )),
        (true, false) => Ok(ReadAdapter::Hex),
        (false, true) => Ok(ReadAdapter::Text),
        (false, false) => Ok(ReadAdapter::None),
    }
}

fn write_adapter(matches: &ArgMatches) -> Result<WriteAdapter> {
    let chosen: Vec<_> = [
        ("hex-output", WriteAdapter::Hex),
        ("c-output", WriteAdapter::CArray),
        ("stringify-output", WriteAdapter::Stringify),
    ]
    .into_iter()
    .filter(|(id, _)| matches.get_flag(id))
    .map(|(_, adapter)| adapter)
    .collect();

    match chosen.as_slice() {
        [] => Ok(WriteAdapter::None),
        [adapter] => Ok(*adapter),
        _ => Err(ConvertError::Usage(
            "Cannot choose more than one of -X -C -S simultaneously".to_string(),
        )),
    }
}

fn encoder_config(matches: &ArgMatches) -> EncoderConfig {
    EncoderConfig {
        indent_spaces: matches.get_one::<usize>("indent").copied().unwrap_or_default(),
        invert_text: matches.get_flag("invert"),
        image_size: matches.get_one::<u32>("image-size").copied().unwrap_or_default(),
        error_correction: matches.get_one::<u8>("ecc").copied().unwrap_or_default(),
        border_size: matches.get_one::<u32>("border").copied().unwrap_or_default(),
    }
}

fn path_or_stdio<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches.get_one::<String>(id).map_or("-", String::as_str)
}

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    Ok(Box::new(File::open(path)?))
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(io::stdout().lock()));
    }
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}

fn wrap_input(input: Box<dyn Read>, adapter: ReadAdapter) -> Box<dyn BufRead> {
    match adapter {
        ReadAdapter::None => Box::new(BufReader::new(input)),
        ReadAdapter::Hex => Box::new(BufReader::new(HexReader::new(BufReader::new(input)))),
        ReadAdapter::Text => Box::new(BufReader::new(TextByteReader::new(BufReader::new(input)))),
    }
}

fn wrap_output(output: Box<dyn Write>, adapter: WriteAdapter) -> Box<dyn Write> {
    match adapter {
        WriteAdapter::None => output,
        WriteAdapter::Hex => Box::new(HexWriter::new(output)),
        WriteAdapter::CArray => Box::new(CArrayWriter::new(output)),
        WriteAdapter::Stringify => Box::new(StringifyWriter::new(output)),
    }
}

/// Use the named format, or sniff it from the start of the input.
fn source_format(name: Option<&String>, input: &mut dyn BufRead) -> Result<String> {
    match name {
        Some(name) => Ok(name.clone()),
        None => Ok(detect_format(input)?.to_string()),
    }
}

fn run_convert(registry: &Registry, matches: &ArgMatches) -> Result<()> {
    let read_adapter = read_adapter(matches)?;
    let write_adapter = write_adapter(matches)?;
    let config = encoder_config(matches);
    let source = path_or_stdio(matches, "source");
    let destination = path_or_stdio(matches, "destination");
    debug!(?read_adapter, ?write_adapter, source, destination, "convert");

    let mut input = wrap_input(open_input(source)?, read_adapter);
    let source_format = source_format(matches.get_one::<String>("source-format"), &mut input)?;
    let destination_format = matches
        .get_one::<String>("destination-format")
        .ok_or_else(|| ConvertError::Usage("a destination format (--df) is required".to_string()))?;
    let converter = registry.lookup(&format!("{}-{}", source_format, destination_format))?;

    let mut output = wrap_output(open_output(destination)?, write_adapter);
    converter(&mut input, &mut output, &config)?;
    output.flush()?;
    Ok(())
}

fn run_print(registry: &Registry, matches: &ArgMatches) -> Result<()> {
    let mut input = wrap_input(open_input(path_or_stdio(matches, "file"))?, ReadAdapter::None);
    let format: Format = source_format(matches.get_one::<String>("format"), &mut input)?.parse()?;
    let decode = registry.decoder(format)?;
    let indent_spaces = matches.get_one::<usize>("indent").copied().unwrap_or_default();

    let mut printer = Validator::new(EventPrinter::new(io::stdout().lock(), indent_spaces));
    decode(&mut input, &mut printer)
}

fn run_validate(registry: &Registry, matches: &ArgMatches) -> Result<()> {
    let mut input = wrap_input(open_input(path_or_stdio(matches, "file"))?, ReadAdapter::None);
    let format: Format = source_format(matches.get_one::<String>("format"), &mut input)?.parse()?;
    let decode = registry.decoder(format)?;

    let mut validator = Validator::new(Discard);
    decode(&mut input, &mut validator)?;
    debug!(%format, "document is valid");
    Ok(())
}

fn write_formats<W: Write>(registry: &Registry, output: &mut W) -> Result<()> {
    writeln!(output, "Supported formats:")?;
    for format in Format::ALL {
        writeln!(output, "    {:<6}{}", format.name(), format.description())?;
    }
    writeln!(output, "Available converters:")?;
    for (source, destination) in registry.pairs() {
        writeln!(output, "    {}-{}", source, destination)?;
    }
    Ok(())
}

// test

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("enctool-cli-{}-{}", std::process::id(), name))
    }

    fn run(args: &[&str]) -> Result<()> {
        let mut argv = vec!["enctool"];
        argv.extend_from_slice(args);
        let matches = Cli::build_command().try_get_matches_from(argv).unwrap();
        Cli::run_with_matches(matches)
    }

    #[test]
    fn test_build_command() {
        let cmd = Cli::build_command();
        assert_eq!(cmd.get_name(), "enctool");
        cmd.debug_assert();
    }

    #[test]
    fn test_destination_format_is_required() {
        let result = Cli::build_command().try_get_matches_from(vec!["enctool", "convert"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_conflicting_read_adapters() {
        match run(&["convert", "--df", "json", "-x", "-t"]) {
            Err(ConvertError::Usage(msg)) => assert!(msg.contains("-x and -t")),
            other => panic!("Expected Usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_write_adapters() {
        match run(&["convert", "--df", "json", "-X", "-S"]) {
            Err(ConvertError::Usage(msg)) => assert!(msg.contains("-X -C -S")),
            other => panic!("Expected Usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_files_with_indent() {
        let input = temp_path("indent-in.xml");
        let output = temp_path("indent-out.xml");
        fs::write(&input, "<a><b>x</b></a>").unwrap();

        run(&[
            "convert",
            "-s",
            input.to_str().unwrap(),
            "-d",
            output.to_str().unwrap(),
            "--df",
            "XML",
            "-i",
            "2",
        ])
        .unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), "<a>\n  <b>x</b>\n</a>");
        let _ = fs::remove_file(input);
        let _ = fs::remove_file(output);
    }

    #[test]
    fn test_convert_hex_in_hex_out() {
        let input = temp_path("hex-in.txt");
        let output = temp_path("hex-out.txt");
        // <r>hi</r>
        fs::write(&input, "3c 72 3e 68 69 3c 2f 72 3e").unwrap();

        run(&[
            "convert",
            "-x",
            "-X",
            "-s",
            input.to_str().unwrap(),
            "-d",
            output.to_str().unwrap(),
            "--df",
            "xml",
        ])
        .unwrap();

        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "3c 72 3e 68 69 3c 2f 72 3e"
        );
        let _ = fs::remove_file(input);
        let _ = fs::remove_file(output);
    }

    #[test]
    fn test_convert_unregistered_pair() {
        let input = temp_path("pair-in.xml");
        let output = temp_path("pair-out.json");
        fs::write(&input, "<r/>").unwrap();

        let result = run(&[
            "convert",
            "-s",
            input.to_str().unwrap(),
            "-d",
            output.to_str().unwrap(),
            "--sf",
            "cbe",
            "--df",
            "xml",
        ]);
        match result {
            Err(ConvertError::UnknownFormat(id)) => assert_eq!(id, "cbe-xml"),
            other => panic!("Expected UnknownFormat, got {:?}", other),
        }
        assert!(!output.exists());
        let _ = fs::remove_file(input);
    }

    #[test]
    fn test_validate_rejects_malformed_xml() {
        let input = temp_path("invalid.xml");
        fs::write(&input, "<a><b></a>").unwrap();
        assert!(run(&["validate", "-f", input.to_str().unwrap()]).is_err());

        fs::write(&input, "<a><b/></a>").unwrap();
        assert!(run(&["validate", "-f", input.to_str().unwrap()]).is_ok());
        let _ = fs::remove_file(input);
    }

    #[test]
    fn test_write_formats() {
        let mut output = Vec::new();
        write_formats(&Registry::with_builtin(), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Supported formats:\n    cbe   Concise Binary Encoding\n"));
        assert!(text.ends_with("Available converters:\n    json-json\n    xml-xml\n"));
    }
}
