//! Human-readable dump of an event stream.

use std::io::Write;

use crate::{ArrayBuffer, ArrayType, ConvertError, Event, EventReceiver, Result};

/// Prints one line per event, indented by nesting depth.
///
/// ```text
/// markup <r>
///   "k"
///   "v"
///   (contents)
///   "hi"
/// end
/// ```
pub struct EventPrinter<W: Write> {
    output: W,
    indent_spaces: usize,
    // One entry per open container; `true` while a markup attribute section is open.
    frames: Vec<bool>,
    array: ArrayBuffer,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(output: W, indent_spaces: usize) -> Self {
        Self {
            output,
            indent_spaces,
            frames: Vec::new(),
            array: ArrayBuffer::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn line(&mut self, text: &str) -> Result<()> {
        let width = self.frames.len() * self.indent_spaces;
        writeln!(self.output, "{:width$}{}", "", text, width = width)?;
        Ok(())
    }

    fn print_array(&mut self, completed: Option<(ArrayType, Vec<u8>)>) -> Result<()> {
        match completed {
            Some((array_type, data)) => self.line(&describe_array(array_type, &data)),
            None => Ok(()),
        }
    }
}

impl<W: Write> EventReceiver for EventPrinter<W> {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::ArrayBegin(array_type) => {
                self.array.begin(array_type);
                Ok(())
            }
            Event::ArrayChunk {
                length,
                more_chunks,
            } => {
                let completed = self.array.chunk(length, more_chunks)?;
                self.print_array(completed)
            }
            Event::ArrayData(data) => {
                let completed = self.array.data(&data)?;
                self.print_array(completed)
            }
            Event::End => match self.frames.pop() {
                Some(true) => {
                    self.frames.push(false);
                    self.line("(contents)")
                }
                Some(false) => self.line("end"),
                None => Err(ConvertError::InvalidEvents(
                    "end of container at top level".to_string(),
                )),
            },
            Event::EndDocument => {
                self.line("end document")?;
                self.output.flush()?;
                Ok(())
            }
            ref container if container.opens_container() => {
                self.line(&describe(container))?;
                self.frames.push(matches!(container, Event::Markup(_)));
                Ok(())
            }
            ref other => self.line(&describe(other)),
        }
    }
}

fn describe(event: &Event<'_>) -> String {
    if let Some(text) = event.scalar_text() {
        return text;
    }
    match event {
        Event::BeginDocument => "begin document".to_string(),
        Event::Version(version) => format!("version {}", version),
        Event::Array { array_type, data } => describe_array(*array_type, data),
        Event::Markup(name) => format!("markup <{}>", name),
        Event::StructTemplate(id) => format!("struct template {}", id),
        Event::StructInstance(id) => format!("struct instance {}", id),
        Event::Marker(id) => format!("marker &{}", id),
        Event::Reference(id) => format!("reference ${}", id),
        Event::Constant(name) => format!("constant #{}", name),
        other => other.kind().to_string(),
    }
}

fn describe_array(array_type: ArrayType, data: &[u8]) -> String {
    match array_type {
        ArrayType::String => format!("{:?}", String::from_utf8_lossy(data)),
        array_type if array_type.is_textual() => {
            format!("{} {:?}", array_type, String::from_utf8_lossy(data))
        }
        array_type => format!("{} [{}]", array_type, hex::encode(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn print(events: Vec<Event<'static>>, indent_spaces: usize) -> String {
        let mut printer = EventPrinter::new(Vec::new(), indent_spaces);
        for event in events {
            printer.on_event(event).unwrap();
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_prints_markup_structure() {
        let output = print(
            vec![
                Event::BeginDocument,
                Event::Version(1),
                Event::markup("r"),
                Event::string("k"),
                Event::string("v"),
                Event::End,
                Event::string("hi"),
                Event::End,
                Event::EndDocument,
            ],
            2,
        );
        assert_eq!(
            output,
            "begin document\nversion 1\nmarkup <r>\n  \"k\"\n  \"v\"\n  (contents)\n  \"hi\"\nend\nend document\n"
        );
    }

    #[test]
    fn test_prints_nested_containers_and_binary() {
        let output = print(
            vec![
                Event::Map,
                Event::string("bytes"),
                Event::ArrayBegin(ArrayType::Uint8),
                Event::ArrayChunk {
                    length: 2,
                    more_chunks: false,
                },
                Event::ArrayData(vec![0x0A, 0xFF].into()),
                Event::string("list"),
                Event::List,
                Event::Int(-1),
                Event::End,
                Event::End,
            ],
            1,
        );
        assert_eq!(
            output,
            "map\n \"bytes\"\n uint8 [0aff]\n \"list\"\n list\n  -1\n end\nend\n"
        );
    }
}
