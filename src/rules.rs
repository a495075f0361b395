//! Structural checks applied between a decoder and an encoder.

use crate::{ConvertError, Event, EventKind, EventReceiver, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Map { expecting_value: bool },
    MarkupAttributes { expecting_value: bool },
    MarkupContents,
    Comment,
    Other(EventKind),
}

#[derive(Debug, Clone, Copy)]
struct ChunkState {
    remaining: u64,
    more_chunks: bool,
}

/// Forwards events to the wrapped receiver after checking that the stream is
/// well-nested.
///
/// The document must open with `BeginDocument` and close with `EndDocument`
/// at depth 0. Every container needs its `End` (markup needs two), map
/// entries come in key/value pairs, and a chunked array must be complete
/// before any other event arrives.
pub struct Validator<R: EventReceiver> {
    inner: R,
    stack: Vec<Frame>,
    array: Option<ChunkState>,
    begun: bool,
    finished: bool,
}

impl<R: EventReceiver> Validator<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            stack: Vec::new(),
            array: None,
            begun: false,
            finished: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn check(&mut self, event: &Event<'_>) -> Result<()> {
        if self.finished {
            return Err(invalid(format!("{} after end of document", event.kind())));
        }
        if !self.begun {
            if !matches!(event, Event::BeginDocument) {
                return Err(invalid(format!(
                    "document starts with {} instead of begin document",
                    event.kind()
                )));
            }
            self.begun = true;
            return Ok(());
        }

        if let Some(state) = self.array.as_mut() {
            match event {
                Event::ArrayChunk {
                    length,
                    more_chunks,
                } => {
                    if state.remaining > 0 {
                        return Err(invalid(format!(
                            "array chunk announced with {} bytes still outstanding",
                            state.remaining
                        )));
                    }
                    state.remaining = *length;
                    state.more_chunks = *more_chunks;
                }
                Event::ArrayData(data) => {
                    let length = data.len() as u64;
                    if length > state.remaining {
                        return Err(invalid(format!(
                            "array data of {} bytes exceeds the {} bytes left in the chunk",
                            length, state.remaining
                        )));
                    }
                    state.remaining -= length;
                }
                other => {
                    return Err(invalid(format!(
                        "{} inside an incomplete array",
                        other.kind()
                    )));
                }
            }
            if state.remaining == 0 && !state.more_chunks {
                self.array = None;
                self.value_completed();
            }
            return Ok(());
        }

        match event {
            Event::BeginDocument => Err(invalid("begin document repeated".to_string())),
            Event::EndDocument => {
                if let Some(frame) = self.stack.last() {
                    return Err(invalid(format!(
                        "end document with {} open containers (innermost {:?})",
                        self.stack.len(),
                        frame
                    )));
                }
                self.finished = true;
                Ok(())
            }
            Event::ArrayChunk { .. } | Event::ArrayData(_) => Err(invalid(format!(
                "{} outside of an array",
                event.kind()
            ))),
            Event::ArrayBegin(_) => {
                self.array = Some(ChunkState {
                    remaining: 0,
                    more_chunks: true,
                });
                Ok(())
            }
            Event::End => self.close_container(),
            Event::Map => {
                self.stack.push(Frame::Map {
                    expecting_value: false,
                });
                Ok(())
            }
            Event::Markup(_) => {
                self.stack.push(Frame::MarkupAttributes {
                    expecting_value: false,
                });
                Ok(())
            }
            Event::Comment { .. } => {
                self.stack.push(Frame::Comment);
                Ok(())
            }
            event if event.opens_container() => {
                self.stack.push(Frame::Other(event.kind()));
                Ok(())
            }
            Event::Version(_) => Ok(()),
            _ => {
                self.value_completed();
                Ok(())
            }
        }
    }

    fn close_container(&mut self) -> Result<()> {
        match self.stack.pop() {
            None => Err(invalid("end of container at top level".to_string())),
            Some(Frame::Map {
                expecting_value: true,
            }) => Err(invalid("map key without a value".to_string())),
            Some(Frame::MarkupAttributes {
                expecting_value: true,
            }) => Err(invalid("attribute key without a value".to_string())),
            Some(Frame::MarkupAttributes { .. }) => {
                self.stack.push(Frame::MarkupContents);
                Ok(())
            }
            Some(Frame::Comment) => Ok(()),
            Some(_) => {
                self.value_completed();
                Ok(())
            }
        }
    }

    fn value_completed(&mut self) {
        if let Some(
            Frame::Map { expecting_value } | Frame::MarkupAttributes { expecting_value },
        ) = self.stack.last_mut()
        {
            *expecting_value = !*expecting_value;
        }
    }
}

fn invalid(message: String) -> ConvertError {
    ConvertError::InvalidEvents(message)
}

impl<R: EventReceiver> EventReceiver for Validator<R> {
    fn on_event(&mut self, event: Event<'_>) -> Result<()> {
        self.check(&event)?;
        self.inner.on_event(event)
    }
}
