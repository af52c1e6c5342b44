//! Line codec for the chat socket protocol.
//!
//! Wraps [`LinesCodec`] (LF or CRLF terminated, bounded length) and turns
//! its recoverable failures into items, so a client that sends one bad
//! line keeps its session. `FramedRead` ends the stream after any decoder
//! error; only real I/O errors are reported that way.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// A line longer than the limit; it was discarded.
    TooLong,
    /// A line that was not UTF-8; it was discarded.
    InvalidUtf8,
}

impl Input {
    /// Notice sent back to the client for a discarded line.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Line(_) => None,
            Self::TooLong => Some("Input line too long, message discarded\n"),
            Self::InvalidUtf8 => Some("Input was not valid UTF-8, message discarded\n"),
        }
    }
}

pub struct ChatCodec {
    inner: LinesCodec,
}

impl ChatCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_length),
        }
    }

    fn classify(res: Result<Option<String>, LinesCodecError>) -> io::Result<Option<Input>> {
        match res {
            Ok(line) => Ok(line.map(Input::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Input::TooLong)),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Input::InvalidUtf8))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for ChatCodec {
    type Item = Input;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Input>> {
        Self::classify(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Input>> {
        Self::classify(self.inner.decode_eof(src))
    }
}
