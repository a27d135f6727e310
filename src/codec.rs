use bytes::{Buf, BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{DEFAULT_MAX_FRAME_SIZE, ProtocolError, decode_with_limit};

/// Errors surfaced by [`StompCodec`].
///
/// `tokio_util` requires codec errors to absorb `io::Error`; the codec
/// itself only ever produces the `Protocol` variant.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append the wire form of `frame` to `dst`.
///
/// Layout: `COMMAND\n`, one `key:value\n` per header in order, a blank line,
/// the body bytes verbatim and a single NUL. Header text is not escaped and
/// no headers are added; a `content-length` header, if wanted, must already
/// be on the frame.
pub fn encode_into(frame: &Frame, dst: &mut BytesMut) {
    let headers_len: usize = frame
        .headers
        .iter()
        .map(|(k, v)| k.len() + v.len() + 2)
        .sum();
    dst.reserve(frame.command.as_str().len() + headers_len + frame.body.len() + 3);

    dst.extend_from_slice(frame.command.as_str().as_bytes());
    dst.put_u8(b'\n');
    for (k, v) in &frame.headers {
        dst.extend_from_slice(k.as_bytes());
        dst.put_u8(b':');
        dst.extend_from_slice(v.as_bytes());
        dst.put_u8(b'\n');
    }
    dst.put_u8(b'\n');
    dst.extend_from_slice(&frame.body);
    dst.put_u8(0);
}

/// Serialize `frame` into a fresh byte vector.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf);
    buf.to_vec()
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP wire protocol.
///
/// The decoder parses directly from the caller's read buffer: a complete
/// frame is split off the front and any trailing bytes stay in place for the
/// next call. Both NUL-terminated and `content-length` delimited bodies are
/// supported.
#[derive(Debug, Clone)]
pub struct StompCodec {
    max_frame_size: usize,
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec that rejects frames larger than `max_frame_size` bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = CodecError;

    /// Decode one frame from the front of `src`.
    ///
    /// Returns
    /// - `Ok(Some(Frame))` when a full frame was decoded; its bytes (and any
    ///   EOLs before it) are removed from `src`.
    /// - `Ok(None)` when more bytes are required; `src` is left untouched.
    /// - `Err(CodecError::Protocol)` when the bytes cannot be a valid frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_with_limit(src.chunk(), 0, self.max_frame_size)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst);
        Ok(())
    }
}
