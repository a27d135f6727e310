// Slice-based STOMP frame parser (produces owned frames from input slices)
use thiserror::Error;

use crate::frame::{Command, Frame};

/// Largest frame the parser will wait for, in bytes (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while parsing wire bytes into a [`Frame`].
///
/// None of these are retried: once the byte stream fails to parse, framing is
/// lost and the buffered bytes are of no further use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The command line is not one of the commands this client understands.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    /// A declared `content-length` (or an unterminated frame) exceeds the cap.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    /// `content-length` is present but not a non-negative integer.
    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),
    /// The byte following a length-delimited body is not NUL.
    #[error("missing NUL terminator after content-length body")]
    MissingTerminator,
    /// Command or header text is not valid UTF-8.
    #[error("invalid utf8 in {0}")]
    InvalidUtf8(&'static str),
}

/// Result of a single decode attempt: the frame and how many bytes it
/// occupied, or `None` when more bytes are required.
pub type ParseResult = Result<Option<(Frame, usize)>, ProtocolError>;

/// Extract the optional content-length header value from a header list.
///
/// Returns:
/// - Ok(Some(n)) when a valid content-length header is present.
/// - Ok(None) when no content-length header is present.
/// - Err when content-length is present but not a valid unsigned integer.
///
/// A value made of digits that overflows `usize` saturates so that the
/// size check reports it as too large rather than malformed.
fn get_content_length(headers: &[(String, String)]) -> Result<Option<usize>, ProtocolError> {
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("content-length") {
            let trimmed = v.trim();
            if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ProtocolError::InvalidContentLength(v.clone()));
            }
            return Ok(Some(trimmed.parse::<usize>().unwrap_or(usize::MAX)));
        }
    }
    Ok(None)
}

/// `strip_cr` removes a trailing `\r` left over from a CRLF line ending.
fn line_text(line: &[u8], strip_cr: bool, what: &'static str) -> Result<String, ProtocolError> {
    let line = match line.strip_suffix(b"\r") {
        Some(stripped) if strip_cr => stripped,
        _ => line,
    };
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(what))
}

/// Parse one frame starting at `offset` using [`DEFAULT_MAX_FRAME_SIZE`].
pub fn decode(input: &[u8], offset: usize) -> ParseResult {
    decode_with_limit(input, offset, DEFAULT_MAX_FRAME_SIZE)
}

/// Parse a single STOMP frame from a raw byte slice.
///
/// Returns `Ok(Some((frame, consumed)))` where `consumed` counts bytes from
/// `offset` up to and including the NUL terminator. End-of-line bytes that
/// precede the command are skipped and included in `consumed`.
/// Returns `Ok(None)` when more bytes are required; the caller keeps
/// buffering and calls again with the same `offset`.
///
/// `max_frame_size` bounds both a declared `content-length` and the number
/// of bytes the parser is willing to scan without finding the end of the
/// frame.
pub fn decode_with_limit(input: &[u8], offset: usize, max_frame_size: usize) -> ParseResult {
    let len = input.len();
    let mut pos = offset.min(len);

    // skip EOLs between frames
    while pos < len {
        if input[pos] == b'\n' {
            pos += 1;
        } else if input[pos] == b'\r' && input.get(pos + 1) == Some(&b'\n') {
            pos += 2;
        } else {
            break;
        }
    }
    let start = pos;
    let too_large = |size: usize| ProtocolError::FrameTooLarge {
        size,
        limit: max_frame_size,
    };

    // command line
    let cmd_end_rel = match input[pos..].iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None if len - start > max_frame_size => return Err(too_large(len - start)),
        None => return Ok(None),
    };
    // a frame whose command line ends in CRLF uses CRLF for its header lines too
    let crlf = input[pos..pos + cmd_end_rel].ends_with(b"\r");
    let command: Command = line_text(&input[pos..pos + cmd_end_rel], true, "command")?.parse()?;
    pos += cmd_end_rel + 1;

    // headers until an empty line
    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        if pos >= len {
            return Ok(None);
        }
        if input[pos] == b'\n' {
            pos += 1;
            break;
        }
        if crlf && input[pos] == b'\r' && input.get(pos + 1) == Some(&b'\n') {
            pos += 2;
            break;
        }
        let line_end_rel = match input[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => i,
            None if len - start > max_frame_size => return Err(too_large(len - start)),
            None => return Ok(None),
        };
        let line = line_text(&input[pos..pos + line_end_rel], crlf, "header")?;
        match line.split_once(':') {
            Some((key, value)) => headers.push((key.to_string(), value.to_string())),
            None => return Err(ProtocolError::MalformedHeader(line)),
        }
        pos += line_end_rel + 1;
    }

    let body = match get_content_length(&headers)? {
        Some(content_len) => {
            if content_len > max_frame_size {
                return Err(too_large(content_len));
            }
            // need content_len bytes plus the terminating NUL
            if len - pos <= content_len {
                return Ok(None);
            }
            let body = input[pos..pos + content_len].to_vec();
            pos += content_len;
            if input[pos] != 0 {
                return Err(ProtocolError::MissingTerminator);
            }
            pos += 1;
            body
        }
        None => match input[pos..].iter().position(|&b| b == 0) {
            Some(nul_rel) => {
                let body = input[pos..pos + nul_rel].to_vec();
                pos += nul_rel + 1;
                body
            }
            None if len - start > max_frame_size => return Err(too_large(len - start)),
            None => return Ok(None),
        },
    };

    Ok(Some((
        Frame {
            command,
            headers,
            body,
        },
        pos - offset.min(len),
    )))
}
