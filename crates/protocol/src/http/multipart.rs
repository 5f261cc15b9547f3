//! Streaming `multipart/form-data` reader.
//!
//! Parts are surfaced one at a time and their bodies drained in bounded
//! chunks; the reader never holds more than [`CHUNK_EMIT_SIZE`] plus one
//! delimiter length in memory, so arbitrarily large uploads stream straight
//! to disk.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::HttpError;

/// Emit a body chunk once this much payload is buffered without a boundary
/// in sight.
pub const CHUNK_EMIT_SIZE: usize = 64 * 1024;

/// Cap on one part's header block.
pub const MAX_PART_HEADER_BYTES: usize = 8 * 1024;

/// Parsed headers of a single part.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    /// `name` parameter of Content-Disposition.
    pub name: Option<String>,
    /// `filename` parameter of Content-Disposition; presence marks a file
    /// part even when the value is empty.
    pub filename: Option<String>,
    /// Part Content-Type, if sent.
    pub content_type: Option<String>,
}

/// Extract the boundary token from a `Content-Type` header value.
///
/// Returns `None` unless the value is `multipart/form-data` with a non-empty
/// boundary parameter.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let mut parts = value.split(';');
    let media_type = parts.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    for param in parts {
        if let Some((key, val)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("boundary") {
                let val = val.trim();
                let val = val
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(val);
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first boundary.
    Preamble,
    /// A boundary was just consumed; part headers come next.
    AtHeaders,
    /// Inside a part body.
    InPart,
    /// Final boundary seen.
    Finished,
}

/// Incremental multipart reader over any byte stream.
pub struct MultipartReader<R> {
    reader: R,
    /// `\r\n--` + boundary; every boundary in the body matches this.
    delimiter: Vec<u8>,
    buf: BytesMut,
    state: State,
}

impl<R: AsyncRead + Unpin> MultipartReader<R> {
    /// Create a reader for a body using `boundary`.
    pub fn new(reader: R, boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        // Seed the buffer with CRLF so the very first boundary, which the
        // wire format does not prefix with one, matches the same delimiter
        // as every later boundary.
        let mut buf = BytesMut::with_capacity(CHUNK_EMIT_SIZE + delimiter.len());
        buf.extend_from_slice(b"\r\n");

        Self {
            reader,
            delimiter,
            buf,
            state: State::Preamble,
        }
    }

    /// Advance to the next part and return its headers, or `None` after the
    /// final boundary. Any unread body of the current part is drained first.
    pub async fn next_part(&mut self) -> Result<Option<PartHeaders>, HttpError> {
        loop {
            match self.state {
                State::Finished => return Ok(None),
                State::InPart => {
                    while self.chunk().await?.is_some() {}
                }
                State::Preamble => self.skip_preamble().await?,
                State::AtHeaders => {
                    let headers = self.read_part_headers().await?;
                    self.state = State::InPart;
                    return Ok(Some(headers));
                }
            }
        }
    }

    /// Next chunk of the current part's body, or `None` at the part's end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        if self.state != State::InPart {
            return Ok(None);
        }
        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                if pos > 0 {
                    return Ok(Some(self.buf.split_to(pos).freeze()));
                }
                self.buf.advance(self.delimiter.len());
                self.read_delimiter_tail().await?;
                return Ok(None);
            }

            // No boundary in view. Emit everything except a tail that could
            // be the start of a split delimiter, once enough has piled up.
            if self.buf.len() >= CHUNK_EMIT_SIZE {
                let safe = self.buf.len() - (self.delimiter.len() - 1);
                return Ok(Some(self.buf.split_to(safe).freeze()));
            }

            if self.fill().await? == 0 {
                return Err(HttpError::Malformed(
                    "truncated multipart body".to_string(),
                ));
            }
        }
    }

    async fn fill(&mut self) -> Result<usize, HttpError> {
        Ok(self.reader.read_buf(&mut self.buf).await?)
    }

    /// Discard everything up to and through the first boundary.
    async fn skip_preamble(&mut self) -> Result<(), HttpError> {
        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                self.buf.advance(pos + self.delimiter.len());
                return self.read_delimiter_tail().await;
            }
            let keep = (self.delimiter.len() - 1).min(self.buf.len());
            let discard = self.buf.len() - keep;
            self.buf.advance(discard);
            if self.fill().await? == 0 {
                return Err(HttpError::Malformed(
                    "missing multipart boundary".to_string(),
                ));
            }
        }
    }

    /// Consume the two bytes after a delimiter: `--` ends the body, CRLF
    /// starts the next part's headers.
    async fn read_delimiter_tail(&mut self) -> Result<(), HttpError> {
        while self.buf.len() < 2 {
            if self.fill().await? == 0 {
                return Err(HttpError::Malformed(
                    "truncated multipart body".to_string(),
                ));
            }
        }
        if &self.buf[..2] == b"--" {
            self.buf.advance(2);
            self.state = State::Finished;
        } else if &self.buf[..2] == b"\r\n" {
            self.buf.advance(2);
            self.state = State::AtHeaders;
        } else {
            return Err(HttpError::Malformed(
                "malformed multipart boundary".to_string(),
            ));
        }
        Ok(())
    }

    async fn read_part_headers(&mut self) -> Result<PartHeaders, HttpError> {
        let mut headers = PartHeaders::default();
        let mut consumed = 0usize;
        loop {
            match find(&self.buf, b"\r\n") {
                Some(0) => {
                    self.buf.advance(2);
                    return Ok(headers);
                }
                Some(pos) => {
                    consumed += pos + 2;
                    if consumed > MAX_PART_HEADER_BYTES {
                        return Err(HttpError::TooLarge("multipart part headers".to_string()));
                    }
                    let line = self.buf.split_to(pos);
                    self.buf.advance(2);
                    parse_header_line(&String::from_utf8_lossy(&line), &mut headers);
                }
                None => {
                    if self.buf.len() > MAX_PART_HEADER_BYTES {
                        return Err(HttpError::TooLarge("multipart part headers".to_string()));
                    }
                    if self.fill().await? == 0 {
                        return Err(HttpError::Malformed(
                            "truncated multipart headers".to_string(),
                        ));
                    }
                }
            }
        }
    }
}

fn parse_header_line(line: &str, headers: &mut PartHeaders) {
    let Some((name, value)) = line.split_once(':') else {
        return;
    };
    let value = value.trim();
    if name.trim().eq_ignore_ascii_case("content-disposition") {
        for param in value.split(';').skip(1) {
            if let Some((key, val)) = param.split_once('=') {
                let val = unquote(val.trim());
                match key.trim().to_ascii_lowercase().as_str() {
                    "name" => headers.name = Some(val),
                    "filename" => headers.filename = Some(val),
                    _ => {}
                }
            }
        }
    } else if name.trim().eq_ignore_ascii_case("content-type") {
        headers.content_type = Some(value.to_string());
    }
}

/// Strip surrounding quotes and unescape `\"` / `\\`.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
