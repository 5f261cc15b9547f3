//! HTTP request parsing.
//!
//! Requests are read line-by-line from a buffered stream with hard limits on
//! line length and header count. The request target is percent-decoded here
//! so the rest of the daemon only ever sees plain path strings.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::HttpError;

/// Maximum length of the request line in bytes.
pub const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Maximum length of a single header line in bytes.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Maximum number of headers accepted per request.
pub const MAX_HEADERS: usize = 64;

/// Request methods the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn parse(token: &str) -> Result<Self, HttpError> {
        match token {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            other => Err(HttpError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// A parsed request head: method, decoded path, and headers.
///
/// The body, if any, stays on the stream; callers read it through the same
/// reader using [`Request::content_length`].
#[derive(Debug)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Percent-decoded path, query string stripped.
    pub path: String,
    /// Raw header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Read and parse one request head from `reader`.
    ///
    /// Returns `Ok(None)` when the peer closed the connection before sending
    /// anything.
    pub async fn read_from<R: AsyncBufRead + Unpin>(
        reader: &mut R,
    ) -> Result<Option<Request>, HttpError> {
        let line = match read_crlf_line(reader, MAX_REQUEST_LINE).await? {
            Some(line) => line,
            None => return Ok(None),
        };

        let mut parts = line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| HttpError::Malformed("empty request line".to_string()))?;
        let target = parts
            .next()
            .ok_or_else(|| HttpError::Malformed("missing request target".to_string()))?;
        let version = parts
            .next()
            .ok_or_else(|| HttpError::Malformed("missing HTTP version".to_string()))?;
        if !version.starts_with("HTTP/1.") {
            return Err(HttpError::Malformed(format!(
                "unsupported version: {}",
                version
            )));
        }

        let method = Method::parse(method)?;

        // Strip the query string before decoding so an encoded '?' in a file
        // name survives.
        let raw_path = target.split('?').next().unwrap_or(target);
        let path = percent_decode(raw_path);
        if path.contains('\0') {
            return Err(HttpError::Malformed("NUL byte in path".to_string()));
        }

        let mut headers = Vec::new();
        loop {
            let line = read_crlf_line(reader, MAX_HEADER_LINE)
                .await?
                .ok_or_else(|| HttpError::Malformed("connection closed in headers".to_string()))?;
            if line.is_empty() {
                break;
            }
            if headers.len() >= MAX_HEADERS {
                return Err(HttpError::TooLarge("too many headers".to_string()));
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::Malformed(format!("bad header line: {}", line)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Some(Request {
            method,
            path,
            headers,
        }))
    }

    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed Content-Length, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }
}

/// Read one CRLF-terminated line, rejecting lines longer than `limit`.
///
/// Returns `Ok(None)` on clean EOF before any bytes arrive.
async fn read_crlf_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<String>, HttpError> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(HttpError::Malformed(
                "connection closed mid-line".to_string(),
            ));
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                if buf.len() > limit {
                    return Err(HttpError::TooLarge("line too long".to_string()));
                }
                break;
            }
            None => {
                let n = available.len();
                buf.extend_from_slice(available);
                reader.consume(n);
                if buf.len() > limit {
                    return Err(HttpError::TooLarge("line too long".to_string()));
                }
            }
        }
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| HttpError::Malformed("non-UTF-8 bytes in request head".to_string()))
}

/// Decode `%XX` escapes; `+` is left alone (path context, not form data).
///
/// Invalid escapes pass through verbatim; decoding never fails.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(byte: Option<&u8>) -> Option<u8> {
    match byte.copied() {
        Some(b @ b'0'..=b'9') => Some(b - b'0'),
        Some(b @ b'a'..=b'f') => Some(b - b'a' + 10),
        Some(b @ b'A'..=b'F') => Some(b - b'A' + 10),
        _ => None,
    }
}
