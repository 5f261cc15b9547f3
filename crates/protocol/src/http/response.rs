//! HTTP response construction and server-sent-event framing.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::messages::{ChangeEvent, ErrorBody};

/// Response statuses the daemon emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    LengthRequired,
    PayloadTooLarge,
    InternalServerError,
}

impl Status {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::Conflict => 409,
            Status::LengthRequired => 411,
            Status::PayloadTooLarge => 413,
            Status::InternalServerError => 500,
        }
    }

    /// Canonical reason phrase.
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::Conflict => "Conflict",
            Status::LengthRequired => "Length Required",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete, buffered response: status, headers, body.
///
/// Streamed bodies (downloads, event streams) bypass this type and use
/// [`send_head`] followed by direct writes.
#[derive(Debug)]
pub struct Response {
    status: Status,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    /// JSON response from any serializable body.
    pub fn json<T: Serialize>(status: Status, body: &T) -> Response {
        match serde_json::to_vec(body) {
            Ok(bytes) => Response {
                status,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: bytes,
            },
            // Serialization of our own message types cannot realistically
            // fail, but a 500 beats a panic if it ever does.
            Err(e) => Response::error(
                Status::InternalServerError,
                format!("response encoding failed: {}", e),
            ),
        }
    }

    /// Standard `{"error": ...}` response.
    pub fn error(status: Status, message: impl Into<String>) -> Response {
        let body = serde_json::to_vec(&ErrorBody::new(message)).unwrap_or_default();
        Response {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    /// Static HTML response.
    pub fn html(body: &'static str) -> Response {
        Response {
            status: Status::Ok,
            headers: vec![(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: body.as_bytes().to_vec(),
        }
    }

    /// Bodyless response.
    pub fn empty(status: Status) -> Response {
        Response {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Response {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Status of this response.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Serialized body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Write the full response and flush. The connection closes afterwards.
    pub async fn send<W: AsyncWrite + Unpin>(self, writer: &mut W) -> io::Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        writer.write_all(head.as_bytes()).await?;
        writer.write_all(&self.body).await?;
        writer.flush().await
    }
}

/// Write a response head only, for bodies streamed by the caller
/// (file downloads, event streams).
pub async fn send_head<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: Status,
    headers: &[(&str, &str)],
) -> io::Result<()> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason());
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await
}

/// Encode one change event as a server-sent-event frame.
pub fn sse_event(event: &ChangeEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.kind, event.path)
}

/// Encode an SSE comment line (used for keep-alives).
pub fn sse_comment(text: &str) -> String {
    format!(": {}\n\n", text)
}
