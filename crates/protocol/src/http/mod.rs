//! Minimal HTTP/1.1 framing over tokio streams.
//!
//! The daemon serves a small, fixed surface on a local network; requests are
//! parsed and responses written directly over the TCP stream, one request per
//! connection. The module provides:
//!
//! - request-line and header parsing with hard limits ([`request`])
//! - response construction, streamed-body heads, and server-sent-event
//!   framing ([`response`])
//! - a streaming `multipart/form-data` reader with bounded buffering
//!   ([`multipart`])

pub mod multipart;
pub mod request;
pub mod response;

pub use multipart::{boundary_from_content_type, MultipartReader, PartHeaders};
pub use request::{percent_decode, Method, Request};
pub use response::{sse_comment, sse_event, Response, Status};
