//! # LanShare Wire Layer
//!
//! This crate provides the wire-level building blocks for the LanShare
//! file-sharing daemon.
//!
//! ## Overview
//!
//! Everything the daemon puts on or reads off a socket lives here:
//!
//! - **HTTP Framing**: request parsing, response writing, and server-sent
//!   event frames over tokio streams
//! - **Multipart Streaming**: a bounded-memory `multipart/form-data` reader
//!   for uploads of unbounded size
//! - **API Messages**: the JSON bodies of every endpoint, plus the
//!   change-event type pushed to browsers
//! - **Error Taxonomy**: one variant per user-visible failure, each with a
//!   fixed HTTP status
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          API Messages (JSON)            │  serde_json bodies
//! ├─────────────────────────────────────────┤
//! │   HTTP/1.1 Framing · SSE · Multipart    │  one request per connection
//! ├─────────────────────────────────────────┤
//! │            Transport (TCP)              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`http`]: request/response framing, multipart, server-sent events
//! - [`messages`]: API body and change-event definitions
//! - [`error`]: share and transport error types

pub mod error;
pub mod http;
pub mod messages;

pub use error::{HttpError, Result, ShareError};
pub use http::{
    boundary_from_content_type, percent_decode, Method, MultipartReader, PartHeaders, Request,
    Response, Status,
};
pub use messages::{
    format_size, ChangeEvent, CreateFolderRequest, Deleted, DirectoryEntry, ErrorBody,
    FolderCreated, ListResponse, MoveRequest, Moved, RenameRequest, Renamed, UploadFailure,
    UploadResponse, EVENT_CONNECTED, EVENT_FILE_CHANGE,
};
