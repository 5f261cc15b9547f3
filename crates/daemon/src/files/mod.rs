//! Sandboxed file operations.
//!
//! This module confines every filesystem touch to the configured share
//! root:
//! - Lexical path resolution and depth policy
//! - Directory listing with stable ordering
//! - Streamed, verify-then-rename uploads
//! - Folder creation, rename, move, and delete primitives
//!
//! # Security
//!
//! Client paths are resolved lexically against the share root before any
//! syscall; traversal segments and sibling-prefix collisions are rejected
//! up front, and entry names are reduced to separator-free tokens.

pub mod ops;
pub mod sandbox;

pub use ops::{Download, FileTree, UploadBatch, UploadWriter};
pub use sandbox::{depth_of, parent_of, sanitize_name, Sandbox, DEFAULT_MAX_DEPTH};
