//! # LanShare Daemon Library
//!
//! This crate provides the daemon (server) functionality for LanShare,
//! exposing one sandboxed directory tree to the local network over HTTP.
//!
//! ## Overview
//!
//! The daemon is the service that runs on the machine whose files you want
//! to share. It provides:
//!
//! - **Sandboxed File Operations**: browse, upload, download, rename, move,
//!   create folders, and delete, all confined to one root directory
//! - **Depth Policy**: folder nesting below the root is bounded
//! - **Live Updates**: every mutation is broadcast to connected browsers
//!   over server-sent events
//! - **Embedded Client**: a single-page browsing UI served at `/`
//!
//! There is no authentication; the daemon is meant for trusted local
//! networks only.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          HTTP Server                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                        Router                            │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │   Sandbox    │  │  File Tree   │  │      Change Bus      │  │
//! │  │  (resolve)   │  │ (operations) │  │  (fan-out queues)    │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘  │
//! │                                              │                   │
//! │                                   ┌──────────┴───────────┐      │
//! │                                   │ Notification Streams │      │
//! │                                   └──────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use daemon::config::Config;
//! use daemon::events::ChangeBus;
//! use daemon::files::{FileTree, Sandbox};
//! use daemon::router::Router;
//! use daemon::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let sandbox = Sandbox::open(&config.share.root_dir, config.share.max_depth)?;
//!     let bus = ChangeBus::new(config.events.queue_capacity);
//!     let files = FileTree::new(sandbox, bus.clone());
//!     let keep_alive = Duration::from_secs(config.events.keep_alive_secs);
//!     let router = Arc::new(Router::new(files, bus, keep_alive));
//!
//!     let server = Server::bind(config.socket_addr()?, router).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Sandbox path resolution and file-tree operations
//! - [`events`]: Change bus and per-connection notification streams
//! - [`router`]: Request dispatch and response mapping
//! - [`server`]: TCP accept loop

pub mod config;
pub mod events;
pub mod files;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export files types for convenience
pub use files::{FileTree, Sandbox};

// Re-export events types for convenience
pub use events::{ChangeBus, NotificationStream, Subscription};

// Re-export router and server types for convenience
pub use router::Router;
pub use server::Server;
