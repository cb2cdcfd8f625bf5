//! # servant
//!
//! A small HTTP front-end that exposes configured shell commands, file trees
//! and (pluggable) database handlers under one URL scheme:
//!
//! ```text
//! /<resource>/<group>/<item>[/<tail>][?query]
//! ```
//!
//! Every request gets its own [`Session`](session::Session) and passes three
//! gates in the dispatcher before any handler runs: authentication,
//! permission, and resource lookup. Failures are reported through the
//! `X-Servant-Err` response header together with the status code.
//!
//! Alongside the listener, configured daemons and timers run as detached
//! background threads (see [`daemon`]).
//!
//! ## Example
//!
//! ```no_run
//! use servant::config::Config;
//! use servant::server::Server;
//!
//! let config = Config::load("servant.yaml")?;
//! let handle = Server::builder(config).build().start()?;
//! handle.join().ok();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod params;
pub mod registry;
pub mod resources;
pub mod runtime_config;
pub mod security;
pub mod server;
pub mod session;
pub mod uri;

pub use config::Config;
pub use error::{ServantError, SERVANT_ERR_HEADER};
pub use registry::{Handler, HandlerFactory, Resource, ResourceRegistry};
pub use server::{Server, ServerBuilder, ServerHandle};
pub use session::{Reply, Session};
