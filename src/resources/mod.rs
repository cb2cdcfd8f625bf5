//! Built-in resource handlers.
//!
//! Each submodule provides a [`HandlerFactory`](crate::registry::HandlerFactory)
//! that [`ServerBuilder`](crate::server::ServerBuilder) registers by default.
//! `databases` has no built-in handler; embedders register their own.

pub mod commands;
pub mod files;
