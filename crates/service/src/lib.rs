//! Service composition: configuration, lifecycle, and the operation
//! dispatcher.
//!
//! The transport layer (HTTP parsing, static assets, the browser UI) lives
//! outside this workspace; it consumes [`Service::dispatch`] with an
//! operation name and a string parameter map and gets back a JSON value or
//! one of the engine's error kinds.

pub mod config;
pub mod dispatch;
pub mod error;
mod service;

pub use crate::config::Config;
pub use crate::dispatch::Params;
pub use crate::service::Service;
