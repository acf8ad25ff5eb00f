//! `askweb-server` library surface.
//!
//! The `askweb` binary wires these together; they are exposed as a library so the HTTP
//! endpoint and the assistant registry can be embedded or tested without spawning a process.

pub mod assistant;
pub mod config;
pub mod http;

pub use askweb_core as core;
