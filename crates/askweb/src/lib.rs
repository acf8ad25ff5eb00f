//! Public facade crate for `askweb`.
//!
//! This crate intentionally contains no IO, model, or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `askweb-core`.

pub use askweb_core::*;
