//! Common utilities for peggle crates.
//!
//! This crate provides shared infrastructure used across the peggle workspace:
//!
//! - [`debug`] - Per-module logging controlled via `DEBUG` environment variable
//! - [`source`] - Input buffers and offset-to-position conversion

pub mod debug;
pub mod source;

pub use debug::init_logging;
pub use source::{InputBuffer, Position};
