//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the decoding crates:
//! - Logging and tracing infrastructure
//! - Runtime error type
//!
//! ## Overview
//!
//! Library crates in this workspace only emit `tracing` events. This crate
//! owns the subscriber side so every host wires logging the same way.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
