//! Common utilities for docbridge
//!
//! This crate provides the shared error taxonomy used across all docbridge
//! crates.

pub mod error;

pub use error::{BridgeError, Result};
