//! Core types, codec, error codes and configuration for Folio.
//!
//! This crate provides the foundational types used throughout the library server core:
//! - Record types for books, contributors, series, collections, users and sessions
//! - Identifier generation
//! - Postcard codec with snafu errors
//! - Machine-readable error codes
//! - Validated configuration sections

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::{CodecError, decode, encode};
pub use error::ErrorCode;
pub use types::*;
