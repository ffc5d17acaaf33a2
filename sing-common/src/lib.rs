//! # Sing Common Library
//!
//! Shared code for the singing phrase renderer including:
//! - Score and engine data types
//! - Content hashing for stage sources
//! - Tempo-aware timing conversions
//! - Configuration loading

pub mod config;
pub mod error;
pub mod hash;
pub mod models;
pub mod music;

pub use error::{Error, Result};
pub use hash::content_hash;
