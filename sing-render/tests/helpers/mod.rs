//! Test Helper Utilities
//!
//! Shared utilities for testing sing-render

#![allow(dead_code)]

pub mod mock_engine;
pub mod score;

pub use mock_engine::MockEngine;
pub use score::{note, singer, snapshot, track, Harness, MOCK_ENGINE_ID, MOCK_FRAME_RATE};
