//! Error types for sing-render
//!
//! Precondition violations of the rendering pipeline surface as
//! [`Error::Invariant`]; they indicate that a caller broke the
//! delete-then-execute ordering and are never recovered locally.

use sing_common::models::{EngineId, PhraseKey, TrackId};
use thiserror::Error;

/// Main error type for the phrase renderer
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from shared code (hashing, config, validation)
    #[error(transparent)]
    Common(#[from] sing_common::Error),

    /// Transport-level failure talking to the engine
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Engine answered with a non-success status or unusable data
    #[error("Engine error: {0}")]
    Engine(String),

    /// Engine response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Pipeline precondition violated by the caller
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Stage name not recognized
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// Phrase key not present in the registry
    #[error("Phrase not found: {0}")]
    PhraseNotFound(PhraseKey),

    /// Track id not present in the snapshot
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    /// Snapshot carries no frame rate for the engine
    #[error("Frame rate not found for engine: {0}")]
    FrameRateNotFound(EngineId),

    /// No base URL configured for the engine
    #[error("Unknown engine: {0}")]
    UnknownEngine(EngineId),

    /// Pitch edit data could not be applied to a query
    #[error("Pitch edit error: {0}")]
    PitchEdit(String),
}

/// Convenience Result type using sing-render Error
pub type Result<T> = std::result::Result<T, Error>;
