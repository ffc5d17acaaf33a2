//! # Sing Render Library (sing-render)
//!
//! Staged, content-addressed rendering of singing phrases.
//!
//! **Purpose:** Turn each phrase of a score into audio through three stages
//! (query generation, singing volume generation, singing voice synthesis),
//! recomputing only the stages whose inputs changed since the last render.
//!
//! **Architecture:** Each stage hashes its inputs into a key. Keys index a
//! long-lived artifact cache and are bound to the phrase; a stale or missing
//! binding triggers a cascading re-render from that stage onward.

pub mod deps;
pub mod engine;
pub mod error;
pub mod in_flight;
pub mod phrase;
pub mod pitch_edit;
pub mod renderer;
pub mod segmentation;
pub mod snapshot;
pub mod stages;
pub mod store;

pub use deps::ExternalDependencies;
pub use engine::{HttpEngineClient, SingingEngine};
pub use error::{Error, Result};
pub use phrase::{Phrase, PhraseMap, PhraseRegistry};
pub use renderer::PhraseRenderer;
pub use snapshot::Snapshot;
pub use stages::StageId;
pub use store::{ArtifactStore, MemoryStore};
