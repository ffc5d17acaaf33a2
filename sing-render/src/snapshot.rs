//! Immutable score snapshot consumed by one render call

use serde::{Deserialize, Serialize};
use sing_common::models::{validate_tempos, EngineId, Tempo, Track, TrackId};
use sing_common::music::DEFAULT_TPQN;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Editor frame rate used by pitch edit curves
pub const DEFAULT_EDITOR_FRAME_RATE: f64 = 93.75;

/// Full score state at one instant
///
/// Created by the caller on every relevant state change; the pipeline only
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_tpqn")]
    pub tpqn: u32,
    pub tempos: Vec<Tempo>,
    pub tracks: BTreeMap<TrackId, Track>,
    #[serde(default)]
    pub engine_frame_rates: BTreeMap<EngineId, f64>,
    #[serde(default = "default_editor_frame_rate")]
    pub editor_frame_rate: f64,
}

fn default_tpqn() -> u32 {
    DEFAULT_TPQN
}

fn default_editor_frame_rate() -> f64 {
    DEFAULT_EDITOR_FRAME_RATE
}

impl Snapshot {
    pub fn track(&self, track_id: TrackId) -> Result<&Track> {
        self.tracks
            .get(&track_id)
            .ok_or(Error::TrackNotFound(track_id))
    }

    pub fn engine_frame_rate(&self, engine_id: &EngineId) -> Result<f64> {
        self.engine_frame_rates
            .get(engine_id)
            .copied()
            .ok_or_else(|| Error::FrameRateNotFound(engine_id.clone()))
    }

    /// Validate tempo map and every track
    pub fn validate(&self) -> Result<()> {
        if self.tpqn == 0 {
            return Err(
                sing_common::Error::InvalidInput("tpqn must be positive".to_string()).into(),
            );
        }
        validate_tempos(&self.tempos)?;
        for track in self.tracks.values() {
            track.validate()?;
        }
        Ok(())
    }
}
