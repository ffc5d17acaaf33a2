//! Score and engine data types
//!
//! Score types (`Note`, `Tempo`, `Track`, ...) serialize in camelCase to
//! match the editor's score documents. Engine-facing types (`EngineNote`,
//! `FramePhoneme`, `FrameAudioQuery`) serialize in snake_case to match the
//! synthesis engine's API.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Note identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Synthesis engine identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(pub String);

impl EngineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Voice style identifier (the engine's "speaker" parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(pub i64);

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Declares an opaque content-hash key newtype.
macro_rules! content_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(hash: impl Into<String>) -> Self {
                Self(hash.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

content_key!(
    /// Content hash of a phrase's identity (track, notes, timing)
    PhraseKey
);
content_key!(
    /// Content hash of a query generation source
    FrameAudioQueryKey
);
content_key!(
    /// Content hash of a singing volume generation source
    SingingVolumeKey
);
content_key!(
    /// Content hash of a singing voice synthesis source
    SingingVoiceKey
);

// ============================================================================
// Score
// ============================================================================

/// A single note on a track. Positions and durations are in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub position: i64,
    pub duration: i64,
    pub note_number: i32,
    pub lyric: String,
}

impl Note {
    /// Tick position where the note ends
    pub fn end(&self) -> i64 {
        self.position + self.duration
    }

    pub fn is_valid(&self) -> bool {
        self.position >= 0 && self.duration >= 1 && (0..=127).contains(&self.note_number)
    }
}

/// Tempo change at a tick position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub position: i64,
    pub bpm: f64,
}

impl Tempo {
    pub fn is_valid(&self) -> bool {
        self.position >= 0 && self.bpm.is_finite() && self.bpm > 0.0
    }
}

/// Tempo maps must start at tick 0 and contain only valid tempos
pub fn validate_tempos(tempos: &[Tempo]) -> Result<()> {
    match tempos.first() {
        None => Err(Error::InvalidInput("tempo map is empty".to_string())),
        Some(first) if first.position != 0 => Err(Error::InvalidInput(format!(
            "first tempo must be at tick 0, found {}",
            first.position
        ))),
        _ => match tempos.iter().find(|t| !t.is_valid()) {
            Some(bad) => Err(Error::InvalidInput(format!("invalid tempo: {:?}", bad))),
            None => Ok(()),
        },
    }
}

/// Voice assigned to a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Singer {
    pub engine_id: EngineId,
    pub style_id: StyleId,
}

/// Marker in edit curves for frames without user data
pub const VALUE_INDICATING_NO_DATA: f64 = -1.0;

pub const KEY_RANGE_ADJUSTMENT_LIMIT: i32 = 28;
pub const VOLUME_RANGE_ADJUSTMENT_LIMIT: i32 = 20;

/// A score track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub singer: Option<Singer>,
    /// Semitone transposition applied when talking to the engine
    #[serde(default)]
    pub key_range_adjustment: i32,
    /// Track gain in decibels
    #[serde(default)]
    pub volume_range_adjustment: i32,
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Absolute-frame pitch curve (Hz) at the editor frame rate; -1 = no edit
    #[serde(default)]
    pub pitch_edit_data: Vec<f64>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            singer: None,
            key_range_adjustment: 0,
            volume_range_adjustment: 0,
            notes: Vec::new(),
            pitch_edit_data: Vec::new(),
        }
    }

    /// Check adjustments, notes and edit data; reports the first violation
    pub fn validate(&self) -> Result<()> {
        if self.key_range_adjustment.abs() > KEY_RANGE_ADJUSTMENT_LIMIT {
            return Err(Error::InvalidInput(format!(
                "key range adjustment {} outside ±{}",
                self.key_range_adjustment, KEY_RANGE_ADJUSTMENT_LIMIT
            )));
        }
        if self.volume_range_adjustment.abs() > VOLUME_RANGE_ADJUSTMENT_LIMIT {
            return Err(Error::InvalidInput(format!(
                "volume range adjustment {} outside ±{}",
                self.volume_range_adjustment, VOLUME_RANGE_ADJUSTMENT_LIMIT
            )));
        }
        if let Some(note) = self.notes.iter().find(|n| !n.is_valid()) {
            return Err(Error::InvalidInput(format!("invalid note {}", note.id)));
        }
        let valid_pitch = |v: &f64| v.is_finite() && (*v > 0.0 || *v == VALUE_INDICATING_NO_DATA);
        if let Some(index) = self.pitch_edit_data.iter().position(|v| !valid_pitch(v)) {
            return Err(Error::InvalidInput(format!(
                "invalid pitch edit value at frame {}",
                index
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Note (or rest) in the request sent to the engine
///
/// Rests have no `key` and an empty lyric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    pub key: Option<i32>,
    pub frame_length: i64,
    pub lyric: String,
}

impl EngineNote {
    pub fn rest(frame_length: i64) -> Self {
        Self {
            id: None,
            key: None,
            frame_length,
            lyric: String::new(),
        }
    }
}

/// Phoneme with its length in frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePhoneme {
    pub phoneme: String,
    pub frame_length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
}

/// Phoneme marking silence
pub const PAU: &str = "pau";

/// Phonemes without pitch
pub const UNVOICED_PHONEMES: [&str; 11] = [
    "pau", "cl", "ch", "f", "h", "k", "p", "s", "sh", "t", "ts",
];

/// Frame-level phonetic/timing query, tagged with its frame rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAudioQuery {
    pub f0: Vec<f64>,
    pub volume: Vec<f64>,
    pub phonemes: Vec<FramePhoneme>,
    pub volume_scale: f64,
    pub output_sampling_rate: u32,
    pub output_stereo: bool,
    pub frame_rate: f64,
}

impl FrameAudioQuery {
    /// Total frame length of all phonemes
    pub fn phoneme_frame_length(&self) -> i64 {
        self.phonemes.iter().map(|p| p.frame_length).sum()
    }

    /// Space-separated phoneme string (for logs)
    pub fn phoneme_text(&self) -> String {
        self.phonemes
            .iter()
            .map(|p| p.phoneme.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Expand phonemes into a per-frame phoneme list
    pub fn frame_phonemes(&self) -> Vec<&str> {
        let mut frames = Vec::with_capacity(self.phoneme_frame_length().max(0) as usize);
        for phoneme in &self.phonemes {
            for _ in 0..phoneme.frame_length.max(0) {
                frames.push(phoneme.phoneme.as_str());
            }
        }
        frames
    }
}

/// Frame-level volume envelope
pub type SingingVolume = Vec<f64>;

/// Rendered voice audio (WAV bytes as returned by the engine)
#[derive(Clone, PartialEq)]
pub struct SingingVoice {
    pub wav: Vec<u8>,
}

impl fmt::Debug for SingingVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingingVoice")
            .field("bytes", &self.wav.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(position: i64, duration: i64, note_number: i32) -> Note {
        Note {
            id: NoteId::new(),
            position,
            duration,
            note_number,
            lyric: "ら".to_string(),
        }
    }

    #[test]
    fn test_note_validity() {
        assert!(note(0, 1, 0).is_valid());
        assert!(note(480, 480, 127).is_valid());
        assert!(!note(-1, 480, 60).is_valid());
        assert!(!note(0, 0, 60).is_valid());
        assert!(!note(0, 480, 128).is_valid());
    }

    #[test]
    fn test_track_validation() {
        let mut track = Track::new("t");
        track.notes.push(note(0, 480, 60));
        assert!(track.validate().is_ok());

        track.key_range_adjustment = 29;
        assert!(matches!(track.validate(), Err(Error::InvalidInput(_))));
        track.key_range_adjustment = -28;
        assert!(track.validate().is_ok());

        track.volume_range_adjustment = 21;
        assert!(track.validate().is_err());
        track.volume_range_adjustment = 0;

        track.pitch_edit_data = vec![VALUE_INDICATING_NO_DATA, 440.0];
        assert!(track.validate().is_ok());
        track.pitch_edit_data.push(0.0);
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_tempo_validation() {
        assert!(validate_tempos(&[]).is_err());
        let tempo = |position, bpm| Tempo { position, bpm };
        assert!(validate_tempos(&[tempo(10, 120.0)]).is_err());
        assert!(validate_tempos(&[tempo(0, 0.0)]).is_err());
        assert!(validate_tempos(&[tempo(0, 120.0)]).is_ok());
    }

    #[test]
    fn test_frame_phonemes_expand() {
        let query = FrameAudioQuery {
            f0: vec![0.0; 3],
            volume: vec![0.0; 3],
            phonemes: vec![
                FramePhoneme {
                    phoneme: "pau".into(),
                    frame_length: 1,
                    note_id: None,
                },
                FramePhoneme {
                    phoneme: "a".into(),
                    frame_length: 2,
                    note_id: None,
                },
            ],
            volume_scale: 1.0,
            output_sampling_rate: 24000,
            output_stereo: false,
            frame_rate: 93.75,
        };
        assert_eq!(query.frame_phonemes(), vec!["pau", "a", "a"]);
        assert_eq!(query.phoneme_text(), "pau a");
        assert_eq!(query.phoneme_frame_length(), 3);
    }

    #[test]
    fn test_score_serializes_camel_case() {
        let json = serde_json::to_value(note(0, 480, 60)).unwrap();
        assert!(json.get("noteNumber").is_some());
        let rest = serde_json::to_value(EngineNote::rest(5)).unwrap();
        assert_eq!(rest["frame_length"], 5);
        assert!(rest["key"].is_null());
        assert!(rest.get("id").is_none());
    }
}
