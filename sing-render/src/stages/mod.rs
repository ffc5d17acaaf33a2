//! Pipeline stages
//!
//! Every stage derives a minimal source from the snapshot and phrase, hashes
//! it, and compares the hash against the key bound in the phrase's slot for
//! that stage. Execution reuses a cached artifact for the key when present,
//! otherwise produces one through the engine and caches it.
//!
//! Stage order is fixed: query → singing volume → singing voice. Later
//! stages read earlier stages' artifacts through the phrase's bound keys.

mod curves;
mod notes;
mod query;
mod voice;
mod volume;

pub use curves::{mute_last_pau_section, shift_pitch, shift_volume};
pub use notes::{create_notes_for_request_to_engine, shift_key_of_notes};
pub use query::QueryGenerationStage;
pub use voice::SingingVoiceSynthesisStage;
pub use volume::SingingVolumeGenerationStage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sing_common::config::RenderSettings;
use sing_common::models::{
    FrameAudioQuery, FrameAudioQueryKey, PhraseKey, Singer, SingingVoiceKey, SingingVolume,
    SingingVolumeKey, Track, TrackId,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::deps::ExternalDependencies;
use crate::error::{Error, Result};
use crate::in_flight::KeyedLocks;
use crate::phrase::{KeySlot, Phrase};
use crate::snapshot::Snapshot;
use crate::store::ArtifactStore;

/// Stage identifiers; variants are ordered by execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageId {
    QueryGeneration,
    SingingVolumeGeneration,
    SingingVoiceSynthesis,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::QueryGeneration => "queryGeneration",
            StageId::SingingVolumeGeneration => "singingVolumeGeneration",
            StageId::SingingVoiceSynthesis => "singingVoiceSynthesis",
        }
    }
}

impl FromStr for StageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        stages()
            .iter()
            .map(|stage| stage.id())
            .find(|id| id.as_str() == s)
            .ok_or_else(|| Error::StageNotFound(s.to_string()))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-key locks for each stage's cache
#[derive(Default)]
pub struct RenderLocks {
    pub query: KeyedLocks<FrameAudioQueryKey>,
    pub singing_volume: KeyedLocks<SingingVolumeKey>,
    pub singing_voice: KeyedLocks<SingingVoiceKey>,
}

/// Everything a stage sees during one call
///
/// Read-only score data (`snapshot`, `track_id`, `phrase_key`, `settings`)
/// is kept apart from the mutable collaborator handles (`deps`, `locks`).
pub struct Context<'a> {
    pub snapshot: &'a Snapshot,
    pub track_id: TrackId,
    pub phrase_key: &'a PhraseKey,
    pub settings: &'a RenderSettings,
    pub deps: &'a ExternalDependencies,
    pub locks: &'a RenderLocks,
}

impl Context<'_> {
    pub fn track(&self) -> Result<&Track> {
        self.snapshot.track(self.track_id)
    }

    pub fn phrase(&self) -> Result<Arc<Phrase>> {
        self.deps.phrases.get(self.phrase_key)
    }

    /// Artifact bound to the phrase's query slot
    fn bound_query(&self, phrase: &Phrase) -> Result<Arc<FrameAudioQuery>> {
        let key = phrase
            .query_key
            .get()
            .ok_or_else(|| Error::Invariant("phrase has no bound query key".to_string()))?;
        bound_artifact(
            self.deps.phrase_queries.as_ref(),
            self.deps.query_cache.as_ref(),
            &key,
        )
        .ok_or_else(|| Error::Invariant(format!("query {} is not available", key)))
    }

    /// Artifact bound to the phrase's singing volume slot
    fn bound_singing_volume(&self, phrase: &Phrase) -> Result<Arc<SingingVolume>> {
        let key = phrase
            .singing_volume_key
            .get()
            .ok_or_else(|| Error::Invariant("phrase has no bound singing volume key".to_string()))?;
        bound_artifact(
            self.deps.phrase_singing_volumes.as_ref(),
            self.deps.singing_volume_cache.as_ref(),
            &key,
        )
        .ok_or_else(|| Error::Invariant(format!("singing volume {} is not available", key)))
    }
}

/// One step of the phrase pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// True iff the phrase's bound key is absent or differs from the key of
    /// the current source. Always false for tracks without a singer.
    async fn should_be_executed(&self, context: &Context<'_>) -> Result<bool>;

    /// Unbind this stage's artifact from the phrase. No-op when unbound.
    fn delete_execution_result(&self, context: &Context<'_>) -> Result<()>;

    /// Produce (or reuse) the artifact for the current source and bind it.
    async fn execute(&self, context: &Context<'_>) -> Result<()>;
}

static QUERY_GENERATION: QueryGenerationStage = QueryGenerationStage;
static SINGING_VOLUME_GENERATION: SingingVolumeGenerationStage = SingingVolumeGenerationStage;
static SINGING_VOICE_SYNTHESIS: SingingVoiceSynthesisStage = SingingVoiceSynthesisStage;

/// Stages in execution order
pub fn stages() -> [&'static dyn Stage; 3] {
    [
        &QUERY_GENERATION,
        &SINGING_VOLUME_GENERATION,
        &SINGING_VOICE_SYNTHESIS,
    ]
}

fn singer(track: &Track) -> Result<&Singer> {
    track
        .singer
        .as_ref()
        .ok_or_else(|| Error::Invariant(format!("track '{}' has no singer", track.name)))
}

/// Live artifact for `key`, falling back to the content-addressed cache.
///
/// Live entries are shared by every phrase bound to the same key, so another
/// phrase's unbind may have dropped the live entry; the cache holds the same
/// content under the same key.
fn bound_artifact<K, V>(
    live: &dyn ArtifactStore<K, V>,
    cache: &dyn ArtifactStore<K, V>,
    key: &K,
) -> Option<Arc<V>> {
    live.get(key).or_else(|| cache.get(key))
}

pub(crate) fn unbind<K: Clone, V>(slot: &KeySlot<K>, live: &dyn ArtifactStore<K, V>) {
    if let Some(key) = slot.get() {
        live.delete(&key);
        slot.clear();
    }
}

fn bind<K: Clone + PartialEq, V>(
    slot: &KeySlot<K>,
    live: &dyn ArtifactStore<K, V>,
    key: K,
    artifact: Arc<V>,
) {
    if let Some(old_key) = slot.get() {
        if old_key != key {
            live.delete(&old_key);
        }
    }
    live.set(key.clone(), artifact);
    slot.set(Some(key));
}

fn is_stale<K: PartialEq>(bound: Option<K>, fresh: &K) -> bool {
    match bound {
        Some(bound) => bound != *fresh,
        None => true,
    }
}
