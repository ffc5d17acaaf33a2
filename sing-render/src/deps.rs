//! Collaborators injected into the renderer
//!
//! Caches persist across phrase churn and are keyed purely by content.
//! Live stores hold the artifacts currently bound to some phrase.

use sing_common::models::{
    FrameAudioQuery, FrameAudioQueryKey, SingingVoice, SingingVoiceKey, SingingVolume,
    SingingVolumeKey,
};
use std::sync::Arc;

use crate::engine::SingingEngine;
use crate::phrase::PhraseRegistry;
use crate::store::{ArtifactStore, MemoryStore};

pub type QueryStore = Arc<dyn ArtifactStore<FrameAudioQueryKey, FrameAudioQuery>>;
pub type SingingVolumeStore = Arc<dyn ArtifactStore<SingingVolumeKey, SingingVolume>>;
pub type SingingVoiceStore = Arc<dyn ArtifactStore<SingingVoiceKey, SingingVoice>>;

/// Caches, live stores, phrase registry and engine used by the stages
#[derive(Clone)]
pub struct ExternalDependencies {
    pub query_cache: QueryStore,
    pub singing_volume_cache: SingingVolumeStore,
    pub singing_voice_cache: SingingVoiceStore,

    pub phrases: Arc<dyn PhraseRegistry>,
    pub phrase_queries: QueryStore,
    pub phrase_singing_volumes: SingingVolumeStore,
    pub phrase_singing_voices: SingingVoiceStore,

    pub engine: Arc<dyn SingingEngine>,
}

impl ExternalDependencies {
    /// Dependencies backed by fresh in-memory caches and live stores
    pub fn in_memory(phrases: Arc<dyn PhraseRegistry>, engine: Arc<dyn SingingEngine>) -> Self {
        Self {
            query_cache: Arc::new(MemoryStore::new()),
            singing_volume_cache: Arc::new(MemoryStore::new()),
            singing_voice_cache: Arc::new(MemoryStore::new()),
            phrases,
            phrase_queries: Arc::new(MemoryStore::new()),
            phrase_singing_volumes: Arc::new(MemoryStore::new()),
            phrase_singing_voices: Arc::new(MemoryStore::new()),
            engine,
        }
    }
}
