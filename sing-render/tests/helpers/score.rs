//! Score fixtures and a renderer wired to the mock engine

use sing_common::config::RenderSettings;
use sing_common::models::{
    EngineId, Note, NoteId, PhraseKey, Singer, StyleId, Tempo, Track, TrackId,
};
use sing_render::segmentation::generate_phrases;
use sing_render::snapshot::DEFAULT_EDITOR_FRAME_RATE;
use sing_render::stages::{Context, RenderLocks};
use sing_render::{
    ArtifactStore, ExternalDependencies, Phrase, PhraseMap, PhraseRegistry, PhraseRenderer,
    Snapshot,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::MockEngine;

pub const MOCK_ENGINE_ID: &str = "mock-engine";
pub const MOCK_FRAME_RATE: f64 = DEFAULT_EDITOR_FRAME_RATE;

pub fn note(position: i64, duration: i64, note_number: i32, lyric: &str) -> Note {
    Note {
        id: NoteId::new(),
        position,
        duration,
        note_number,
        lyric: lyric.to_string(),
    }
}

pub fn singer(style_id: i64) -> Singer {
    Singer {
        engine_id: EngineId::new(MOCK_ENGINE_ID),
        style_id: StyleId(style_id),
    }
}

/// Single-tempo snapshot containing `tracks`
pub fn snapshot(tracks: Vec<(TrackId, Track)>) -> Snapshot {
    let mut engine_frame_rates = BTreeMap::new();
    engine_frame_rates.insert(EngineId::new(MOCK_ENGINE_ID), MOCK_FRAME_RATE);
    Snapshot {
        tpqn: 480,
        tempos: vec![Tempo {
            position: 0,
            bpm: 120.0,
        }],
        tracks: tracks.into_iter().collect(),
        engine_frame_rates,
        editor_frame_rate: DEFAULT_EDITOR_FRAME_RATE,
    }
}

pub fn track(singer: Option<Singer>, notes: Vec<Note>) -> Track {
    let mut track = Track::new("vocal");
    track.singer = singer;
    track.notes = notes;
    track
}

/// Renderer, registry and engine for one test
pub struct Harness {
    pub engine: Arc<MockEngine>,
    pub phrases: Arc<PhraseMap>,
    pub renderer: PhraseRenderer,
    pub locks: RenderLocks,
}

impl Harness {
    pub fn new() -> Self {
        let engine = Arc::new(MockEngine::new());
        let phrases = Arc::new(PhraseMap::new());
        let deps = ExternalDependencies::in_memory(phrases.clone(), engine.clone());
        Self {
            engine,
            phrases,
            renderer: PhraseRenderer::new(deps, RenderSettings::default()),
            locks: RenderLocks::default(),
        }
    }

    pub fn deps(&self) -> &ExternalDependencies {
        self.renderer.deps()
    }

    /// Regenerate phrases from `snapshot` and return the keys of `track_id`'s
    /// phrases ordered by start time
    pub fn sync(&self, snapshot: &Snapshot, track_id: TrackId) -> Vec<PhraseKey> {
        let first_rest_min = self.renderer.settings().first_rest_min_duration_seconds;
        let generated = generate_phrases(snapshot, first_rest_min).unwrap();
        for (_, removed) in self.phrases.sync(generated) {
            self.renderer.release(&removed);
        }
        let mut keys: Vec<(f64, PhraseKey)> = self
            .phrases
            .keys()
            .into_iter()
            .filter_map(|key| {
                let phrase = self.phrases.get(&key).unwrap();
                (phrase.track_id == track_id).then(|| (phrase.start_time, key))
            })
            .collect();
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        keys.into_iter().map(|(_, key)| key).collect()
    }

    pub fn phrase(&self, phrase_key: &PhraseKey) -> Arc<Phrase> {
        self.phrases.get(phrase_key).unwrap()
    }

    pub fn context<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        track_id: TrackId,
        phrase_key: &'a PhraseKey,
    ) -> Context<'a> {
        Context {
            snapshot,
            track_id,
            phrase_key,
            settings: self.renderer.settings(),
            deps: self.renderer.deps(),
            locks: &self.locks,
        }
    }

    /// True when every bound slot resolves in its live store
    pub fn bindings_consistent(&self, phrase_key: &PhraseKey) -> bool {
        let phrase = self.phrase(phrase_key);
        let deps = self.deps();
        phrase
            .query_key
            .get()
            .map_or(true, |k| deps.phrase_queries.contains(&k))
            && phrase
                .singing_volume_key
                .get()
                .map_or(true, |k| deps.phrase_singing_volumes.contains(&k))
            && phrase
                .singing_voice_key
                .get()
                .map_or(true, |k| deps.phrase_singing_voices.contains(&k))
    }

    pub fn fully_bound(&self, phrase_key: &PhraseKey) -> bool {
        let phrase = self.phrase(phrase_key);
        phrase.query_key.is_bound()
            && phrase.singing_volume_key.is_bound()
            && phrase.singing_voice_key.is_bound()
    }

    pub fn fully_unbound(&self, phrase_key: &PhraseKey) -> bool {
        let phrase = self.phrase(phrase_key);
        !phrase.query_key.is_bound()
            && !phrase.singing_volume_key.is_bound()
            && !phrase.singing_voice_key.is_bound()
    }
}
