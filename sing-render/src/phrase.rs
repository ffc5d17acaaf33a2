//! Phrases and their stage key slots
//!
//! A [`Phrase`] is immutable except for its three [`KeySlot`]s, which hold
//! the key of the artifact currently bound for each pipeline stage. Slots
//! are written only by the stages: set after a successful execute, cleared
//! by delete-execution-result.

use sing_common::models::{
    FrameAudioQueryKey, Note, PhraseKey, SingingVoiceKey, SingingVolumeKey, TrackId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Mutable binding of one stage's output key
#[derive(Debug)]
pub struct KeySlot<K> {
    value: RwLock<Option<K>>,
}

impl<K> Default for KeySlot<K> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<K: Clone> KeySlot<K> {
    pub fn get(&self) -> Option<K> {
        self.value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, key: Option<K>) {
        *self
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = key;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_bound(&self) -> bool {
        self.get().is_some()
    }
}

/// Contiguous run of notes on one track, rendered independently
#[derive(Debug)]
pub struct Phrase {
    pub track_id: TrackId,
    /// Ticks of rest placed before the first note
    pub first_rest_duration: f64,
    pub notes: Vec<Note>,
    /// Seconds from score start to the beginning of the leading rest
    pub start_time: f64,
    pub query_key: KeySlot<FrameAudioQueryKey>,
    pub singing_volume_key: KeySlot<SingingVolumeKey>,
    pub singing_voice_key: KeySlot<SingingVoiceKey>,
}

impl Phrase {
    pub fn new(
        track_id: TrackId,
        first_rest_duration: f64,
        notes: Vec<Note>,
        start_time: f64,
    ) -> Self {
        Self {
            track_id,
            first_rest_duration,
            notes,
            start_time,
            query_key: KeySlot::default(),
            singing_volume_key: KeySlot::default(),
            singing_voice_key: KeySlot::default(),
        }
    }
}

/// Read access to phrases by key
pub trait PhraseRegistry: Send + Sync {
    fn get(&self, phrase_key: &PhraseKey) -> Result<Arc<Phrase>>;
}

/// In-memory phrase registry
#[derive(Default)]
pub struct PhraseMap {
    phrases: RwLock<HashMap<PhraseKey, Arc<Phrase>>>,
}

impl PhraseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, phrase_key: PhraseKey, phrase: Phrase) -> Arc<Phrase> {
        let phrase = Arc::new(phrase);
        self.write().insert(phrase_key, Arc::clone(&phrase));
        phrase
    }

    pub fn remove(&self, phrase_key: &PhraseKey) -> Option<Arc<Phrase>> {
        self.write().remove(phrase_key)
    }

    pub fn keys(&self) -> Vec<PhraseKey> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Replace the registry contents with freshly generated phrases.
    ///
    /// Phrases whose key is already registered keep their existing entry (and
    /// therefore their bound stage keys). Returns the phrases that were
    /// dropped so the caller can release their live artifacts.
    pub fn sync(&self, generated: HashMap<PhraseKey, Phrase>) -> Vec<(PhraseKey, Arc<Phrase>)> {
        let mut phrases = self.write();

        let stale: Vec<PhraseKey> = phrases
            .keys()
            .filter(|key| !generated.contains_key(*key))
            .cloned()
            .collect();
        let removed = stale
            .into_iter()
            .filter_map(|key| phrases.remove(&key).map(|phrase| (key, phrase)))
            .collect::<Vec<_>>();

        for (key, phrase) in generated {
            phrases.entry(key).or_insert_with(|| Arc::new(phrase));
        }

        tracing::debug!(
            phrases = phrases.len(),
            removed = removed.len(),
            "Synchronized phrase registry"
        );
        removed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PhraseKey, Arc<Phrase>>> {
        self.phrases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PhraseKey, Arc<Phrase>>> {
        self.phrases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PhraseRegistry for PhraseMap {
    fn get(&self, phrase_key: &PhraseKey) -> Result<Arc<Phrase>> {
        self.read()
            .get(phrase_key)
            .cloned()
            .ok_or_else(|| Error::PhraseNotFound(phrase_key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase() -> Phrase {
        Phrase::new(TrackId::new(), 480.0, Vec::new(), 0.0)
    }

    #[test]
    fn test_key_slot_get_set_clear() {
        let slot = KeySlot::<FrameAudioQueryKey>::default();
        assert_eq!(slot.get(), None);

        slot.set(Some(FrameAudioQueryKey::new("abc")));
        assert_eq!(slot.get(), Some(FrameAudioQueryKey::new("abc")));
        assert!(slot.is_bound());

        slot.clear();
        assert!(!slot.is_bound());
    }

    #[test]
    fn test_registry_lookup() {
        let map = PhraseMap::new();
        let key = PhraseKey::new("p1");
        map.insert(key.clone(), phrase());

        assert!(map.get(&key).is_ok());
        assert!(matches!(
            map.get(&PhraseKey::new("missing")),
            Err(Error::PhraseNotFound(_))
        ));
    }

    #[test]
    fn test_sync_keeps_existing_bindings() {
        let map = PhraseMap::new();
        let kept = PhraseKey::new("kept");
        let dropped = PhraseKey::new("dropped");
        map.insert(kept.clone(), phrase())
            .query_key
            .set(Some(FrameAudioQueryKey::new("q")));
        map.insert(dropped.clone(), phrase());

        let mut generated = HashMap::new();
        generated.insert(kept.clone(), phrase());
        generated.insert(PhraseKey::new("new"), phrase());

        let removed = map.sync(generated);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, dropped);

        assert_eq!(map.len(), 2);
        // Existing phrase retained, so its binding survives
        assert_eq!(
            map.get(&kept).unwrap().query_key.get(),
            Some(FrameAudioQueryKey::new("q"))
        );
    }
}
