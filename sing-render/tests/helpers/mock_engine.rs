//! Counting in-process engine

use async_trait::async_trait;
use sing_common::models::{
    EngineId, EngineNote, FrameAudioQuery, FramePhoneme, Singer, SingingVoice, SingingVolume,
    StyleId,
};
use sing_render::{Error, Result, SingingEngine};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// f0 for a MIDI note number
pub fn key_to_frequency(key: i32) -> f64 {
    440.0 * 2f64.powf((key - 69) as f64 / 12.0)
}

/// Deterministic engine that counts its calls
///
/// Queries contain one phoneme per request note: `pau` for rests, `a` for
/// keyed notes with f0 from the key. Volume is 0.5 on voiced frames and 0.1
/// elsewhere.
#[derive(Default)]
pub struct MockEngine {
    query_calls: AtomicUsize,
    volume_calls: AtomicUsize,
    voice_calls: AtomicUsize,
    fail_query: AtomicBool,
    fail_voice: AtomicBool,
    delay: Mutex<Option<Duration>>,
    last_query_notes: Mutex<Vec<EngineNote>>,
    last_volume_style: Mutex<Option<StyleId>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn volume_calls(&self) -> usize {
        self.volume_calls.load(Ordering::SeqCst)
    }

    pub fn voice_calls(&self) -> usize {
        self.voice_calls.load(Ordering::SeqCst)
    }

    /// (query, volume, voice) call counts
    pub fn calls(&self) -> (usize, usize, usize) {
        (self.query_calls(), self.volume_calls(), self.voice_calls())
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_voice(&self, fail: bool) {
        self.fail_voice.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn last_query_notes(&self) -> Vec<EngineNote> {
        self.last_query_notes.lock().unwrap().clone()
    }

    pub fn last_volume_style(&self) -> Option<StyleId> {
        *self.last_volume_style.lock().unwrap()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SingingEngine for MockEngine {
    async fn fetch_query(
        &self,
        _engine_id: &EngineId,
        engine_frame_rate: f64,
        notes: &[EngineNote],
    ) -> Result<FrameAudioQuery> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query_notes.lock().unwrap() = notes.to_vec();
        self.pause().await;
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(Error::Engine("query generation unavailable".to_string()));
        }

        let mut f0 = Vec::new();
        let mut phonemes = Vec::new();
        for note in notes {
            let value = note.key.map(key_to_frequency).unwrap_or(0.0);
            f0.extend(std::iter::repeat(value).take(note.frame_length as usize));
            phonemes.push(FramePhoneme {
                phoneme: if note.key.is_some() { "a" } else { "pau" }.to_string(),
                frame_length: note.frame_length,
                note_id: note.id,
            });
        }
        Ok(FrameAudioQuery {
            volume: vec![0.0; f0.len()],
            f0,
            phonemes,
            volume_scale: 1.0,
            output_sampling_rate: 24000,
            output_stereo: false,
            frame_rate: engine_frame_rate,
        })
    }

    async fn fetch_sing_frame_volume(
        &self,
        _notes: &[EngineNote],
        query: &FrameAudioQuery,
        _engine_id: &EngineId,
        style_id: StyleId,
    ) -> Result<SingingVolume> {
        self.volume_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_volume_style.lock().unwrap() = Some(style_id);
        self.pause().await;
        Ok(query
            .f0
            .iter()
            .map(|f0| if *f0 > 0.0 { 0.5 } else { 0.1 })
            .collect())
    }

    async fn synthesize_singing_voice(
        &self,
        singer: &Singer,
        query: &FrameAudioQuery,
    ) -> Result<SingingVoice> {
        self.voice_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_voice.load(Ordering::SeqCst) {
            return Err(Error::Engine("synthesis unavailable".to_string()));
        }
        let wav = format!(
            "voice style={} frames={} loud={}",
            singer.style_id,
            query.f0.len(),
            query.volume.iter().filter(|v| **v > 0.0).count()
        )
        .into_bytes();
        Ok(SingingVoice { wav })
    }
}
