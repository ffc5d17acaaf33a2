use async_trait::async_trait;
use serde::Serialize;
use sing_common::content_hash;
use sing_common::models::{FrameAudioQuery, Singer, SingingVoiceKey, Track};
use std::sync::Arc;

use super::{bind, is_stale, singer, unbind, Context, Stage, StageId};
use crate::error::Result;
use crate::phrase::Phrase;
use crate::pitch_edit::apply_pitch_edit;

/// Inputs that determine a phrase's rendered voice
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SingingVoiceSource<'a> {
    singer: &'a Singer,
    /// Pitch-edited query carrying the bound singing volume
    query_for_singing_voice_synthesis: FrameAudioQuery,
}

impl<'a> SingingVoiceSource<'a> {
    fn new(context: &'a Context<'_>, track: &'a Track, phrase: &'a Phrase) -> Result<Self> {
        let singer = singer(track)?;
        let query = context.bound_query(phrase)?;
        let singing_volume = context.bound_singing_volume(phrase)?;

        let mut query_for_singing_voice_synthesis = FrameAudioQuery::clone(&query);
        apply_pitch_edit(
            &mut query_for_singing_voice_synthesis,
            phrase.start_time,
            &track.pitch_edit_data,
            context.snapshot.editor_frame_rate,
        )?;
        query_for_singing_voice_synthesis.volume = singing_volume.to_vec();

        Ok(Self {
            singer,
            query_for_singing_voice_synthesis,
        })
    }

    fn key(&self) -> Result<SingingVoiceKey> {
        Ok(SingingVoiceKey::new(content_hash(self)?))
    }
}

/// Composite query → audio
pub struct SingingVoiceSynthesisStage;

#[async_trait]
impl Stage for SingingVoiceSynthesisStage {
    fn id(&self) -> StageId {
        StageId::SingingVoiceSynthesis
    }

    async fn should_be_executed(&self, context: &Context<'_>) -> Result<bool> {
        let track = context.track()?;
        if track.singer.is_none() {
            return Ok(false);
        }
        let phrase = context.phrase()?;
        let singing_voice_key = SingingVoiceSource::new(context, track, &phrase)?.key()?;
        Ok(is_stale(phrase.singing_voice_key.get(), &singing_voice_key))
    }

    fn delete_execution_result(&self, context: &Context<'_>) -> Result<()> {
        let phrase = context.phrase()?;
        unbind(
            &phrase.singing_voice_key,
            context.deps.phrase_singing_voices.as_ref(),
        );
        Ok(())
    }

    async fn execute(&self, context: &Context<'_>) -> Result<()> {
        let track = context.track()?;
        let phrase = context.phrase()?;
        let source = SingingVoiceSource::new(context, track, &phrase)?;
        let singing_voice_key = source.key()?;

        let singing_voice = {
            let _guard = context.locks.singing_voice.lock(&singing_voice_key).await;
            match context.deps.singing_voice_cache.get(&singing_voice_key) {
                Some(singing_voice) => {
                    tracing::info!(
                        phrase_key = %context.phrase_key,
                        "Loaded singing voice from cache."
                    );
                    singing_voice
                }
                None => {
                    let singing_voice = context
                        .deps
                        .engine
                        .synthesize_singing_voice(
                            source.singer,
                            &source.query_for_singing_voice_synthesis,
                        )
                        .await?;
                    let singing_voice = Arc::new(singing_voice);
                    tracing::info!(
                        phrase_key = %context.phrase_key,
                        bytes = singing_voice.wav.len(),
                        "Generated singing voice."
                    );
                    context
                        .deps
                        .singing_voice_cache
                        .set(singing_voice_key.clone(), Arc::clone(&singing_voice));
                    singing_voice
                }
            }
        };

        bind(
            &phrase.singing_voice_key,
            context.deps.phrase_singing_voices.as_ref(),
            singing_voice_key,
            singing_voice,
        );
        Ok(())
    }
}
