use async_trait::async_trait;
use serde::Serialize;
use sing_common::content_hash;
use sing_common::models::{
    EngineId, FrameAudioQuery, Note, SingingVolume, SingingVolumeKey, StyleId, Tempo, Track,
};
use std::sync::Arc;

use super::{
    bind, create_notes_for_request_to_engine, is_stale, mute_last_pau_section,
    shift_key_of_notes, shift_pitch, shift_volume, singer, unbind, Context, Stage, StageId,
};
use crate::error::Result;
use crate::phrase::Phrase;
use crate::pitch_edit::apply_pitch_edit;

/// Inputs that determine a phrase's singing volume
///
/// Holds a pitch-edited copy of the bound query, so edits to the track's
/// pitch curve change the key even when the query itself is reused.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SingingVolumeSource<'a> {
    engine_id: &'a EngineId,
    engine_frame_rate: f64,
    tpqn: u32,
    tempos: &'a [Tempo],
    first_rest_duration: f64,
    notes: &'a [Note],
    key_range_adjustment: i32,
    volume_range_adjustment: i32,
    query_for_volume_generation: FrameAudioQuery,
    last_rest_duration_seconds: f64,
    fade_out_duration_seconds: f64,
    singing_teacher_style_id: StyleId,
}

impl<'a> SingingVolumeSource<'a> {
    fn new(context: &'a Context<'_>, track: &'a Track, phrase: &'a Phrase) -> Result<Self> {
        let engine_id = &singer(track)?.engine_id;
        let query = context.bound_query(phrase)?;

        let mut query_for_volume_generation = FrameAudioQuery::clone(&query);
        apply_pitch_edit(
            &mut query_for_volume_generation,
            phrase.start_time,
            &track.pitch_edit_data,
            context.snapshot.editor_frame_rate,
        )?;

        Ok(Self {
            engine_id,
            engine_frame_rate: query.frame_rate,
            tpqn: context.snapshot.tpqn,
            tempos: &context.snapshot.tempos,
            first_rest_duration: phrase.first_rest_duration,
            notes: &phrase.notes,
            key_range_adjustment: track.key_range_adjustment,
            volume_range_adjustment: track.volume_range_adjustment,
            query_for_volume_generation,
            last_rest_duration_seconds: context.settings.last_rest_duration_seconds,
            fade_out_duration_seconds: context.settings.fade_out_duration_seconds,
            singing_teacher_style_id: context.settings.singing_teacher_style_id(),
        })
    }

    fn key(&self) -> Result<SingingVolumeKey> {
        Ok(SingingVolumeKey::new(content_hash(self)?))
    }
}

/// Ask the engine for a volume envelope and apply track gain and the tail fade
async fn generate_singing_volume(
    source: SingingVolumeSource<'_>,
    context: &Context<'_>,
) -> Result<SingingVolume> {
    let mut notes = create_notes_for_request_to_engine(
        source.first_rest_duration,
        source.last_rest_duration_seconds,
        source.notes,
        source.tempos,
        source.tpqn,
        source.engine_frame_rate,
    );
    let mut query = source.query_for_volume_generation;

    shift_key_of_notes(&mut notes, -source.key_range_adjustment);
    shift_pitch(&mut query.f0, -(source.key_range_adjustment as f64));

    let mut singing_volume = context
        .deps
        .engine
        .fetch_sing_frame_volume(
            &notes,
            &query,
            source.engine_id,
            source.singing_teacher_style_id,
        )
        .await?;

    shift_volume(&mut singing_volume, source.volume_range_adjustment as f64);
    mute_last_pau_section(
        &mut singing_volume,
        &query.phonemes,
        source.engine_frame_rate,
        source.fade_out_duration_seconds,
    )?;
    Ok(singing_volume)
}

/// Query + pitch edits → frame-level volume envelope
pub struct SingingVolumeGenerationStage;

#[async_trait]
impl Stage for SingingVolumeGenerationStage {
    fn id(&self) -> StageId {
        StageId::SingingVolumeGeneration
    }

    async fn should_be_executed(&self, context: &Context<'_>) -> Result<bool> {
        let track = context.track()?;
        if track.singer.is_none() {
            return Ok(false);
        }
        let phrase = context.phrase()?;
        let singing_volume_key = SingingVolumeSource::new(context, track, &phrase)?.key()?;
        Ok(is_stale(phrase.singing_volume_key.get(), &singing_volume_key))
    }

    fn delete_execution_result(&self, context: &Context<'_>) -> Result<()> {
        let phrase = context.phrase()?;
        unbind(
            &phrase.singing_volume_key,
            context.deps.phrase_singing_volumes.as_ref(),
        );
        Ok(())
    }

    async fn execute(&self, context: &Context<'_>) -> Result<()> {
        let track = context.track()?;
        let phrase = context.phrase()?;
        let source = SingingVolumeSource::new(context, track, &phrase)?;
        let singing_volume_key = source.key()?;

        let singing_volume = {
            let _guard = context.locks.singing_volume.lock(&singing_volume_key).await;
            match context.deps.singing_volume_cache.get(&singing_volume_key) {
                Some(singing_volume) => {
                    tracing::info!(
                        phrase_key = %context.phrase_key,
                        "Loaded singing volume from cache."
                    );
                    singing_volume
                }
                None => {
                    let singing_volume = Arc::new(generate_singing_volume(source, context).await?);
                    tracing::info!(phrase_key = %context.phrase_key, "Generated singing volume.");
                    context
                        .deps
                        .singing_volume_cache
                        .set(singing_volume_key.clone(), Arc::clone(&singing_volume));
                    singing_volume
                }
            }
        };

        bind(
            &phrase.singing_volume_key,
            context.deps.phrase_singing_volumes.as_ref(),
            singing_volume_key,
            singing_volume,
        );
        Ok(())
    }
}
