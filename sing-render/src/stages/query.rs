use async_trait::async_trait;
use serde::Serialize;
use sing_common::content_hash;
use sing_common::models::{EngineId, FrameAudioQuery, FrameAudioQueryKey, Note, Tempo, Track};
use std::sync::Arc;

use super::{
    bind, create_notes_for_request_to_engine, is_stale, shift_key_of_notes, shift_pitch, singer,
    unbind, Context, Stage, StageId,
};
use crate::error::Result;
use crate::phrase::Phrase;

/// Inputs that determine a phrase's query
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuerySource<'a> {
    engine_id: &'a EngineId,
    engine_frame_rate: f64,
    tpqn: u32,
    tempos: &'a [Tempo],
    first_rest_duration: f64,
    notes: &'a [Note],
    key_range_adjustment: i32,
    last_rest_duration_seconds: f64,
}

impl<'a> QuerySource<'a> {
    fn new(context: &'a Context<'_>, track: &'a Track, phrase: &'a Phrase) -> Result<Self> {
        let engine_id = &singer(track)?.engine_id;
        Ok(Self {
            engine_id,
            engine_frame_rate: context.snapshot.engine_frame_rate(engine_id)?,
            tpqn: context.snapshot.tpqn,
            tempos: &context.snapshot.tempos,
            first_rest_duration: phrase.first_rest_duration,
            notes: &phrase.notes,
            key_range_adjustment: track.key_range_adjustment,
            last_rest_duration_seconds: context.settings.last_rest_duration_seconds,
        })
    }

    fn key(&self) -> Result<FrameAudioQueryKey> {
        Ok(FrameAudioQueryKey::new(content_hash(self)?))
    }
}

/// Ask the engine for a query, singing in the track's adjusted key
async fn generate_query(
    source: &QuerySource<'_>,
    context: &Context<'_>,
) -> Result<FrameAudioQuery> {
    let mut notes = create_notes_for_request_to_engine(
        source.first_rest_duration,
        source.last_rest_duration_seconds,
        source.notes,
        source.tempos,
        source.tpqn,
        source.engine_frame_rate,
    );
    shift_key_of_notes(&mut notes, -source.key_range_adjustment);

    let mut query = context
        .deps
        .engine
        .fetch_query(source.engine_id, source.engine_frame_rate, &notes)
        .await?;

    shift_pitch(&mut query.f0, source.key_range_adjustment as f64);
    Ok(query)
}

/// Notes → frame-level phonetic/timing query
pub struct QueryGenerationStage;

#[async_trait]
impl Stage for QueryGenerationStage {
    fn id(&self) -> StageId {
        StageId::QueryGeneration
    }

    async fn should_be_executed(&self, context: &Context<'_>) -> Result<bool> {
        let track = context.track()?;
        if track.singer.is_none() {
            return Ok(false);
        }
        let phrase = context.phrase()?;
        let query_key = QuerySource::new(context, track, &phrase)?.key()?;
        Ok(is_stale(phrase.query_key.get(), &query_key))
    }

    fn delete_execution_result(&self, context: &Context<'_>) -> Result<()> {
        let phrase = context.phrase()?;
        unbind(&phrase.query_key, context.deps.phrase_queries.as_ref());
        Ok(())
    }

    async fn execute(&self, context: &Context<'_>) -> Result<()> {
        let track = context.track()?;
        let phrase = context.phrase()?;
        let source = QuerySource::new(context, track, &phrase)?;
        let query_key = source.key()?;

        let query = {
            let _guard = context.locks.query.lock(&query_key).await;
            match context.deps.query_cache.get(&query_key) {
                Some(query) => {
                    tracing::info!(phrase_key = %context.phrase_key, "Loaded query from cache.");
                    query
                }
                None => {
                    let query = Arc::new(generate_query(&source, context).await?);
                    tracing::info!(
                        phrase_key = %context.phrase_key,
                        frames = query.f0.len(),
                        "Generated query. phonemes: {}",
                        query.phoneme_text()
                    );
                    context
                        .deps
                        .query_cache
                        .set(query_key.clone(), Arc::clone(&query));
                    query
                }
            }
        };

        bind(
            &phrase.query_key,
            context.deps.phrase_queries.as_ref(),
            query_key,
            query,
        );
        Ok(())
    }
}
