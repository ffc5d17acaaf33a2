//! Phrase renderer
//!
//! Drives the fixed stage order for one phrase at a time. A render first
//! unbinds every stage from the last one down to the start stage, then
//! executes forward. If an engine call fails partway, the failing stage and
//! every later stage are left unbound instead of holding artifacts computed
//! from superseded upstream data.
//!
//! Every entry point validates the snapshot first, so out-of-range or
//! non-finite score data is rejected before any stage source is hashed.
//!
//! The renderer does not serialize renders of the same phrase; callers keep
//! at most one render per phrase outstanding.

use sing_common::config::RenderSettings;
use sing_common::models::{PhraseKey, SingingVoice, TrackId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::deps::ExternalDependencies;
use crate::error::{Error, Result};
use crate::phrase::Phrase;
use crate::snapshot::Snapshot;
use crate::stages::{self, Context, RenderLocks, StageId};

pub struct PhraseRenderer {
    deps: ExternalDependencies,
    settings: RenderSettings,
    locks: RenderLocks,
}

impl PhraseRenderer {
    pub fn new(deps: ExternalDependencies, settings: RenderSettings) -> Self {
        Self {
            deps,
            settings,
            locks: RenderLocks::default(),
        }
    }

    pub fn deps(&self) -> &ExternalDependencies {
        &self.deps
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Stage a never-rendered phrase starts from
    pub fn first_render_stage_id(&self) -> StageId {
        stages::stages()[0].id()
    }

    fn context<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        track_id: TrackId,
        phrase_key: &'a PhraseKey,
    ) -> Context<'a> {
        Context {
            snapshot,
            track_id,
            phrase_key,
            settings: &self.settings,
            deps: &self.deps,
            locks: &self.locks,
        }
    }

    /// First stage whose bound key is stale, or `None` when the phrase is
    /// up to date (including tracks without a singer)
    pub async fn determine_start_stage(
        &self,
        snapshot: &Snapshot,
        track_id: TrackId,
        phrase_key: &PhraseKey,
    ) -> Result<Option<StageId>> {
        snapshot.validate()?;
        let context = self.context(snapshot, track_id, phrase_key);
        for stage in stages::stages() {
            if stage.should_be_executed(&context).await? {
                return Ok(Some(stage.id()));
            }
        }
        Ok(None)
    }

    /// Re-render `phrase_key` from `start_stage_id` through the last stage
    pub async fn render(
        &self,
        snapshot: &Snapshot,
        track_id: TrackId,
        phrase_key: &PhraseKey,
        start_stage_id: StageId,
    ) -> Result<()> {
        snapshot.validate()?;
        let context = self.context(snapshot, track_id, phrase_key);
        let stages = stages::stages();
        let start_index = stages
            .iter()
            .position(|stage| stage.id() == start_stage_id)
            .ok_or_else(|| Error::StageNotFound(start_stage_id.to_string()))?;

        for stage in stages[start_index..].iter().rev() {
            stage.delete_execution_result(&context)?;
        }

        for stage in &stages[start_index..] {
            debug!(stage = %stage.id(), phrase_key = %phrase_key, "Executing stage");
            stage.execute(&context).await?;
        }
        Ok(())
    }

    /// Bring one phrase up to date, returning the stage rendering started
    /// from (`None` when nothing needed to run)
    pub async fn render_phrase(
        &self,
        snapshot: &Snapshot,
        track_id: TrackId,
        phrase_key: &PhraseKey,
    ) -> Result<Option<StageId>> {
        let start_stage_id = self
            .determine_start_stage(snapshot, track_id, phrase_key)
            .await?;
        match start_stage_id {
            Some(start_stage_id) => {
                info!(
                    phrase_key = %phrase_key,
                    start_stage = %start_stage_id,
                    "Rendering phrase"
                );
                self.render(snapshot, track_id, phrase_key, start_stage_id)
                    .await?;
            }
            None => debug!(phrase_key = %phrase_key, "Phrase is up to date"),
        }
        Ok(start_stage_id)
    }

    /// Force a re-render from `requested`, starting earlier when an upstream
    /// stage is stale or was never run. Returns the stage rendering started
    /// from, or `None` for tracks without a singer.
    pub async fn render_phrase_from(
        &self,
        snapshot: &Snapshot,
        track_id: TrackId,
        phrase_key: &PhraseKey,
        requested: StageId,
    ) -> Result<Option<StageId>> {
        if snapshot.track(track_id)?.singer.is_none() {
            return Ok(None);
        }
        let stale = self
            .determine_start_stage(snapshot, track_id, phrase_key)
            .await?;
        let start_stage_id = earliest_start_stage(requested, stale);
        info!(
            phrase_key = %phrase_key,
            start_stage = %start_stage_id,
            requested = %requested,
            "Re-rendering phrase"
        );
        self.render(snapshot, track_id, phrase_key, start_stage_id)
            .await?;
        Ok(Some(start_stage_id))
    }

    /// Voice currently bound to the phrase
    pub fn singing_voice(&self, phrase_key: &PhraseKey) -> Result<Option<Arc<SingingVoice>>> {
        let phrase = self.deps.phrases.get(phrase_key)?;
        Ok(phrase.singing_voice_key.get().and_then(|key| {
            self.deps
                .phrase_singing_voices
                .get(&key)
                .or_else(|| self.deps.singing_voice_cache.get(&key))
        }))
    }

    /// Unbind all of a phrase's artifacts, e.g. after it left the registry
    pub fn release(&self, phrase: &Phrase) {
        stages::unbind(&phrase.singing_voice_key, self.deps.phrase_singing_voices.as_ref());
        stages::unbind(
            &phrase.singing_volume_key,
            self.deps.phrase_singing_volumes.as_ref(),
        );
        stages::unbind(&phrase.query_key, self.deps.phrase_queries.as_ref());
    }
}

/// Earlier of the requested stage and the first stale one
fn earliest_start_stage(requested: StageId, stale: Option<StageId>) -> StageId {
    stale.map_or(requested, |stale| stale.min(requested))
}
