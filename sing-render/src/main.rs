//! Singing renderer (sing-render) - Main entry point
//!
//! Loads a score snapshot from JSON, splits it into phrases, renders every
//! phrase against the configured synthesis engines and writes each phrase's
//! voice as a WAV file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sing_common::config::TomlConfig;
use sing_common::models::PhraseKey;
use sing_render::segmentation::generate_phrases;
use sing_render::{
    ExternalDependencies, HttpEngineClient, PhraseMap, PhraseRegistry, PhraseRenderer, Snapshot,
    StageId,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sing-render
#[derive(Parser, Debug)]
#[command(name = "sing-render")]
#[command(about = "Render singing phrases of a score through a synthesis engine")]
#[command(version)]
struct Args {
    /// Score snapshot (JSON)
    #[arg(short, long, env = "SING_RENDER_SCORE")]
    score: PathBuf,

    /// Directory the rendered WAV files are written to
    #[arg(short, long, default_value = "out", env = "SING_RENDER_OUT_DIR")]
    out_dir: PathBuf,

    /// Configuration file (overrides SING_RENDER_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Re-render every phrase from this stage even if it is up to date
    /// (earlier stages still run when they have no result yet)
    #[arg(long)]
    from_stage: Option<StageId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::resolve(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sing-render");
    info!("Score: {}", args.score.display());

    let mut snapshot = load_snapshot(&args.score).await?;

    let engine = HttpEngineClient::new(
        config.engine_urls(),
        config.request_timeout(),
        config.render.singing_teacher_style_id(),
    )
    .context("Failed to create engine client")?;

    let singer_engine_ids: Vec<_> = snapshot
        .tracks
        .values()
        .filter_map(|track| track.singer.as_ref())
        .map(|singer| singer.engine_id.clone())
        .collect();
    for engine_id in singer_engine_ids {
        if snapshot.engine_frame_rates.contains_key(&engine_id) {
            continue;
        }
        let frame_rate = engine
            .fetch_frame_rate(&engine_id)
            .await
            .with_context(|| format!("Failed to fetch frame rate of engine {}", engine_id))?;
        info!(engine_id = %engine_id, frame_rate, "Fetched engine frame rate");
        snapshot.engine_frame_rates.insert(engine_id, frame_rate);
    }

    let phrases = Arc::new(PhraseMap::new());
    let generated = generate_phrases(&snapshot, config.render.first_rest_min_duration_seconds)
        .context("Failed to generate phrases")?;
    phrases.sync(generated);
    info!("{} phrases to render", phrases.len());

    let deps = ExternalDependencies::in_memory(phrases.clone(), Arc::new(engine));
    let renderer = Arc::new(PhraseRenderer::new(deps, config.render.clone()));
    let snapshot = Arc::new(snapshot);

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let mut tasks = JoinSet::new();
    for phrase_key in phrases.keys() {
        let renderer = Arc::clone(&renderer);
        let snapshot = Arc::clone(&snapshot);
        let phrases = Arc::clone(&phrases);
        let out_dir = args.out_dir.clone();
        let from_stage = args.from_stage;
        tasks.spawn(async move {
            let result =
                render_and_write(&renderer, &phrases, &snapshot, &phrase_key, from_stage, &out_dir)
                    .await;
            (phrase_key, result)
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (phrase_key, result) = joined.context("Render task panicked")?;
        match result {
            Ok(Some(path)) => info!(phrase_key = %phrase_key, "Wrote {}", path.display()),
            Ok(None) => {
                warn!(phrase_key = %phrase_key, "Phrase has no voice (track without singer)")
            }
            Err(e) => {
                error!(phrase_key = %phrase_key, "Render failed: {:#}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} phrase(s) failed to render", failures);
    }
    info!("Done");
    Ok(())
}

async fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    snapshot.validate().context("Invalid score")?;
    Ok(snapshot)
}

async fn render_and_write(
    renderer: &PhraseRenderer,
    phrases: &PhraseMap,
    snapshot: &Snapshot,
    phrase_key: &PhraseKey,
    from_stage: Option<StageId>,
    out_dir: &Path,
) -> Result<Option<PathBuf>> {
    let phrase = phrases.get(phrase_key)?;

    match from_stage {
        Some(stage_id) => {
            renderer
                .render_phrase_from(snapshot, phrase.track_id, phrase_key, stage_id)
                .await?
        }
        None => {
            renderer
                .render_phrase(snapshot, phrase.track_id, phrase_key)
                .await?
        }
    };

    let Some(voice) = renderer.singing_voice(phrase_key)? else {
        return Ok(None);
    };
    let path = out_dir.join(format!(
        "{}_{:09.3}.wav",
        phrase.track_id, phrase.start_time
    ));
    tokio::fs::write(&path, &voice.wav)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
