//! Synthesis engine interface and HTTP client
//!
//! The pipeline talks to the engine only through [`SingingEngine`]. The
//! [`HttpEngineClient`] implements it against the engine's REST API:
//! - `POST /sing_frame_audio_query?speaker=N` : notes → frame audio query
//! - `POST /sing_frame_volume?speaker=N` : notes + query → volume envelope
//! - `POST /frame_synthesis?speaker=N` : query → WAV bytes
//!
//! No retries are performed here; callers wrap `render` if they want them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sing_common::models::{
    EngineId, EngineNote, FrameAudioQuery, FramePhoneme, Singer, SingingVoice, SingingVolume,
    StyleId,
};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("sing-render/", env!("CARGO_PKG_VERSION"));

/// Remote calls the pipeline makes
#[async_trait]
pub trait SingingEngine: Send + Sync {
    /// Generate a frame-level phonetic/timing query for the notes
    async fn fetch_query(
        &self,
        engine_id: &EngineId,
        engine_frame_rate: f64,
        notes: &[EngineNote],
    ) -> Result<FrameAudioQuery>;

    /// Generate a frame-level volume envelope
    async fn fetch_sing_frame_volume(
        &self,
        notes: &[EngineNote],
        query: &FrameAudioQuery,
        engine_id: &EngineId,
        style_id: StyleId,
    ) -> Result<SingingVolume>;

    /// Render the voice for a composite query
    async fn synthesize_singing_voice(
        &self,
        singer: &Singer,
        query: &FrameAudioQuery,
    ) -> Result<SingingVoice>;
}

#[derive(Serialize)]
struct ScoreBody<'a> {
    notes: &'a [EngineNote],
}

/// Query as sent to the engine (no frame rate)
#[derive(Serialize)]
struct WireQueryRef<'a> {
    f0: &'a [f64],
    volume: &'a [f64],
    phonemes: &'a [FramePhoneme],
    volume_scale: f64,
    output_sampling_rate: u32,
    output_stereo: bool,
}

impl<'a> From<&'a FrameAudioQuery> for WireQueryRef<'a> {
    fn from(query: &'a FrameAudioQuery) -> Self {
        Self {
            f0: &query.f0,
            volume: &query.volume,
            phonemes: &query.phonemes,
            volume_scale: query.volume_scale,
            output_sampling_rate: query.output_sampling_rate,
            output_stereo: query.output_stereo,
        }
    }
}

/// Query as returned by the engine
#[derive(Deserialize)]
struct WireQuery {
    f0: Vec<f64>,
    volume: Vec<f64>,
    phonemes: Vec<FramePhoneme>,
    volume_scale: f64,
    output_sampling_rate: u32,
    output_stereo: bool,
}

impl WireQuery {
    fn into_query(self, frame_rate: f64) -> Result<FrameAudioQuery> {
        let query = FrameAudioQuery {
            f0: self.f0,
            volume: self.volume,
            phonemes: self.phonemes,
            volume_scale: self.volume_scale,
            output_sampling_rate: self.output_sampling_rate,
            output_stereo: self.output_stereo,
            frame_rate,
        };
        let frames = query.phoneme_frame_length();
        if query.f0.len() as i64 != frames || query.volume.len() as i64 != frames {
            return Err(Error::Parse(format!(
                "query frame lengths disagree: f0={}, volume={}, phonemes={}",
                query.f0.len(),
                query.volume.len(),
                frames
            )));
        }
        Ok(query)
    }
}

#[derive(Serialize)]
struct SingFrameVolumeBody<'a> {
    score: ScoreBody<'a>,
    frame_audio_query: WireQueryRef<'a>,
}

#[derive(Deserialize)]
struct EngineManifest {
    frame_rate: f64,
}

/// HTTP client for one or more synthesis engines
pub struct HttpEngineClient {
    http_client: reqwest::Client,
    base_urls: BTreeMap<EngineId, String>,
    query_style_id: StyleId,
}

impl HttpEngineClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `base_urls` - Engine id → API base URL
    /// * `timeout` - Per-request timeout
    /// * `query_style_id` - Style used for query generation
    pub fn new(
        base_urls: BTreeMap<EngineId, String>,
        timeout: Duration,
        query_style_id: StyleId,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_urls,
            query_style_id,
        })
    }

    fn url(&self, engine_id: &EngineId, path: &str) -> Result<String> {
        let base = self
            .base_urls
            .get(engine_id)
            .ok_or_else(|| Error::UnknownEngine(engine_id.clone()))?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        engine_id: &EngineId,
        path: &str,
        style_id: StyleId,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = self.url(engine_id, path)?;
        tracing::debug!(engine_id = %engine_id, style_id = %style_id, "POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .query(&[("speaker", style_id.0)])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Engine(format!(
                "{} returned {}: {}",
                path,
                status.as_u16(),
                error_text
            )));
        }
        Ok(response)
    }

    /// Frame rate advertised in the engine manifest
    pub async fn fetch_frame_rate(&self, engine_id: &EngineId) -> Result<f64> {
        let url = self.url(engine_id, "engine_manifest")?;
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Engine(format!(
                "engine_manifest returned {}",
                status.as_u16()
            )));
        }
        let manifest: EngineManifest = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(manifest.frame_rate)
    }
}

#[async_trait]
impl SingingEngine for HttpEngineClient {
    async fn fetch_query(
        &self,
        engine_id: &EngineId,
        engine_frame_rate: f64,
        notes: &[EngineNote],
    ) -> Result<FrameAudioQuery> {
        let response = self
            .post(
                engine_id,
                "sing_frame_audio_query",
                self.query_style_id,
                &ScoreBody { notes },
            )
            .await?;
        let wire: WireQuery = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        wire.into_query(engine_frame_rate)
    }

    async fn fetch_sing_frame_volume(
        &self,
        notes: &[EngineNote],
        query: &FrameAudioQuery,
        engine_id: &EngineId,
        style_id: StyleId,
    ) -> Result<SingingVolume> {
        let body = SingFrameVolumeBody {
            score: ScoreBody { notes },
            frame_audio_query: WireQueryRef::from(query),
        };
        let response = self
            .post(engine_id, "sing_frame_volume", style_id, &body)
            .await?;
        let volume: SingingVolume = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        if volume.len() != query.f0.len() {
            return Err(Error::Parse(format!(
                "volume has {} frames, query has {}",
                volume.len(),
                query.f0.len()
            )));
        }
        Ok(volume)
    }

    async fn synthesize_singing_voice(
        &self,
        singer: &Singer,
        query: &FrameAudioQuery,
    ) -> Result<SingingVoice> {
        let response = self
            .post(
                &singer.engine_id,
                "frame_synthesis",
                singer.style_id,
                &WireQueryRef::from(query),
            )
            .await?;
        let wav = response.bytes().await?.to_vec();
        Ok(SingingVoice { wav })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpEngineClient {
        let mut urls = BTreeMap::new();
        urls.insert(EngineId::new("e1"), "http://localhost:50021/".to_string());
        HttpEngineClient::new(urls, Duration::from_secs(5), StyleId(6000)).unwrap()
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let url = client().url(&EngineId::new("e1"), "frame_synthesis").unwrap();
        assert_eq!(url, "http://localhost:50021/frame_synthesis");
    }

    #[test]
    fn test_unknown_engine() {
        assert!(matches!(
            client().url(&EngineId::new("nope"), "x"),
            Err(Error::UnknownEngine(_))
        ));
    }

    #[test]
    fn test_wire_query_length_check() {
        let wire = WireQuery {
            f0: vec![0.0; 2],
            volume: vec![0.0; 3],
            phonemes: vec![FramePhoneme {
                phoneme: "pau".into(),
                frame_length: 3,
                note_id: None,
            }],
            volume_scale: 1.0,
            output_sampling_rate: 24000,
            output_stereo: false,
        };
        assert!(matches!(wire.into_query(93.75), Err(Error::Parse(_))));
    }

    #[test]
    fn test_wire_query_omits_frame_rate() {
        let query = FrameAudioQuery {
            f0: vec![1.0],
            volume: vec![1.0],
            phonemes: vec![],
            volume_scale: 1.0,
            output_sampling_rate: 24000,
            output_stereo: false,
            frame_rate: 93.75,
        };
        let json = serde_json::to_value(WireQueryRef::from(&query)).unwrap();
        assert!(json.get("frame_rate").is_none());
        assert_eq!(json["output_sampling_rate"], 24000);
    }
}
