use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Zero-shot embedding-similarity model boundary.
///
/// `score` returns one raw similarity per prompt, in input order. Values are
/// unnormalized; the classifier turns them into a probability distribution.
/// Implementations must be stateless per call so a handle can be shared
/// read-only across concurrent solve sessions.
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup (endpoint probe, model load). Called by
    /// [`ScorerHandle::ready`] before any scoring happens.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    fn score(&self, image: &RgbImage, prompts: &[String]) -> Result<Vec<f32>>;
}

/// Shared handle to a ready similarity scorer.
///
/// Constructed exactly once via [`ScorerHandle::ready`] and passed by
/// reference into every classification; there is no process-wide model
/// state. Cloning is cheap.
#[derive(Clone)]
pub struct ScorerHandle {
    inner: Arc<dyn SimilarityScorer>,
}

impl ScorerHandle {
    pub fn ready(scorer: impl SimilarityScorer + 'static) -> Result<Self> {
        scorer
            .warm_up()
            .with_context(|| format!("scorer '{}' failed warm-up", scorer.name()))?;
        Ok(Self {
            inner: Arc::new(scorer),
        })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn score(&self, image: &RgbImage, prompts: &[String]) -> Result<Vec<f32>> {
        let scores = self.inner.score(image, prompts)?;
        if scores.len() != prompts.len() {
            bail!(
                "scorer '{}' returned {} scores for {} prompts",
                self.inner.name(),
                scores.len(),
                prompts.len()
            );
        }
        Ok(scores)
    }
}

impl std::fmt::Debug for ScorerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerHandle")
            .field("scorer", &self.inner.name())
            .finish()
    }
}

/// Deterministic scorer for dry runs and tests: similarities are derived
/// from a hash of the tile pixels and the prompt text, so the whole pipeline
/// runs without a model and identical inputs always score identically.
#[derive(Debug, Default)]
pub struct DryrunScorer;

impl SimilarityScorer for DryrunScorer {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn score(&self, image: &RgbImage, prompts: &[String]) -> Result<Vec<f32>> {
        let mut image_hasher = Sha256::new();
        image_hasher.update(image.width().to_be_bytes());
        image_hasher.update(image.height().to_be_bytes());
        image_hasher.update(image.as_raw());
        let image_digest = image_hasher.finalize();

        Ok(prompts
            .iter()
            .map(|prompt| {
                let mut hasher = Sha256::new();
                hasher.update(image_digest);
                hasher.update(prompt.as_bytes());
                let digest = hasher.finalize();
                f32::from(digest[0]) / 255.0
            })
            .collect())
    }
}

/// Client for an HTTP similarity-scoring endpoint.
///
/// `POST {base}/score` with `{"image": <base64 png>, "prompts": [..]}`,
/// response `{"scores": [..]}`. `warm_up` probes `GET {base}/health` so a
/// dead endpoint fails at `ready()` instead of mid-round.
pub struct HttpScorer {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl HttpScorer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed building HTTP client for similarity scorer")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl SimilarityScorer for HttpScorer {
    fn name(&self) -> &str {
        "http"
    }

    fn warm_up(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("scorer health probe failed ({url})"))?;
        if !response.status().is_success() {
            bail!("scorer health probe returned {}", response.status().as_u16());
        }
        Ok(())
    }

    fn score(&self, image: &RgbImage, prompts: &[String]) -> Result<Vec<f32>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed encoding tile as PNG")?;

        let url = format!("{}/score", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "image": BASE64.encode(&png),
                "prompts": prompts,
            }))
            .send()
            .with_context(|| format!("scorer request failed ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!("scorer returned {code}: {}", truncate_text(&body, 256));
        }

        let payload: Value = response.json().context("scorer response was not JSON")?;
        let scores = payload
            .get("scores")
            .and_then(Value::as_array)
            .context("scorer response missing 'scores' array")?;
        scores
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|score| score as f32)
                    .context("non-numeric entry in 'scores'")
            })
            .collect()
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}
