use image::RgbImage;
use tilesolver_contracts::categories::CategoryConfig;
use tilesolver_contracts::errors::SolveError;

use crate::scorer::ScorerHandle;

/// Probability mass a tile's similarity distribution assigns to the
/// positive prompts. Transient; recomputed per tile, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionScore {
    pub positive_aggregate: f32,
}

impl PredictionScore {
    /// Strict comparison: a tile on the threshold does not match.
    pub fn matches(&self, threshold: f32) -> bool {
        self.positive_aggregate > threshold
    }
}

/// Scores one tile against a category's prompt set.
///
/// The scorer sees the full prompt list (positives first, order preserved)
/// in a single call, so its output is a forced choice among both positive
/// and negative descriptions rather than an absolute yes/no judgment. Raw
/// similarities are softmax-normalized into a distribution and the positive
/// prefix is summed.
pub fn classify_tile(
    scorer: &ScorerHandle,
    position: usize,
    image: &RgbImage,
    config: &CategoryConfig,
) -> Result<PredictionScore, SolveError> {
    let prompts = config.full_prompts();
    let raw = scorer
        .score(image, &prompts)
        .map_err(|source| SolveError::Inference { position, source })?;
    let probabilities = softmax(&raw);
    let positive_aggregate = probabilities
        .iter()
        .take(config.positive_count())
        .sum::<f32>();
    Ok(PredictionScore { positive_aggregate })
}

/// Numerically-stable softmax. Returns an empty vector for empty input.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let Some(max) = scores
        .iter()
        .copied()
        .reduce(f32::max)
    else {
        return Vec::new();
    };
    let exps: Vec<f32> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|value| value / total).collect()
}
