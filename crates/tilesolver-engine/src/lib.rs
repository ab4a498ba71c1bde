//! Round-based engine for solving tiled image-selection challenges.
//!
//! The orchestrator drives an [`adapter::InteractionAdapter`] (page I/O) and
//! a [`scorer::ScorerHandle`] (embedding-similarity model) through a
//! detect → capture → classify → submit loop until the challenge frame stops
//! reappearing or a safety bound trips.

pub mod adapter;
pub mod classify;
pub mod grid;
pub mod orchestrator;
pub mod scorer;

pub use adapter::{FrameHandle, InteractionAdapter};
pub use classify::{classify_tile, softmax, PredictionScore};
pub use grid::{segment, GridDimension, Round, TileResult};
pub use orchestrator::{ChallengeSolver, SolverOptions};
pub use scorer::{DryrunScorer, HttpScorer, ScorerHandle, SimilarityScorer};
