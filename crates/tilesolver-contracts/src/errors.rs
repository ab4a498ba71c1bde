use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy for a solving attempt.
///
/// `Inference` is the only locally-recoverable kind: the orchestrator treats
/// a tile whose classification failed as "no match" and carries on. Every
/// other kind aborts the attempt. A frame-wait timeout is not an error at
/// all; it is the solved transition and never appears here.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("unrecognized tile count {tile_count}, expected 9 or 16")]
    GridDetection { tile_count: usize },

    #[error("grid image is not segmentable: {reason}")]
    InvalidGrid { reason: String },

    #[error("similarity scorer failed on tile {position}")]
    Inference {
        position: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("interaction adapter failed during {operation}")]
    Interaction {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("safety limit of {limit} rounds exceeded")]
    SafetyLimitExceeded { limit: u32 },

    #[error("solving attempt cancelled")]
    Cancelled,
}

impl SolveError {
    /// Short stable identifier used in events and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SolveError::GridDetection { .. } => "grid_detection",
            SolveError::InvalidGrid { .. } => "invalid_grid",
            SolveError::Inference { .. } => "inference",
            SolveError::Interaction { .. } => "interaction",
            SolveError::SafetyLimitExceeded { .. } => "safety_limit_exceeded",
            SolveError::Cancelled => "cancelled",
        }
    }
}

/// States of the round loop. `Submitted` loops back to `AwaitingChallenge`
/// until the frame wait times out (solved) or the safety bound trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveState {
    AwaitingChallenge,
    ChallengeDetected,
    GridCaptured,
    TilesClassified,
    Submitted,
}

impl SolveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveState::AwaitingChallenge => "awaiting_challenge",
            SolveState::ChallengeDetected => "challenge_detected",
            SolveState::GridCaptured => "grid_captured",
            SolveState::TilesClassified => "tiles_classified",
            SolveState::Submitted => "submitted",
        }
    }
}

/// Terminal result of one solving attempt.
#[derive(Debug)]
pub enum SolveOutcome {
    /// The challenge frame stopped reappearing.
    Solved { rounds_processed: u32 },
    Failed(SolveFailure),
}

impl SolveOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Solved { .. })
    }
}

/// A failed attempt, pinned to the state and round it died in.
#[derive(Debug)]
pub struct SolveFailure {
    pub round: u32,
    pub state: SolveState,
    pub error: SolveError,
}
