use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tilesolver_contracts::categories::CategoryRegistry;
use tilesolver_contracts::errors::{SolveError, SolveFailure, SolveOutcome, SolveState};
use tilesolver_contracts::events::{EventWriter, SolveEvent};
use tilesolver_contracts::report::{now_utc_iso, RoundRecord, SolveReport};
use tracing::{debug, info, warn};

use crate::adapter::InteractionAdapter;
use crate::classify::classify_tile;
use crate::grid::{segment, GridDimension, Round};
use crate::scorer::ScorerHandle;

pub const DEFAULT_MAX_ROUNDS: u32 = 15;
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Bounded wait for a challenge frame at the top of each round. A
    /// timeout here means the challenge is gone, i.e. solved.
    pub frame_timeout: Duration,
    /// Safety bound on rounds; exceeding it is a distinct failure outcome.
    pub max_rounds: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// The round state machine:
/// `AwaitingChallenge → ChallengeDetected → GridCaptured → TilesClassified
/// → Submitted → (AwaitingChallenge | Solved | Failed)`.
///
/// One solver owns one adapter session and runs rounds strictly
/// sequentially. The scorer handle may be shared with other sessions.
pub struct ChallengeSolver<A: InteractionAdapter> {
    adapter: A,
    scorer: ScorerHandle,
    registry: CategoryRegistry,
    events: EventWriter,
    options: SolverOptions,
    cancel: Arc<AtomicBool>,
    started_at: String,
    rounds: Vec<RoundRecord>,
}

impl<A: InteractionAdapter> ChallengeSolver<A> {
    pub fn new(
        adapter: A,
        scorer: ScorerHandle,
        registry: CategoryRegistry,
        events: EventWriter,
        options: SolverOptions,
    ) -> Result<Self> {
        events.emit(&SolveEvent::SessionStarted {
            scorer: scorer.name().to_string(),
            max_rounds: options.max_rounds,
            frame_timeout_ms: options.frame_timeout.as_millis() as u64,
        })?;
        Ok(Self {
            adapter,
            scorer,
            registry,
            events,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            started_at: now_utc_iso(),
            rounds: Vec::new(),
        })
    }

    /// Flag that aborts the attempt; checked at the top of every round and
    /// between tile classifications.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Runs rounds until the challenge frame stops reappearing (solved), a
    /// terminal error occurs, or the safety bound trips. `Err` is reserved
    /// for event-log I/O problems; every engine outcome, including
    /// failures, comes back as a [`SolveOutcome`].
    pub fn solve(&mut self) -> Result<SolveOutcome> {
        let mut round_index: u32 = 1;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return self.fail(round_index, SolveState::AwaitingChallenge, SolveError::Cancelled);
            }

            let frame = match self
                .adapter
                .wait_for_challenge_frame(self.options.frame_timeout)
            {
                Ok(frame) => frame,
                Err(source) => {
                    return self.fail(
                        round_index,
                        SolveState::AwaitingChallenge,
                        SolveError::Interaction {
                            operation: "wait_for_challenge_frame",
                            source,
                        },
                    )
                }
            };
            let Some(frame) = frame else {
                // No follow-up challenge: the previous submission (or the
                // initial gate) was accepted.
                let rounds_processed = round_index - 1;
                info!(rounds_processed, "challenge solved");
                self.events
                    .emit(&SolveEvent::session_solved(rounds_processed))?;
                return Ok(SolveOutcome::Solved { rounds_processed });
            };

            // ChallengeDetected
            let label = match self.adapter.read_instruction_text(&frame) {
                Ok(label) => label,
                Err(source) => {
                    return self.fail(
                        round_index,
                        SolveState::ChallengeDetected,
                        SolveError::Interaction {
                            operation: "read_instruction_text",
                            source,
                        },
                    )
                }
            };
            let resolved = self.registry.resolve(&label);
            let config = resolved.config().clone();
            let tile_count = match self.adapter.count_tiles(&frame) {
                Ok(count) => count,
                Err(source) => {
                    return self.fail(
                        round_index,
                        SolveState::ChallengeDetected,
                        SolveError::Interaction {
                            operation: "count_tiles",
                            source,
                        },
                    )
                }
            };
            let dimension = match GridDimension::from_tile_count(tile_count) {
                Ok(dimension) => dimension,
                Err(error) => {
                    return self.fail(round_index, SolveState::ChallengeDetected, error)
                }
            };
            info!(
                round = round_index,
                label = label.as_str(),
                category = resolved.name().unwrap_or("<fallback>"),
                grid = dimension.size(),
                "challenge detected"
            );
            self.events.emit(&SolveEvent::ChallengeDetected {
                round: round_index,
                label: label.clone(),
                category: resolved.name().map(str::to_string),
                grid_dimension: dimension.size(),
            })?;

            // GridCaptured
            let grid_image = match self.adapter.capture_grid_image(&frame) {
                Ok(image) => image,
                Err(source) => {
                    return self.fail(
                        round_index,
                        SolveState::ChallengeDetected,
                        SolveError::Interaction {
                            operation: "capture_grid_image",
                            source,
                        },
                    )
                }
            };
            let tiles = match segment(&grid_image, dimension) {
                Ok(tiles) => tiles,
                Err(error) => return self.fail(round_index, SolveState::GridCaptured, error),
            };
            let mut round = Round {
                index: round_index,
                target_label: label.clone(),
                grid_dimension: dimension,
                tiles,
            };
            self.events.emit(&SolveEvent::GridCaptured {
                round: round_index,
                width: grid_image.width(),
                height: grid_image.height(),
                tiles: round.tiles.len(),
            })?;

            // TilesClassified: per-tile inference failures downgrade to
            // "no match" — never select a tile the engine could not score.
            for tile in &mut round.tiles {
                if self.cancel.load(Ordering::SeqCst) {
                    return self.fail(
                        round_index,
                        SolveState::GridCaptured,
                        SolveError::Cancelled,
                    );
                }
                match classify_tile(&self.scorer, tile.position, &tile.image, &config) {
                    Ok(score) => {
                        tile.matched = score.matches(config.threshold);
                        debug!(
                            round = round_index,
                            position = tile.position,
                            positive_aggregate = score.positive_aggregate,
                            matched = tile.matched,
                            "tile classified"
                        );
                    }
                    Err(error) => {
                        let chain = format!("{:#}", anyhow::Error::from(error));
                        warn!(
                            round = round_index,
                            position = tile.position,
                            error = %chain,
                            "tile inference failed, treating as no match"
                        );
                        self.events.emit(&SolveEvent::TileInferenceFailed {
                            round: round_index,
                            position: tile.position,
                        })?;
                    }
                }
            }
            let matched = round.matched_positions();
            self.events.emit(&SolveEvent::TilesClassified {
                round: round_index,
                matched_positions: matched.clone(),
            })?;

            // Submitted: an empty matched set still submits — some variants
            // accept "none present" for a round.
            for position in &matched {
                if let Err(source) = self.adapter.click_tile(&frame, *position) {
                    return self.fail(
                        round_index,
                        SolveState::TilesClassified,
                        SolveError::Interaction {
                            operation: "click_tile",
                            source,
                        },
                    );
                }
            }
            if let Err(source) = self.adapter.click_submit(&frame) {
                return self.fail(
                    round_index,
                    SolveState::TilesClassified,
                    SolveError::Interaction {
                        operation: "click_submit",
                        source,
                    },
                );
            }
            self.events.emit(&SolveEvent::RoundSubmitted {
                round: round_index,
                clicked: matched.len(),
                matched_positions: matched.clone(),
            })?;
            self.rounds.push(RoundRecord {
                index: round_index,
                target_label: label,
                resolved_category: resolved.name().map(str::to_string),
                grid_dimension: dimension.size(),
                matched_positions: matched,
            });

            if round_index >= self.options.max_rounds {
                return self.fail(
                    round_index,
                    SolveState::Submitted,
                    SolveError::SafetyLimitExceeded {
                        limit: self.options.max_rounds,
                    },
                );
            }
            round_index += 1;
        }
    }

    /// Final artifact for the session; callers typically persist it with
    /// [`tilesolver_contracts::report::write_report`].
    pub fn build_report(&self, outcome: &SolveOutcome) -> SolveReport {
        let (outcome_text, rounds_processed, failure_kind, failure_detail) = match outcome {
            SolveOutcome::Solved { rounds_processed } => {
                ("solved".to_string(), *rounds_processed, None, None)
            }
            SolveOutcome::Failed(failure) => (
                "failed".to_string(),
                failure.round,
                Some(failure.error.kind().to_string()),
                Some(failure.error.to_string()),
            ),
        };
        SolveReport {
            session_id: self.events.session_id().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            outcome: outcome_text,
            rounds_processed,
            failure_kind,
            failure_detail,
            rounds: self.rounds.clone(),
        }
    }

    fn fail(
        &self,
        round: u32,
        state: SolveState,
        error: SolveError,
    ) -> Result<SolveOutcome> {
        warn!(
            round,
            state = state.as_str(),
            kind = error.kind(),
            "solving attempt failed"
        );
        self.events.emit(&SolveEvent::session_failed(
            round,
            state.as_str(),
            error.kind(),
            error.to_string(),
        ))?;
        Ok(SolveOutcome::Failed(SolveFailure {
            round,
            state,
            error,
        }))
    }
}
