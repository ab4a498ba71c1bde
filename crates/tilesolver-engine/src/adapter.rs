use std::time::Duration;

use anyhow::Result;
use image::RgbImage;

/// Opaque handle for one presented challenge frame. Minted by the adapter
/// when a frame is detected; only meaningful to the adapter that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Page-interaction boundary of the engine.
///
/// Implementations own everything browser-shaped: locating the challenge
/// iframe, screenshotting the grid, clicking. The orchestrator only ever
/// talks to this trait, so it can be unit-tested against a scripted fake.
/// All calls are blocking from the orchestrator's perspective.
pub trait InteractionAdapter {
    /// Polls for a challenge frame for at most `timeout`. `Ok(None)` means
    /// no frame appeared — the orchestrator interprets that as solved, not
    /// as a failure.
    fn wait_for_challenge_frame(&mut self, timeout: Duration) -> Result<Option<FrameHandle>>;

    /// Raw instructional text of the challenge ("Select all squares with
    /// fire hydrants").
    fn read_instruction_text(&mut self, frame: &FrameHandle) -> Result<String>;

    /// Number of tile cells currently rendered in the grid.
    fn count_tiles(&mut self, frame: &FrameHandle) -> Result<usize>;

    /// Screenshot of the full grid area.
    fn capture_grid_image(&mut self, frame: &FrameHandle) -> Result<RgbImage>;

    /// Clicks the tile at a row-major position.
    fn click_tile(&mut self, frame: &FrameHandle, position: usize) -> Result<()>;

    fn click_submit(&mut self, frame: &FrameHandle) -> Result<()>;
}
