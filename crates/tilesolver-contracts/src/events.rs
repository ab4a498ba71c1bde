use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::report::now_utc_iso;

/// One step of a solve session, in the order the round loop emits them.
///
/// Serialized with a `type` tag (`session_started`, `challenge_detected`,
/// `grid_captured`, `tile_inference_failed`, `tiles_classified`,
/// `round_submitted`, `session_finished`); the writer adds `session_id`
/// and `ts` to every line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SolveEvent {
    SessionStarted {
        scorer: String,
        max_rounds: u32,
        frame_timeout_ms: u64,
    },
    ChallengeDetected {
        round: u32,
        label: String,
        category: Option<String>,
        grid_dimension: u32,
    },
    GridCaptured {
        round: u32,
        width: u32,
        height: u32,
        tiles: usize,
    },
    TileInferenceFailed {
        round: u32,
        position: usize,
    },
    TilesClassified {
        round: u32,
        matched_positions: Vec<usize>,
    },
    RoundSubmitted {
        round: u32,
        clicked: usize,
        matched_positions: Vec<usize>,
    },
    SessionFinished {
        outcome: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rounds_processed: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl SolveEvent {
    pub fn session_solved(rounds_processed: u32) -> Self {
        SolveEvent::SessionFinished {
            outcome: "solved".to_string(),
            rounds_processed: Some(rounds_processed),
            round: None,
            state: None,
            kind: None,
            detail: None,
        }
    }

    pub fn session_failed(round: u32, state: &str, kind: &str, detail: String) -> Self {
        SolveEvent::SessionFinished {
            outcome: "failed".to_string(),
            rounds_processed: None,
            round: Some(round),
            state: Some(state.to_string()),
            kind: Some(kind.to_string()),
            detail: Some(detail),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SolveEvent::SessionStarted { .. } => "session_started",
            SolveEvent::ChallengeDetected { .. } => "challenge_detected",
            SolveEvent::GridCaptured { .. } => "grid_captured",
            SolveEvent::TileInferenceFailed { .. } => "tile_inference_failed",
            SolveEvent::TilesClassified { .. } => "tiles_classified",
            SolveEvent::RoundSubmitted { .. } => "round_submitted",
            SolveEvent::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Append-only sink for a session's [`SolveEvent`] stream: one compact JSON
/// object per `events.jsonl` line, stamped with the session id and an
/// RFC3339 timestamp. Cloneable; clones share the same file and lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &SolveEvent) -> anyhow::Result<()> {
        let Value::Object(mut line) = serde_json::to_value(event)? else {
            bail!("solve event did not serialize to an object");
        };
        line.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let serialized = serde_json::to_string(&Value::Object(line))?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(serialized.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
