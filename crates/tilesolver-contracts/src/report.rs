use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One completed round, as recorded in the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub index: u32,
    pub target_label: String,
    pub resolved_category: Option<String>,
    pub grid_dimension: u32,
    pub matched_positions: Vec<usize>,
}

/// Final artifact of a solve session, written next to `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub outcome: String,
    pub rounds_processed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    pub rounds: Vec<RoundRecord>,
}

pub fn write_report(path: &Path, report: &SolveReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn write_report_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("out").join("report.json");

        let report = SolveReport {
            session_id: "session-123".to_string(),
            started_at: "2026-08-30T00:00:00+00:00".to_string(),
            finished_at: "2026-08-30T00:00:42+00:00".to_string(),
            outcome: "solved".to_string(),
            rounds_processed: 2,
            failure_kind: None,
            failure_detail: None,
            rounds: vec![RoundRecord {
                index: 1,
                target_label: "select all squares with crosswalks".to_string(),
                resolved_category: Some("crosswalk".to_string()),
                grid_dimension: 3,
                matched_positions: vec![2, 5],
            }],
        };
        write_report(&path, &report)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["outcome"], json!("solved"));
        assert_eq!(parsed["rounds_processed"], json!(2));
        assert_eq!(parsed["rounds"][0]["matched_positions"], json!([2, 5]));
        assert!(parsed.get("failure_kind").is_none());

        let back: SolveReport = serde_json::from_value(parsed)?;
        assert_eq!(back, report);
        Ok(())
    }

    #[test]
    fn failure_fields_appear_when_set() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("report.json");

        let report = SolveReport {
            session_id: "session-9".to_string(),
            started_at: now_utc_iso(),
            finished_at: now_utc_iso(),
            outcome: "failed".to_string(),
            rounds_processed: 15,
            failure_kind: Some("safety_limit_exceeded".to_string()),
            failure_detail: Some("safety limit of 15 rounds exceeded".to_string()),
            rounds: Vec::new(),
        };
        write_report(&path, &report)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["failure_kind"], json!("safety_limit_exceeded"));
        Ok(())
    }
}
