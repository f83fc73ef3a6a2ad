//! Tool-call log - one JSON object per line, append-only.
//!
//! ```json
//! {"type":"tool_call","ts":"2026-10-18T10:30:00Z","conversationId":"...","tool":"adjust_stock","classification":"WRITE","outcome":"proposed","durationMs":4,"argsSummary":"{keys: [delta, item]}"}
//! {"type":"model_failure","ts":"2026-10-18T10:30:01Z","conversationId":"...","phase":2,"error":"HTTP 502"}
//! ```

use crate::error::{MediationError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stockgate_db::ConversationId;

#[derive(Debug)]
pub struct ToolCallLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogEntry<'a> {
    #[serde(rename_all = "camelCase")]
    ToolCall {
        ts: DateTime<Utc>,
        conversation_id: &'a str,
        tool: &'a str,
        classification: &'a str,
        outcome: &'a str,
        duration_ms: u64,
        args_summary: String,
    },
    #[serde(rename_all = "camelCase")]
    ModelFailure {
        ts: DateTime<Utc>,
        conversation_id: &'a str,
        phase: u8,
        error: &'a str,
    },
}

impl ToolCallLog {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MediationError::Storage(format!("Failed to create tool log directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MediationError::Storage(format!("Failed to open tool log: {}", e)))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn log_tool_call(
        &self,
        conversation_id: &ConversationId,
        tool: &str,
        classification: &str,
        outcome: &str,
        duration_ms: u64,
        args: &Value,
    ) -> Result<()> {
        self.write_entry(&LogEntry::ToolCall {
            ts: Utc::now(),
            conversation_id: conversation_id.as_str(),
            tool,
            classification,
            outcome,
            duration_ms,
            args_summary: summarize_args(args),
        })
    }

    pub fn log_model_failure(
        &self,
        conversation_id: &ConversationId,
        phase: u8,
        error: &str,
    ) -> Result<()> {
        self.write_entry(&LogEntry::ModelFailure {
            ts: Utc::now(),
            conversation_id: conversation_id.as_str(),
            phase,
            error,
        })
    }

    fn write_entry(&self, entry: &LogEntry<'_>) -> Result<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| MediationError::Storage(format!("Failed to serialize log entry: {}", e)))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| MediationError::Storage(format!("Failed to lock tool log: {}", e)))?;

        writeln!(writer, "{}", json)
            .and_then(|_| writer.flush())
            .map_err(|e| MediationError::Storage(format!("Failed to write tool log: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Argument keys only; values may carry customer data.
fn summarize_args(args: &Value) -> String {
    match args {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            format!("{{keys: [{}]}}", keys.join(", "))
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Null => "null".to_string(),
        _ => "[value]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_entries_are_ndjson() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("tools.ndjson");
        let log = ToolCallLog::new(&path).unwrap();
        let conversation = ConversationId::from_string("c1");

        log.log_tool_call(
            &conversation,
            "adjust_stock",
            "WRITE",
            "proposed",
            3,
            &json!({"item": {"name": "secret customer box"}, "delta": 2}),
        )
        .unwrap();
        log.log_model_failure(&conversation, 2, "timeout").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "tool_call");
        assert_eq!(lines[0]["durationMs"], 3);
        assert_eq!(lines[1]["type"], "model_failure");
        assert!(!content.contains("secret customer box"));
    }
}
