//! Exchange records and the logging seam.

use crate::errors::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shardeval_client::Message;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Type tag of the trailing trace entry.
pub const ANSWER_EVALUATION: &str = "answer-evaluation";

/// Marker serialized as `"role": "log"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRole {
    /// Log entry.
    Log,
}

/// Extracted answer and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    /// Always [`ANSWER_EVALUATION`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Answer handed to the evaluator (empty when extraction was exhausted).
    pub extracted_answer: String,
    /// Perfect score.
    pub is_correct: bool,
    /// Evaluator score.
    pub score: Option<f64>,
    /// Evaluator detail.
    pub evaluation_detail: Value,
    /// Extraction calls issued.
    pub extraction_attempts: usize,
}

/// A non-message entry in a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Always `log`.
    pub role: LogRole,
    /// Payload.
    pub content: AnswerEvaluation,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

/// One element of a trace: a message or a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceEntry {
    /// Conversation message.
    Message(Message),
    /// Evaluation log.
    Log(LogEntry),
}

/// Everything recorded about one simulated exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Random id.
    pub conv_id: Uuid,
    /// `full`, `concat` or `shuffle-concat`, with an optional `-t{temp}` suffix.
    pub conv_type: String,
    /// Task name.
    pub task: String,
    /// Sample id.
    pub task_id: String,
    /// Dataset file name, or `unknown`.
    pub dataset_fn: String,
    /// Model under evaluation.
    pub assistant_model: String,
    /// Model used for extraction.
    pub system_model: String,
    /// Messages followed by the evaluation entry.
    pub trace: Vec<TraceEntry>,
    /// Perfect score.
    pub is_correct: bool,
    /// Evaluator score.
    pub score: Option<f64>,
}

impl ExchangeRecord {
    /// The evaluation entry, if present.
    #[must_use]
    pub fn evaluation(&self) -> Option<&AnswerEvaluation> {
        self.trace.iter().rev().find_map(|entry| match entry {
            TraceEntry::Log(log) => Some(&log.content),
            TraceEntry::Message(_) => None,
        })
    }

    /// The conversation messages, without log entries.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.trace.iter().filter_map(|entry| match entry {
            TraceEntry::Message(message) => Some(message),
            TraceEntry::Log(_) => None,
        })
    }
}

/// Receives finished exchanges.
pub trait ConversationLogger: Send + Sync {
    /// Records one exchange.
    ///
    /// # Errors
    ///
    /// Returns `Error::Logger` if the record could not be written.
    fn log(&self, record: &ExchangeRecord) -> Result<(), Error>;
}

/// Writes one JSON object per line.
pub struct JsonLinesLogger<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesLogger<std::io::Stdout> {
    /// Logger on standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesLogger<W> {
    /// Logger on an arbitrary writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ConversationLogger for JsonLinesLogger<W> {
    fn log(&self, record: &ExchangeRecord) -> Result<(), Error> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| Error::Logger(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ExchangeRecord {
        ExchangeRecord {
            conv_id: Uuid::new_v4(),
            conv_type: "concat".to_string(),
            task: "qa".to_string(),
            task_id: "sharded-qa/1".to_string(),
            dataset_fn: "sharded_qa.json".to_string(),
            assistant_model: "gemini-2.5-flash".to_string(),
            system_model: "gemini-2.5-flash".to_string(),
            trace: vec![
                TraceEntry::Message(Message::user("Q")),
                TraceEntry::Message(Message::assistant("B.")),
                TraceEntry::Log(LogEntry {
                    role: LogRole::Log,
                    content: AnswerEvaluation {
                        kind: ANSWER_EVALUATION.to_string(),
                        extracted_answer: "B.".to_string(),
                        is_correct: true,
                        score: Some(1.0),
                        evaluation_detail: json!({"expected": "B"}),
                        extraction_attempts: 1,
                    },
                    timestamp: Utc::now(),
                }),
            ],
            is_correct: true,
            score: Some(1.0),
        }
    }

    #[test]
    fn test_trace_wire_shape() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["trace"][0]["role"], "user");
        assert_eq!(value["trace"][1]["role"], "assistant");
        assert_eq!(value["trace"][2]["role"], "log");
        assert_eq!(value["trace"][2]["content"]["type"], "answer-evaluation");
        assert!(value["trace"][2]["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_trace_parses_back() {
        let original = record();
        let parsed: ExchangeRecord =
            serde_json::from_str(&serde_json::to_string(&original).unwrap()).unwrap();
        assert_eq!(parsed.evaluation().unwrap().extracted_answer, "B.");
        assert_eq!(parsed.messages().count(), 2);
    }

    #[test]
    fn test_json_lines_logger_writes_one_line_per_record() {
        let logger = JsonLinesLogger::new(Vec::new());
        logger.log(&record()).unwrap();
        logger.log(&record()).unwrap();

        let output = String::from_utf8(logger.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["task_id"], "sharded-qa/1");
    }
}
