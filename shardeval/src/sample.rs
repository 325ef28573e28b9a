//! Sharded dataset samples.

use crate::errors::Error;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// One incrementally revealed fragment of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Position in the original instruction. Accepts `3` or `"3"`.
    #[serde(deserialize_with = "deserialize_shard_id")]
    pub shard_id: u32,
    /// Fragment text.
    pub shard: String,
}

impl Shard {
    /// Creates a shard.
    pub fn new(shard_id: u32, shard: impl Into<String>) -> Self {
        Self {
            shard_id,
            shard: shard.into(),
        }
    }
}

/// A dataset entry: the task it belongs to, its shards and every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Task name, e.g. `qa`.
    pub task: String,
    /// Unique sample id, e.g. `sharded-qa/12`.
    pub task_id: String,
    /// Shards in dataset order.
    #[serde(default)]
    pub shards: Vec<Shard>,
    /// Remaining task-specific fields (question, choices, label, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Sample {
    /// A string field, if present.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Reads a JSON array of samples.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::Json` if the file cannot be read or parsed.
pub fn load_samples(path: impl AsRef<Path>) -> Result<Vec<Sample>, Error> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let samples: Vec<Sample> = serde_json::from_str(&raw)?;
    tracing::info!(
        event = "samples_loaded",
        path = %path.as_ref().display(),
        count = samples.len(),
        "samples_loaded"
    );
    Ok(samples)
}

fn deserialize_shard_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("shard_id '{text}' is not a non-negative integer"))
        }),
    }
}
