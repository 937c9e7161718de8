//! Per-query decode configuration.

use serde::{Deserialize, Serialize};

/// Default number of retained samples per query.
pub const DEFAULT_SERIES_CAPACITY: usize = 1000;

/// How a raw message payload is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// UTF-8 JSON document; the value is extracted via [`QuerySpec::data_path`].
    #[default]
    Json,
    /// Raw bytes interpreted per [`QuerySpec::value_encoding`].
    Bytes,
}

/// Numeric encoding of a raw-bytes payload.
///
/// Fixed-width encodings read the payload's leading bytes big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueEncoding {
    /// The whole payload as UTF-8 decimal text.
    #[default]
    Text,
    /// 4-byte IEEE 754 single-precision float, big-endian.
    Float32,
    /// 8-byte IEEE 754 double-precision float, big-endian.
    Float64,
    /// 2-byte signed integer, big-endian.
    Int16,
    /// 4-byte signed integer, big-endian.
    Int32,
}

/// One streaming query against one broker topic.
///
/// A spec is immutable once submitted. Re-submitting a query with the same
/// `ref_id` and a different topic is a re-subscription: the old pipeline is
/// torn down and a fresh one registered atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Identifier that keys this query's series in the merged output stream.
    pub ref_id: String,
    /// Broker topic to subscribe to.
    pub topic: String,
    /// Payload interpretation.
    #[serde(default)]
    pub data_format: DataFormat,
    /// Dotted-key/bracket-index path to the numeric leaf (`a.b[0]`).
    /// Only consulted when `data_format` is [`DataFormat::Json`].
    #[serde(default)]
    pub data_path: String,
    /// Numeric payload encoding. Only consulted when `data_format` is
    /// [`DataFormat::Bytes`].
    #[serde(default)]
    pub value_encoding: ValueEncoding,
    /// Maximum number of retained samples for this query.
    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,
}

fn default_series_capacity() -> usize {
    DEFAULT_SERIES_CAPACITY
}

impl QuerySpec {
    /// Create a JSON query for `topic`, extracting nothing until a path is set.
    pub fn new(ref_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            topic: topic.into(),
            data_format: DataFormat::Json,
            data_path: String::new(),
            value_encoding: ValueEncoding::Text,
            series_capacity: DEFAULT_SERIES_CAPACITY,
        }
    }

    /// Extract the numeric leaf at `path` from JSON payloads.
    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.data_format = DataFormat::Json;
        self.data_path = path.into();
        self
    }

    /// Interpret payloads as raw bytes under `encoding`.
    pub fn with_value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.data_format = DataFormat::Bytes;
        self.value_encoding = encoding;
        self
    }

    /// Override the retained-window size (default 1000).
    pub fn with_series_capacity(mut self, capacity: usize) -> Self {
        self.series_capacity = capacity;
        self
    }

    /// Check the fields that must be present before a subscription is issued.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.ref_id.trim().is_empty() {
            return Err("Query ref_id must not be empty".to_string());
        }
        if self.topic.trim().is_empty() {
            return Err(format!("Query '{}' has an empty topic", self.ref_id));
        }
        Ok(())
    }
}
