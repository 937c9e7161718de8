//! Output pushed to the consumer of a query stream.

use serde::{Deserialize, Serialize};

use crate::series::Sample;

/// Status accompanying a [`StreamUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamStatus {
    /// The query is live; `points` holds its current window.
    Streaming,
    /// The query can no longer be serviced: a configuration error at
    /// registration, or reconnection retries exhausted. No further updates
    /// will follow for this `ref_id`.
    Error {
        /// What went wrong.
        message: String,
    },
}

/// One push to the consumer: the full retained window of one query.
///
/// Every decoded sample triggers a fresh update carrying the whole window,
/// never an incremental delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamUpdate {
    /// The query this update belongs to.
    pub ref_id: String,
    /// Current window in arrival order, bounded by the query's capacity.
    pub points: Vec<Sample>,
    /// Stream status.
    pub status: StreamStatus,
}

impl StreamUpdate {
    /// A live-data update.
    pub(crate) fn streaming(ref_id: impl Into<String>, points: Vec<Sample>) -> Self {
        Self {
            ref_id: ref_id.into(),
            points,
            status: StreamStatus::Streaming,
        }
    }

    /// A terminal error update.
    pub(crate) fn error(ref_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            points: Vec::new(),
            status: StreamStatus::Error {
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_form() {
        let update = StreamUpdate::streaming("A", vec![Sample::new(1, Some(2.0))]);
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""state":"streaming""#), "json: {}", json);

        let update = StreamUpdate::error("B", "empty topic");
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""state":"error""#), "json: {}", json);
        assert!(json.contains("empty topic"));
    }
}
