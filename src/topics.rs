//! Refcounted topic subscription table.
//!
//! Tracks how many active queries depend on each broker topic. The connection
//! task consults the table to decide when the transport must be told to
//! subscribe or unsubscribe: exactly once per 0→1 transition and once per
//! 1→0 transition, never more. Invariant: the set of transport-subscribed
//! topics equals the set of topics with refcount > 0.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct TopicTable {
    refcounts: HashMap<String, usize>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more query depending on `topic`.
    ///
    /// Returns `true` when the topic became active (0→1) and the caller must
    /// subscribe it on the transport.
    pub fn acquire(&mut self, topic: &str) -> bool {
        let count = self.refcounts.entry(topic.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Record one less query depending on `topic`.
    ///
    /// Returns `true` when the topic became inactive (1→0) and the caller
    /// must unsubscribe it on the transport. Releasing an unknown topic is a
    /// no-op.
    pub fn release(&mut self, topic: &str) -> bool {
        let Some(count) = self.refcounts.get_mut(topic) else {
            return false;
        };
        if *count > 1 {
            *count -= 1;
            return false;
        }
        self.refcounts.remove(topic);
        true
    }

    /// Topics with refcount > 0, sorted for deterministic replay order.
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.refcounts.keys().cloned().collect();
        topics.sort();
        topics
    }

    #[cfg(test)]
    pub fn refcount(&self, topic: &str) -> usize {
        self.refcounts.get(topic).copied().unwrap_or(0)
    }
}
