//! Merged output stream for a set of concurrently active queries.
//!
//! One [`QueryStream`] carries the updates of every query submitted in a
//! single `query()` call, tagged by `ref_id`. Dropping or closing the stream
//! releases each query's topic on the shared connection, so cancellation is
//! delivered on every exit path.

use tokio::sync::mpsc;

use crate::{connection::ConnCmd, models::StreamUpdate};

/// Capacity of the merged update channel per `query()` call.
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Push-based, merged stream of snapshot updates.
///
/// Returned by [`crate::PulseLinkClient::query`]. Consume with
/// [`next`](QueryStream::next); each element is the full current window of
/// one query.
///
/// # Examples
///
/// ```rust,no_run
/// use pulse_link::{PulseLinkClient, QuerySpec};
///
/// # async fn example() -> pulse_link::Result<()> {
/// let client = PulseLinkClient::builder()
///     .endpoint("ws://localhost:9001/")
///     .build()?;
///
/// let mut stream = client
///     .query(vec![QuerySpec::new("A", "sensors/temp").with_json_path("value")])
///     .await?;
///
/// while let Some(update) = stream.next().await {
///     println!("{}: {} points", update.ref_id, update.points.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct QueryStream {
    update_rx: mpsc::Receiver<StreamUpdate>,
    /// `(ref_id, generation)` pairs registered on the connection task.
    attached: Vec<(String, u64)>,
    cmd_tx: mpsc::Sender<ConnCmd>,
    closed: bool,
}

impl QueryStream {
    pub(crate) fn new(
        update_rx: mpsc::Receiver<StreamUpdate>,
        attached: Vec<(String, u64)>,
        cmd_tx: mpsc::Sender<ConnCmd>,
    ) -> Self {
        Self {
            update_rx,
            attached,
            cmd_tx,
            closed: false,
        }
    }

    /// Receive the next snapshot update.
    ///
    /// Returns `None` after [`close`](QueryStream::close), or once the
    /// connection has gone away for good.
    pub async fn next(&mut self) -> Option<StreamUpdate> {
        if self.closed {
            return None;
        }
        self.update_rx.recv().await
    }

    /// Release every attached query and end the stream.
    ///
    /// Safe to call multiple times; subsequent calls are no-ops.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for (ref_id, generation) in self.attached.drain(..) {
            let _ = self
                .cmd_tx
                .send(ConnCmd::Detach { ref_id, generation })
                .await;
        }
    }

    /// Returns `true` if `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        // Fire-and-forget release of every attached query. If close() ran
        // first, `attached` is already empty and this is a no-op.
        for (ref_id, generation) in self.attached.drain(..) {
            let _ = self.cmd_tx.try_send(ConnCmd::Detach { ref_id, generation });
        }
    }
}
