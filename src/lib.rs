//! # pulse-link
//!
//! A streaming client engine that turns publish/subscribe broker topics into
//! bounded numeric time series.
//!
//! Each query subscribes one topic, decodes every published message into a
//! numeric sample (JSON path extraction or fixed-width big-endian binary),
//! accumulates samples in a fixed-capacity ring, and pushes the full current
//! window downstream on every update. Queries of one client share a single
//! broker connection with refcounted topic subscriptions, automatic
//! reconnection, and subscription replay.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulse_link::{PulseLinkClient, QuerySpec, ValueEncoding};
//!
//! # async fn example() -> pulse_link::Result<()> {
//! let client = PulseLinkClient::builder()
//!     .endpoint("ws://localhost:9001/")
//!     .build()?;
//!
//! let mut stream = client
//!     .query(vec![
//!         QuerySpec::new("temp", "sensors/temp").with_json_path("reading.celsius"),
//!         QuerySpec::new("raw", "sensors/raw").with_value_encoding(ValueEncoding::Float32),
//!     ])
//!     .await?;
//!
//! while let Some(update) = stream.next().await {
//!     println!("{}: {} points", update.ref_id, update.points.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod decode;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod series;
pub mod stream;
pub mod timeouts;
pub mod transport;

mod topics;

pub use client::{PulseLinkClient, PulseLinkClientBuilder};
pub use connection::ConnectionState;
pub use decode::{decode_sample, DecodeError};
pub use error::{PulseLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ClientMessage, ConnectionConfig, ConnectionOptions, Credentials, DataFormat, HealthReport,
    HealthStatus, QuerySpec, ServerMessage, StreamStatus, StreamUpdate, ValueEncoding,
    DEFAULT_SERIES_CAPACITY,
};
pub use series::{Sample, Series};
pub use stream::QueryStream;
pub use timeouts::{PulseLinkTimeouts, PulseLinkTimeoutsBuilder};
pub use transport::{Session, SessionEvent, Transport, WsTransport};
