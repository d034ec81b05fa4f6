use crate::{
    error::RelayError,
    generic_types::{BackendEvent, InboundFrame, SessionConfig},
};
use async_trait::async_trait;
use futures::Stream;
use std::{pin::Pin, sync::Arc};

/// The backend's output, in arrival order.
///
/// `Err` items are always [`RelayError::MalformedFrame`]: the consumer drops
/// that frame and keeps reading. A broken connection is reported as a final
/// [`BackendEvent::TransportError`]; a stream that simply ends was closed on
/// purpose.
pub type BackendEventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent, RelayError>> + Send>>;

/// One open, configured session with a realtime generation backend.
///
/// Methods take `&self` so the relay's two loops can share the session: one
/// sends input while the other drains events.
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    /// Translates one client frame into the backend's wire form and sends it.
    async fn send_input(&self, frame: InboundFrame) -> Result<(), RelayError>;

    /// Hands out the event stream. Can be taken once; later calls fail.
    fn events(&self) -> Result<BackendEventStream, RelayError>;

    /// Releases the transport. Idempotent and safe after a transport error.
    async fn close(&self);
}

/// Opens backend sessions. One connector is shared by every relay session.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Connects, sends `config` as the opening handshake and waits for the
    /// backend to acknowledge it.
    async fn open(&self, config: SessionConfig) -> Result<Arc<dyn RealtimeApi>, RelayError>;
}
