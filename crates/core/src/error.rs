//! Error taxonomy shared by the relay and the upstream clients.

/// Every failure a relay session can observe, split by how far it spreads.
///
/// `MalformedFrame` is local to a single frame: the loop that hit it logs it,
/// drops the frame and keeps going. The other variants end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The client handshake was missing, late or out of order.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// One frame could not be decoded, in either direction.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    /// The backend session could not be opened.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The backend transport broke while sending input.
    #[error("Upstream send failed: {0}")]
    UpstreamSendFailed(String),
}

impl RelayError {
    /// Whether this error must tear the whole session down.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, RelayError::MalformedFrame(_))
    }
}
