//! Core types for the EchoSpeak conversation relay.
//!
//! Everything here is independent of any transport: the data model shared by
//! the client protocol and the backend clients, the error taxonomy, the
//! session configuration builder, the upstream session traits and the turn
//! state machine.

pub mod error;
pub mod generic_types;
pub mod realtime_api;
pub mod scenario;
pub mod turn;

pub use error::RelayError;
pub use generic_types::{
    BackendEvent, InboundFrame, ModelPart, OutboundFrame, ProficiencyLevel, ResponseModality,
    SessionConfig, SessionParameters,
};
