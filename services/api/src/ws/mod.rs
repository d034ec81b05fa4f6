//! WebSocket Conversation Relay
//!
//! This module contains the logic for relaying real-time conversations
//! between a browser client and the Gemini backend. It is structured into
//! submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `relay`: Drives one relay session from handshake to teardown.
//! - `session`: Accepts WebSocket upgrades and hands each connection to a relay session.

mod protocol;
pub mod relay;
pub mod session;

pub use session::ws_handler;
