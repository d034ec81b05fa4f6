//! Client for the Gemini Live (`BidiGenerateContent`) streaming API.
//!
//! - `codec`: translation between relay frames and Gemini's JSON messages.
//! - `client`: the [`RealtimeConnector`](echospeak_core::realtime_api::RealtimeConnector)
//!   implementation that owns the WebSocket.

pub mod client;
pub mod codec;

pub use client::{GeminiConnector, GeminiOptions, GeminiSession, ensure_crypto_provider};
