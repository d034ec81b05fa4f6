//! EchoSpeak API Library Crate
//!
//! This library contains all the logic for the EchoSpeak relay service,
//! including configuration, application state, status handlers, the
//! conversation WebSocket relay, and routing. The `api` binary is a thin
//! wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
