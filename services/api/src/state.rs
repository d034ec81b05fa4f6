//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! and everything a relay session needs, built once at startup.

use crate::{config::Config, ws::relay::RelayContext};
use anyhow::Context;
use echospeak_core::{
    realtime_api::RealtimeConnector,
    scenario::{ScenarioCatalog, SessionConfigBuilder},
};
use gemini_realtime::{GeminiConnector, GeminiOptions};
use std::sync::Arc;
use tracing::{info, warn};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayContext,
}

impl AppState {
    /// Builds the scenario catalog, the session config builder and, when a
    /// credential is present, the Gemini connector.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut catalog = ScenarioCatalog::builtin();
        if let Some(path) = &config.prompts_path {
            catalog = catalog
                .with_overrides(path)
                .with_context(|| format!("Failed to load personas from {}", path.display()))?;
            info!(path = %path.display(), scenarios = ?catalog.scenarios(), "Loaded persona overrides.");
        }
        let config_builder = Arc::new(SessionConfigBuilder::new(
            catalog,
            config.response_modality,
            config.voice.clone(),
        ));

        let connector: Option<Arc<dyn RealtimeConnector>> = match &config.gemini_api_key {
            Some(api_key) => {
                let mut options = GeminiOptions::new(api_key.clone());
                options.model = config.gemini_model.clone();
                options.setup_timeout = config.setup_timeout;
                Some(Arc::new(GeminiConnector::new(options)))
            }
            None => {
                warn!("GEMINI_API_KEY is not set; conversations will be refused.");
                None
            }
        };

        Ok(Self {
            relay: RelayContext {
                config_builder,
                connector,
                handshake_timeout: config.handshake_timeout,
            },
            config: Arc::new(config),
        })
    }
}
