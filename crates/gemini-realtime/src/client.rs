//! Upstream session client for the Gemini Live API.

use crate::codec;
use async_trait::async_trait;
use echospeak_core::{
    BackendEvent, InboundFrame, RelayError, SessionConfig,
    realtime_api::{BackendEventStream, RealtimeApi, RealtimeConnector},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{self, SplitSink, SplitStream},
};
use std::{
    sync::{
        Arc, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Installs the `ring` rustls provider unless the process already chose one.
///
/// `wss://` connections need a process-level provider; without one, the TLS
/// handshake panics instead of failing.
pub fn ensure_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Losing a race to another installer is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

/// Connection settings, fixed for the life of the process.
#[derive(Clone, Debug)]
pub struct GeminiOptions {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// How long `open` waits for `setupComplete`.
    pub setup_timeout: Duration,
}

impl GeminiOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
        }
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }
}

/// Opens one [`GeminiSession`] per relay session.
#[derive(Clone, Debug)]
pub struct GeminiConnector {
    options: GeminiOptions,
}

impl GeminiConnector {
    pub fn new(options: GeminiOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl RealtimeConnector for GeminiConnector {
    async fn open(&self, config: SessionConfig) -> Result<Arc<dyn RealtimeApi>, RelayError> {
        let session = GeminiSession::connect(&self.options, &config).await?;
        Ok(Arc::new(session))
    }
}

/// A configured Gemini Live session.
pub struct GeminiSession {
    sink: Mutex<SplitSink<WsStream, WsMessage>>,
    stream: std::sync::Mutex<Option<SplitStream<WsStream>>>,
    closed: AtomicBool,
}

impl GeminiSession {
    /// Connects, sends the setup message and waits for `setupComplete`.
    ///
    /// The whole handshake is bounded by `options.setup_timeout`.
    pub async fn connect(
        options: &GeminiOptions,
        config: &SessionConfig,
    ) -> Result<Self, RelayError> {
        ensure_crypto_provider();
        let handshake = async {
            let (ws_stream, _) = connect_async(options.url()).await.map_err(|e| {
                RelayError::UpstreamUnavailable(format!("connection rejected: {}", e))
            })?;
            info!("Connected to Gemini Realtime WebSocket.");
            let (mut gemini_tx, mut gemini_rx) = ws_stream.split();

            let setup = codec::encode_setup(config, &options.model)
                .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;
            gemini_tx
                .send(WsMessage::Text(setup.into()))
                .await
                .map_err(|e| RelayError::UpstreamUnavailable(format!("setup not sent: {}", e)))?;

            wait_for_setup_complete(&mut gemini_rx).await?;
            Ok::<_, RelayError>((gemini_tx, gemini_rx))
        };

        let (gemini_tx, gemini_rx) = tokio::time::timeout(options.setup_timeout, handshake)
            .await
            .map_err(|_| {
                RelayError::UpstreamUnavailable(format!(
                    "no setup acknowledgment within {:?}",
                    options.setup_timeout
                ))
            })??;
        info!("Gemini session setup is complete. Ready for bidirectional streaming.");

        Ok(Self {
            sink: Mutex::new(gemini_tx),
            stream: std::sync::Mutex::new(Some(gemini_rx)),
            closed: AtomicBool::new(false),
        })
    }
}

async fn wait_for_setup_complete(gemini_rx: &mut SplitStream<WsStream>) -> Result<(), RelayError> {
    while let Some(msg_result) = gemini_rx.next().await {
        let text = match msg_result {
            Ok(WsMessage::Text(text)) => text.as_str().to_string(),
            Ok(WsMessage::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(WsMessage::Close(close_frame)) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "closed during setup: {:?}",
                    close_frame
                )));
            }
            Ok(_) => continue,
            Err(e) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "error during setup: {}",
                    e
                )));
            }
        };
        match codec::decode_from_backend(&text) {
            Ok(events) if events.contains(&BackendEvent::SetupAcknowledged) => return Ok(()),
            Ok(_) => warn!("Received unexpected message during Gemini setup: {}", text),
            Err(e) => error!(error = %e, "Failed to parse Gemini message during setup"),
        }
    }
    Err(RelayError::UpstreamUnavailable(
        "connection ended during setup".to_string(),
    ))
}

/// Reads the next batch of events off the socket.
///
/// Returns `None` once the backend closed the session cleanly; a broken
/// connection yields a final `TransportError` batch instead.
async fn next_batch(
    mut gemini_rx: SplitStream<WsStream>,
) -> Option<(Vec<Result<BackendEvent, RelayError>>, Option<SplitStream<WsStream>>)> {
    loop {
        let decoded = match gemini_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => codec::decode_from_backend(text.as_str()),
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => codec::decode_from_backend(text),
                Err(e) => Err(RelayError::MalformedFrame(format!(
                    "backend frame is not UTF-8: {}",
                    e
                ))),
            },
            Some(Ok(WsMessage::Close(close_frame))) => {
                info!(?close_frame, "Gemini WebSocket connection closed by server.");
                return None;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("Error reading from Gemini WebSocket: {}", e);
                return Some((vec![Ok(BackendEvent::TransportError(e.to_string()))], None));
            }
            None => {
                let reason = "connection dropped without a close frame".to_string();
                return Some((vec![Ok(BackendEvent::TransportError(reason))], None));
            }
        };
        let batch = match decoded {
            Ok(events) => events.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        return Some((batch, Some(gemini_rx)));
    }
}

#[async_trait]
impl RealtimeApi for GeminiSession {
    async fn send_input(&self, frame: InboundFrame) -> Result<(), RelayError> {
        let payload = codec::encode_to_backend(&frame)
            .map_err(|e| RelayError::MalformedFrame(e.to_string()))?;
        let Some(payload) = payload else {
            debug!("Gemini has no interrupt message; handled locally.");
            return Ok(());
        };
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::UpstreamSendFailed(
                "session already closed".to_string(),
            ));
        }
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| RelayError::UpstreamSendFailed(e.to_string()))
    }

    fn events(&self) -> Result<BackendEventStream, RelayError> {
        let gemini_rx = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                RelayError::UpstreamUnavailable("event stream was already taken".to_string())
            })?;

        let batches = stream::unfold(Some(gemini_rx), |state| async move {
            next_batch(state?).await
        });
        Ok(Box::pin(batches.flat_map(stream::iter)))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Gemini socket was already gone while closing");
        }
        info!("Gemini session closed.");
    }
}
