//! The relay session: one client connection bridged to one backend session.
//!
//! A session moves through `connecting → configuring → active → closing →
//! closed`. While active, two spawned tasks forward frames: the inbound loop
//! (client → backend) and the outbound loop (backend → client). They share
//! nothing but the mutex-guarded [`TurnTracker`] and a cancellation token.
//! Whichever loop stops first runs the teardown, which happens exactly once.

use super::protocol;
use anyhow::{Result, anyhow};
use axum::extract::ws::Message;
use echospeak_core::{
    BackendEvent, InboundFrame, OutboundFrame, RelayError, SessionParameters,
    realtime_api::{BackendEventStream, RealtimeApi, RealtimeConnector},
    scenario::SessionConfigBuilder,
    turn::{InputDecision, OutputDecision, TurnTracker},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Everything a relay session needs from the process, fixed at startup.
#[derive(Clone)]
pub struct RelayContext {
    pub config_builder: Arc<SessionConfigBuilder>,
    /// `None` when no backend credential is configured.
    pub connector: Option<Arc<dyn RealtimeConnector>>,
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Configuring,
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away before finishing the handshake.
    ClientLeft,
    /// The handshake or the backend setup failed.
    Rejected(RelayError),
    /// The client closed its connection.
    ClientClosed,
    /// Reading from or writing to the client failed.
    ClientFailed(String),
    /// The backend closed the session on purpose.
    BackendClosed,
    /// The backend connection broke.
    BackendFailed(String),
}

impl SessionEnd {
    /// The error message owed to the client, if it may still be listening.
    fn client_notice(&self) -> Option<String> {
        match self {
            SessionEnd::Rejected(e) => Some(e.to_string()),
            SessionEnd::BackendFailed(reason) => {
                Some(format!("Conversation service connection lost: {}", reason))
            }
            SessionEnd::BackendClosed => Some("Conversation service ended the session".to_string()),
            _ => None,
        }
    }
}

/// Serializes and sends one frame to the client.
pub(crate) async fn send_frame<Tx>(socket_tx: &mut Tx, frame: &OutboundFrame) -> Result<()>
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    let serialized = protocol::encode_outbound(frame)?;
    socket_tx
        .send(Message::Text(serialized.into()))
        .await
        .map_err(|e| anyhow!("{}", e))
}

async fn close_client<Tx>(socket_tx: &mut Tx)
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    if let Err(e) = socket_tx.send(Message::Close(None)).await {
        debug!(error = %e, "Client connection already closed");
    }
    let _ = socket_tx.close().await;
}

/// Closes both sides of an active session. Only the first call does anything.
struct Teardown<Tx> {
    closed: AtomicBool,
    cancel: CancellationToken,
    upstream: Arc<dyn RealtimeApi>,
    client_tx: Arc<Mutex<Tx>>,
}

impl<Tx> Teardown<Tx>
where
    Tx: Sink<Message> + Unpin + Send,
    Tx::Error: Display,
{
    fn new(
        cancel: CancellationToken,
        upstream: Arc<dyn RealtimeApi>,
        client_tx: Arc<Mutex<Tx>>,
    ) -> Self {
        Self {
            closed: AtomicBool::new(false),
            cancel,
            upstream,
            client_tx,
        }
    }

    /// Returns `true` for the call that actually closed the session.
    async fn run(&self, end: &SessionEnd) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(phase = ?SessionPhase::Closing, ?end, "Tearing down relay session.");
        self.cancel.cancel();
        self.upstream.close().await;

        let mut sink = self.client_tx.lock().await;
        if let Some(message) = end.client_notice() {
            if let Err(e) = send_frame(&mut *sink, &OutboundFrame::Error(message)).await {
                debug!(error = %e, "Could not notify client before closing");
            }
        }
        close_client(&mut *sink).await;
        info!(phase = ?SessionPhase::Closed, "Relay session closed.");
        true
    }
}

/// One client connection and, once configured, its backend session.
pub struct RelaySession<Tx, Rx> {
    context: RelayContext,
    client_tx: Tx,
    client_rx: Rx,
}

impl<Tx, Rx, E> RelaySession<Tx, Rx>
where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(context: RelayContext, client_tx: Tx, client_rx: Rx) -> Self {
        Self {
            context,
            client_tx,
            client_rx,
        }
    }

    /// Drives the session to completion.
    pub async fn run(self) -> SessionEnd {
        let RelaySession {
            context,
            mut client_tx,
            mut client_rx,
        } = self;

        debug!(phase = ?SessionPhase::Connecting, "Awaiting session parameters.");
        let params =
            match await_handshake(&mut client_rx, context.handshake_timeout).await {
                Ok(Some(params)) => params,
                Ok(None) => {
                    info!("Client disconnected before sending session parameters.");
                    return SessionEnd::ClientLeft;
                }
                Err(e) => return reject(&mut client_tx, e).await,
            };

        let span = tracing::Span::current();
        span.record("scenario", params.scenario.as_str());
        span.record("level", tracing::field::display(params.proficiency_level));
        if !context.config_builder.catalog().contains(&params.scenario) {
            warn!("Unknown scenario; using the generic persona.");
        }
        info!(phase = ?SessionPhase::Configuring, "Opening backend session.");

        let (upstream, events) = match open_upstream(&context, &params).await {
            Ok(opened) => opened,
            Err(e) => {
                error!(error = %e, "Backend session could not be opened");
                return reject(&mut client_tx, e).await;
            }
        };

        let greeting = OutboundFrame::Text(
            context
                .config_builder
                .opening_line(&params.scenario)
                .to_string(),
        );
        for frame in [OutboundFrame::Ready, greeting] {
            if let Err(e) = send_frame(&mut client_tx, &frame).await {
                error!(error = %e, "Failed to greet client");
                upstream.close().await;
                close_client(&mut client_tx).await;
                return SessionEnd::ClientFailed(e.to_string());
            }
        }
        info!(phase = ?SessionPhase::Active, "Session is active.");

        let turn = Arc::new(Mutex::new(TurnTracker::new()));
        let cancel = CancellationToken::new();
        let client_tx = Arc::new(Mutex::new(client_tx));
        let teardown = Arc::new(Teardown::new(cancel.clone(), upstream.clone(), client_tx.clone()));

        let inbound = tokio::spawn({
            let (upstream, turn, cancel, teardown) =
                (upstream.clone(), turn.clone(), cancel.clone(), teardown.clone());
            async move {
                let end = inbound_loop(client_rx, upstream, turn, cancel).await?;
                teardown.run(&end).await.then_some(end)
            }
            .instrument(span.clone())
        });
        let outbound = tokio::spawn({
            let teardown = teardown.clone();
            async move {
                let end = outbound_loop(events, client_tx, turn, cancel).await?;
                teardown.run(&end).await.then_some(end)
            }
            .instrument(span)
        });

        let (inbound, outbound) = tokio::join!(inbound, outbound);
        let mut ends = [inbound, outbound].into_iter().filter_map(|joined| match joined {
            Ok(end) => end,
            Err(e) => {
                error!(error = %e, "Relay task failed");
                None
            }
        });
        match ends.next() {
            Some(end) => end,
            None => {
                let end = SessionEnd::ClientFailed("relay task aborted".to_string());
                teardown.run(&end).await;
                end
            }
        }
    }
}

/// Waits for the first text frame and parses it as session parameters.
///
/// `Ok(None)` means the client left without saying anything.
async fn await_handshake<Rx, E>(
    client_rx: &mut Rx,
    handshake_timeout: Duration,
) -> Result<Option<SessionParameters>, RelayError>
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let first_frame = async {
        loop {
            match client_rx.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(protocol::decode_handshake(text.as_str()));
                }
                Some(Ok(Message::Binary(_))) => {
                    return Some(Err(RelayError::ProtocolViolation(
                        "expected session parameters first, got binary audio".to_string(),
                    )));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    warn!(error = %e, "Error receiving handshake from client");
                    return None;
                }
            }
        }
    };
    match tokio::time::timeout(handshake_timeout, first_frame).await {
        Ok(Some(result)) => result.map(Some),
        Ok(None) => Ok(None),
        Err(_) => Err(RelayError::ProtocolViolation(format!(
            "no session parameters within {:?}",
            handshake_timeout
        ))),
    }
}

async fn open_upstream(
    context: &RelayContext,
    params: &SessionParameters,
) -> Result<(Arc<dyn RealtimeApi>, BackendEventStream), RelayError> {
    let connector = context.connector.as_ref().ok_or_else(|| {
        RelayError::UpstreamUnavailable("backend credential is not configured".to_string())
    })?;
    let config = context.config_builder.build(params);
    let upstream = connector.open(config).await?;
    match upstream.events() {
        Ok(events) => Ok((upstream, events)),
        Err(e) => {
            upstream.close().await;
            Err(e)
        }
    }
}

/// Reports a setup failure to the client and closes it.
async fn reject<Tx>(client_tx: &mut Tx, error: RelayError) -> SessionEnd
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    warn!(error = %error, "Rejecting session");
    let end = SessionEnd::Rejected(error);
    if let Some(message) = end.client_notice() {
        let _ = send_frame(client_tx, &OutboundFrame::Error(message)).await;
    }
    close_client(client_tx).await;
    end
}

/// Client → backend. Returns `None` when cancelled by the other loop.
async fn inbound_loop<Rx, E>(
    mut client_rx: Rx,
    upstream: Arc<dyn RealtimeApi>,
    turn: Arc<Mutex<TurnTracker>>,
    cancel: CancellationToken,
) -> Option<SessionEnd>
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let msg_result = tokio::select! {
            _ = cancel.cancelled() => return None,
            msg_result = client_rx.next() => msg_result,
        };
        let decoded = match msg_result {
            Some(Ok(Message::Text(text))) => protocol::decode_inbound(text.as_str()),
            Some(Ok(Message::Binary(data))) => Ok(protocol::decode_binary_audio(data)),
            Some(Ok(Message::Close(_))) | None => {
                info!("Client closed the connection.");
                return Some(SessionEnd::ClientClosed);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Err(e)) => {
                error!("Error receiving from client WebSocket: {}", e);
                return Some(SessionEnd::ClientFailed(e.to_string()));
            }
        };
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed client frame");
                continue;
            }
        };

        let decision = {
            let mut turn = turn.lock().await;
            match &frame {
                InboundFrame::AudioChunk { .. } | InboundFrame::Text(_) => turn.on_user_content(),
                InboundFrame::EndOfTurn => turn.on_end_of_turn(),
                InboundFrame::Interrupt => {
                    if turn.on_interrupt() {
                        info!("Client interrupted the model; discarding the rest of its turn.");
                    }
                    continue;
                }
            }
        };
        if decision == InputDecision::Drop {
            debug!("Dropping client input while the model holds the turn.");
            continue;
        }

        let sent = tokio::select! {
            _ = cancel.cancelled() => return None,
            sent = upstream.send_input(frame) => sent,
        };
        match sent {
            Ok(()) => {}
            Err(e) if !e.is_session_fatal() => warn!(error = %e, "Dropping unsendable frame"),
            Err(e) => {
                error!(error = %e, "Failed to forward client input to backend");
                return Some(SessionEnd::BackendFailed(e.to_string()));
            }
        }
    }
}

/// Backend → client. Returns `None` when cancelled by the other loop.
async fn outbound_loop<Tx>(
    mut events: BackendEventStream,
    client_tx: Arc<Mutex<Tx>>,
    turn: Arc<Mutex<TurnTracker>>,
    cancel: CancellationToken,
) -> Option<SessionEnd>
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return None,
            event = events.next() => event,
        };
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(error = %e, "Dropping malformed backend frame");
                continue;
            }
            None => {
                info!("Backend closed the session.");
                return Some(SessionEnd::BackendClosed);
            }
        };

        let mut turn = turn.lock().await;
        let (decision, frame) = match event {
            BackendEvent::ModelTurnPart(part) => (turn.on_model_part(), OutboundFrame::from(part)),
            BackendEvent::TurnComplete => (turn.on_turn_complete(), OutboundFrame::TurnComplete),
            BackendEvent::Interrupted => {
                (turn.on_backend_interrupted(), OutboundFrame::TurnComplete)
            }
            BackendEvent::SetupAcknowledged => {
                debug!("Ignoring repeated setup acknowledgment.");
                continue;
            }
            BackendEvent::TransportError(reason) => {
                error!(%reason, "Backend connection broke");
                return Some(SessionEnd::BackendFailed(reason));
            }
        };
        if decision == OutputDecision::Discard {
            debug!("Discarding output of an interrupted model turn.");
            continue;
        }
        // The turn lock stays held across the write so an interrupt lands
        // either before this frame is checked or after it is sent.
        let sent = send_frame(&mut *client_tx.lock().await, &frame).await;
        drop(turn);
        if let Err(e) = sent {
            error!(error = %e, "Failed to send frame to client");
            return Some(SessionEnd::ClientFailed(e.to_string()));
        }
    }
}
