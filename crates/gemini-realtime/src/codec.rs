//! Translation between relay frames and the Gemini Live `BidiGenerateContent`
//! wire format.
//!
//! Encoding is infallible in practice; decoding turns every backend message
//! into an ordered batch of [`BackendEvent`]s, so nothing past this module
//! ever looks at raw JSON.

use base64::Engine;
use bytes::Bytes;
use echospeak_core::{
    BackendEvent, InboundFrame, ModelPart, RelayError, ResponseModality, SessionConfig,
};
use tracing::warn;

/// MIME type Gemini uses for its audio output when a part does not name one.
pub const DEFAULT_OUTPUT_MIME_TYPE: &str = "audio/pcm;rate=24000";

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) enum ClientMessage {
        Setup(BidiGenerateContentSetup),
        RealtimeInput(BidiGenerateContentRealtimeInput),
        ClientContent(BidiGenerateContentClientContent),
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentSetup {
        pub model: String,
        pub generation_config: GenerationConfig,
        pub system_instruction: Content,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentClientContent {
        pub turns: Vec<Content>,
        pub turn_complete: bool,
    }
    #[derive(Serialize)]
    pub(super) struct Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        pub parts: Vec<Part>,
    }
    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
        pub speech_config: SpeechConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub voice_config: VoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Text,
        Audio,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentRealtimeInput {
        pub audio: Blob,
    }
    #[derive(Serialize, Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        #[serde(default)]
        pub mime_type: Option<String>,
        pub data: String,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub setup_complete: Option<serde_json::Value>,
        pub server_content: Option<LiveServerContent>,
        pub usage_metadata: Option<serde_json::Value>,
        pub go_away: Option<serde_json::Value>,
        pub session_resumption_update: Option<serde_json::Value>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerContent {
        pub model_turn: Option<ServerContentTurn>,
        pub turn_complete: Option<bool>,
        pub interrupted: Option<bool>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct ServerContentTurn {
        #[serde(default)]
        pub parts: Vec<ServerPart>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub text: Option<String>,
        pub inline_data: Option<Blob>,
    }
}

/// Encodes the opening `setup` message for a session.
pub fn encode_setup(config: &SessionConfig, model: &str) -> serde_json::Result<String> {
    let modality = match config.response_modality {
        ResponseModality::Audio => wire::ResponseModality::Audio,
        ResponseModality::Text => wire::ResponseModality::Text,
    };
    let setup = wire::ClientMessage::Setup(wire::BidiGenerateContentSetup {
        model: model.to_string(),
        generation_config: wire::GenerationConfig {
            response_modalities: vec![modality],
            speech_config: wire::SpeechConfig {
                voice_config: wire::VoiceConfig {
                    prebuilt_voice_config: wire::PrebuiltVoiceConfig {
                        voice_name: config.voice_identifier.clone(),
                    },
                },
            },
        },
        system_instruction: wire::Content {
            role: None,
            parts: vec![wire::Part {
                text: config.persona_instructions.clone(),
            }],
        },
    });
    serde_json::to_string(&setup)
}

/// Encodes one client frame for the backend.
///
/// Returns `None` for frames the backend has no counterpart for (interrupts
/// are handled by the relay alone).
pub fn encode_to_backend(frame: &InboundFrame) -> serde_json::Result<Option<String>> {
    let message = match frame {
        InboundFrame::AudioChunk { data, mime_type } => {
            wire::ClientMessage::RealtimeInput(wire::BidiGenerateContentRealtimeInput {
                audio: wire::Blob {
                    mime_type: Some(mime_type.clone()),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            })
        }
        InboundFrame::Text(text) => {
            wire::ClientMessage::ClientContent(wire::BidiGenerateContentClientContent {
                turns: vec![wire::Content {
                    role: Some("user".to_string()),
                    parts: vec![wire::Part { text: text.clone() }],
                }],
                turn_complete: false,
            })
        }
        InboundFrame::EndOfTurn => {
            wire::ClientMessage::ClientContent(wire::BidiGenerateContentClientContent {
                turns: vec![],
                turn_complete: true,
            })
        }
        InboundFrame::Interrupt => return Ok(None),
    };
    serde_json::to_string(&message).map(Some)
}

/// Decodes one backend message into the events it carries, in order.
///
/// Recognized bookkeeping messages (usage metadata, session resumption) yield
/// an empty batch. A message with none of the known fields is malformed.
pub fn decode_from_backend(raw: &str) -> Result<Vec<BackendEvent>, RelayError> {
    let message: wire::ServerMessage = serde_json::from_str(raw)
        .map_err(|e| RelayError::MalformedFrame(format!("invalid backend JSON: {}", e)))?;

    let mut events = Vec::new();
    if message.setup_complete.is_some() {
        events.push(BackendEvent::SetupAcknowledged);
    }
    if let Some(go_away) = &message.go_away {
        warn!(?go_away, "Gemini announced it will close the session soon");
    }
    if let Some(content) = message.server_content {
        if content.interrupted == Some(true) {
            events.push(BackendEvent::Interrupted);
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(text) = part.text {
                    events.push(BackendEvent::ModelTurnPart(ModelPart::Text(text)));
                }
                if let Some(blob) = part.inline_data {
                    let data = base64::engine::general_purpose::STANDARD
                        .decode(&blob.data)
                        .map_err(|e| {
                            RelayError::MalformedFrame(format!("invalid base64 audio: {}", e))
                        })?;
                    events.push(BackendEvent::ModelTurnPart(ModelPart::Audio {
                        data: Bytes::from(data),
                        mime_type: blob
                            .mime_type
                            .unwrap_or_else(|| DEFAULT_OUTPUT_MIME_TYPE.to_string()),
                    }));
                }
            }
        }
        if content.turn_complete == Some(true) {
            events.push(BackendEvent::TurnComplete);
        }
        return Ok(events);
    }

    let recognized = message.setup_complete.is_some()
        || message.usage_metadata.is_some()
        || message.go_away.is_some()
        || message.session_resumption_update.is_some();
    if !recognized {
        return Err(RelayError::MalformedFrame(
            "unrecognized backend message".to_string(),
        ));
    }
    Ok(events)
}
