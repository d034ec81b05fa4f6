//! Defines the WebSocket message protocol between the browser client and the relay.

use base64::Engine;
use bytes::Bytes;
use echospeak_core::{InboundFrame, OutboundFrame, RelayError, SessionParameters};
use serde::{Deserialize, Serialize};

/// MIME type assumed for raw binary audio frames and for audio messages that omit one.
pub const DEFAULT_INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Messages sent from the client (browser) to the server after the handshake.
///
/// The handshake itself is an untagged `{scenario, proficiency_level}` object.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// A chunk of microphone audio, base64 encoded.
    Audio {
        data: String,
        #[serde(default = "default_mime_type")]
        mime_type: String,
    },
    /// A typed message from the learner.
    Text { text: String },
    /// The learner finished speaking.
    EndOfTurn,
    /// The learner talked over the model.
    Interrupt,
}

fn default_mime_type() -> String {
    DEFAULT_INPUT_MIME_TYPE.to_string()
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// The backend session is configured; the client may start talking.
    Ready,
    /// A chunk of the model's voice, base64 encoded.
    Audio { data: String, mime_type: String },
    /// Text produced by the model.
    Text { text: String },
    /// The model finished its turn.
    TurnComplete,
    /// Reports a fatal error to the client.
    Error { message: String },
}

/// Parses the first client message, which must carry session parameters.
pub fn decode_handshake(raw: &str) -> Result<SessionParameters, RelayError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RelayError::ProtocolViolation(format!("handshake is not JSON: {}", e)))?;
    if let Some(kind) = value.get("type") {
        return Err(RelayError::ProtocolViolation(format!(
            "expected session parameters first, got a {} frame",
            kind
        )));
    }
    if !value.get("scenario").is_some_and(serde_json::Value::is_string) {
        return Err(RelayError::ProtocolViolation(
            "session parameters must name a scenario".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| RelayError::ProtocolViolation(format!("invalid session parameters: {}", e)))
}

/// Parses one client text message.
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, RelayError> {
    let message: ClientMessage =
        serde_json::from_str(raw).map_err(|e| RelayError::MalformedFrame(e.to_string()))?;
    Ok(match message {
        ClientMessage::Audio { data, mime_type } => {
            let data = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| RelayError::MalformedFrame(format!("invalid base64 audio: {}", e)))?;
            InboundFrame::AudioChunk {
                data: Bytes::from(data),
                mime_type,
            }
        }
        ClientMessage::Text { text } => InboundFrame::Text(text),
        ClientMessage::EndOfTurn => InboundFrame::EndOfTurn,
        ClientMessage::Interrupt => InboundFrame::Interrupt,
    })
}

/// Wraps a raw binary WebSocket frame as audio.
pub fn decode_binary_audio(data: Bytes) -> InboundFrame {
    InboundFrame::AudioChunk {
        data,
        mime_type: DEFAULT_INPUT_MIME_TYPE.to_string(),
    }
}

/// Serializes one frame for the client.
pub fn encode_outbound(frame: &OutboundFrame) -> serde_json::Result<String> {
    let message = match frame {
        OutboundFrame::Ready => ServerMessage::Ready,
        OutboundFrame::AudioChunk { data, mime_type } => ServerMessage::Audio {
            data: base64::engine::general_purpose::STANDARD.encode(data),
            mime_type: mime_type.clone(),
        },
        OutboundFrame::Text(text) => ServerMessage::Text { text: text.clone() },
        OutboundFrame::TurnComplete => ServerMessage::TurnComplete,
        OutboundFrame::Error(message) => ServerMessage::Error {
            message: message.clone(),
        },
    };
    serde_json::to_string(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use echospeak_core::ProficiencyLevel;
    use serde_json::{Value, json};

    #[test]
    fn test_decode_handshake() {
        let params = decode_handshake(r#"{"scenario": "restaurant", "proficiency_level": "B1"}"#)
            .unwrap();
        assert_eq!(params.scenario, "restaurant");
        assert_eq!(params.proficiency_level, ProficiencyLevel::B1);
    }

    #[test]
    fn test_decode_handshake_null_level() {
        let params =
            decode_handshake(r#"{"scenario": "hotel-checkin", "proficiency_level": null}"#)
                .unwrap();
        assert_eq!(params.scenario, "hotel-checkin");
        assert_eq!(params.proficiency_level, ProficiencyLevel::Unknown);
    }

    #[test]
    fn test_decode_handshake_requires_scenario() {
        for raw in [r#"{"level": "B1"}"#, r#"{"scenario": null, "level": "B1"}"#, "{}"] {
            let err = decode_handshake(raw).unwrap_err();
            assert!(
                matches!(&err, RelayError::ProtocolViolation(msg) if msg.contains("scenario")),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_decode_handshake_rejects_other_frames() {
        for raw in [
            r#"{"type": "audio", "data": "AAA=", "mime_type": "audio/pcm"}"#,
            r#"{"type": "end_of_turn"}"#,
            r#"{"proficiency_level": "B1"}"#,
            "hello",
        ] {
            assert!(
                matches!(decode_handshake(raw), Err(RelayError::ProtocolViolation(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_inbound_frames() {
        assert_eq!(
            decode_inbound(r#"{"type": "audio", "data": "AEA=", "mime_type": "audio/pcm"}"#)
                .unwrap(),
            InboundFrame::AudioChunk {
                data: Bytes::from_static(&[0x00, 0x40]),
                mime_type: "audio/pcm".to_string(),
            }
        );
        assert_eq!(
            decode_inbound(r#"{"type": "audio", "data": ""}"#).unwrap(),
            InboundFrame::AudioChunk {
                data: Bytes::new(),
                mime_type: DEFAULT_INPUT_MIME_TYPE.to_string(),
            }
        );
        assert_eq!(
            decode_inbound(r#"{"type": "text", "text": "Two please"}"#).unwrap(),
            InboundFrame::Text("Two please".to_string())
        );
        assert_eq!(
            decode_inbound(r#"{"type": "end_of_turn"}"#).unwrap(),
            InboundFrame::EndOfTurn
        );
        assert_eq!(
            decode_inbound(r#"{"type": "interrupt"}"#).unwrap(),
            InboundFrame::Interrupt
        );
    }

    #[test]
    fn test_decode_inbound_malformed() {
        for raw in [
            r#"{"type": "dance"}"#,
            r#"{"type": "audio", "data": "%%%"}"#,
            r#"{"type": "text"}"#,
            r#"{"text": "missing tag"}"#,
            "[1, 2, 3]",
        ] {
            assert!(
                matches!(decode_inbound(raw), Err(RelayError::MalformedFrame(_))),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_decode_binary_audio() {
        assert_eq!(
            decode_binary_audio(Bytes::from_static(&[1, 2, 3])),
            InboundFrame::AudioChunk {
                data: Bytes::from_static(&[1, 2, 3]),
                mime_type: DEFAULT_INPUT_MIME_TYPE.to_string(),
            }
        );
    }

    #[test]
    fn test_encode_outbound_frames() {
        let encode = |frame: OutboundFrame| -> Value {
            serde_json::from_str(&encode_outbound(&frame).unwrap()).unwrap()
        };
        assert_eq!(encode(OutboundFrame::Ready), json!({"type": "ready"}));
        assert_eq!(
            encode(OutboundFrame::AudioChunk {
                data: Bytes::from_static(&[0x00, 0x40]),
                mime_type: "audio/pcm;rate=24000".to_string(),
            }),
            json!({"type": "audio", "data": "AEA=", "mime_type": "audio/pcm;rate=24000"})
        );
        assert_eq!(
            encode(OutboundFrame::Text("Hi".to_string())),
            json!({"type": "text", "text": "Hi"})
        );
        assert_eq!(
            encode(OutboundFrame::TurnComplete),
            json!({"type": "turn_complete"})
        );
        assert_eq!(
            encode(OutboundFrame::Error("boom".to_string())),
            json!({"type": "error", "message": "boom"})
        );
    }
}
