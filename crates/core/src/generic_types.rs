use bytes::Bytes;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// CEFR proficiency level chosen by the learner.
///
/// Anything outside `A1..C2` collapses to `Unknown`, which carries no
/// language-level hint into the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ProficiencyLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    #[default]
    Unknown,
}

impl FromStr for ProficiencyLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Self::A1,
            "A2" => Self::A2,
            "B1" => Self::B1,
            "B2" => Self::B2,
            "C1" => Self::C1,
            "C2" => Self::C2,
            _ => Self::Unknown,
        })
    }
}

impl From<String> for ProficiencyLevel {
    fn from(value: String) -> Self {
        let Ok(level) = value.parse::<ProficiencyLevel>();
        level
    }
}

/// A `null` level is treated like a missing one.
impl From<Option<String>> for ProficiencyLevel {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Parameters the client supplies once, in the first frame of a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionParameters {
    /// Identifier of the role-play scenario (e.g. "restaurant").
    pub scenario: String,
    /// Also accepted under the older `level` key.
    #[serde(default, alias = "level")]
    pub proficiency_level: ProficiencyLevel,
}

/// How the backend should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

impl FromStr for ResponseModality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "text" => Ok(Self::Text),
            other => Err(format!("'{}' is not a response modality", other)),
        }
    }
}

/// The one-time setup payload sent to the backend when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub persona_instructions: String,
    pub response_modality: ResponseModality,
    pub voice_identifier: String,
    pub language_level_hint: Option<String>,
}

/// A frame sent by the client once the session is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Opaque audio, forwarded upstream untouched.
    AudioChunk { data: Bytes, mime_type: String },
    Text(String),
    EndOfTurn,
    Interrupt,
}

/// A frame sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Ready,
    AudioChunk { data: Bytes, mime_type: String },
    Text(String),
    TurnComplete,
    Error(String),
}

/// One piece of a model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPart {
    Audio { data: Bytes, mime_type: String },
    Text(String),
}

/// Everything a backend session can report, already decoded from its wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The backend accepted the session setup.
    SetupAcknowledged,
    /// Output belonging to the model's current turn.
    ModelTurnPart(ModelPart),
    /// The model finished its turn.
    TurnComplete,
    /// The backend cut its own generation short after detecting user speech.
    Interrupted,
    /// The connection broke. Always the last event of a stream.
    TransportError(String),
}

impl From<ModelPart> for OutboundFrame {
    fn from(part: ModelPart) -> Self {
        match part {
            ModelPart::Audio { data, mime_type } => OutboundFrame::AudioChunk { data, mime_type },
            ModelPart::Text(text) => OutboundFrame::Text(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proficiency_level_parsing() {
        assert_eq!("b1".parse::<ProficiencyLevel>(), Ok(ProficiencyLevel::B1));
        assert_eq!(" C2 ".parse::<ProficiencyLevel>(), Ok(ProficiencyLevel::C2));
        assert_eq!("D4".parse::<ProficiencyLevel>(), Ok(ProficiencyLevel::Unknown));
        assert_eq!("".parse::<ProficiencyLevel>(), Ok(ProficiencyLevel::Unknown));
    }

    #[test]
    fn test_session_parameters_accept_legacy_level_key() {
        let params: SessionParameters =
            serde_json::from_str(r#"{"scenario": "restaurant", "level": "A2"}"#).unwrap();
        assert_eq!(params.proficiency_level, ProficiencyLevel::A2);

        let params: SessionParameters =
            serde_json::from_str(r#"{"scenario": "restaurant", "proficiency_level": "B1"}"#)
                .unwrap();
        assert_eq!(params.proficiency_level, ProficiencyLevel::B1);
    }

    #[test]
    fn test_session_parameters_default_level_is_unknown() {
        let params: SessionParameters =
            serde_json::from_str(r#"{"scenario": "bank-account"}"#).unwrap();
        assert_eq!(params.scenario, "bank-account");
        assert_eq!(params.proficiency_level, ProficiencyLevel::Unknown);
    }

    #[test]
    fn test_session_parameters_null_level_is_unknown() {
        for raw in [
            r#"{"scenario": "restaurant", "proficiency_level": null}"#,
            r#"{"scenario": "restaurant", "level": null}"#,
        ] {
            let params: SessionParameters = serde_json::from_str(raw).unwrap();
            assert_eq!(params.proficiency_level, ProficiencyLevel::Unknown);
        }
    }

    #[test]
    fn test_session_parameters_require_scenario() {
        assert!(serde_json::from_str::<SessionParameters>(r#"{"proficiency_level": "B1"}"#).is_err());
        assert!(serde_json::from_str::<SessionParameters>(r#"{"scenario": null}"#).is_err());
    }

    #[test]
    fn test_response_modality_from_str() {
        assert_eq!("AUDIO".parse::<ResponseModality>(), Ok(ResponseModality::Audio));
        assert_eq!("text".parse::<ResponseModality>(), Ok(ResponseModality::Text));
        assert!("video".parse::<ResponseModality>().is_err());
    }
}
