use crate::audio::Base64EncodedAudioBytes;
use crate::session::Modality;

/// Messages sent by the client over the duplex socket.
///
/// Externally tagged so the wire form is `{"setup": {...}}` and
/// `{"realtimeInput": {...}}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    Setup(SetupEvent),
    RealtimeInput(RealtimeInputEvent),
}

/// Messages the service streams back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerEvent {
    SetupComplete(SetupCompleteEvent),
    ServerContent(ServerContentEvent),
}

/// `setup` message, sent once immediately after the socket opens.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupEvent {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

impl Content {
    pub fn from_text(text: &str) -> Self {
        Self {
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Presence of this (empty) object enables transcription for a direction.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}

/// `realtimeInput` message carrying captured microphone audio.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputEvent {
    pub media_chunks: Vec<MediaChunk>,
}

/// One encoded audio chunk plus its mime tag, e.g. `audio/pcm;rate=16000`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub data: Base64EncodedAudioBytes,
    pub mime_type: String,
}

/// `setupComplete` acknowledgement.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SetupCompleteEvent {}

/// `serverContent` message. Any combination of the fields may be present.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContentEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
}

/// A transcript fragment for one direction of the conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Inline binary payload, base64 in `data`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: Base64EncodedAudioBytes,
    pub mime_type: String,
}
