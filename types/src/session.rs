use crate::events::{AudioTranscriptionConfig, Content, GenerationConfig, SetupEvent};

/// Model used when the caller does not override it.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Response modalities the model may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Audio,
}

/// Configuration for one live session: model, modalities, transcription
/// flags and the system instruction built from persona + scenario text.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LiveConfig {
    model: String,
    response_modalities: Vec<Modality>,
    system_instruction: Option<String>,
    input_audio_transcription: bool,
    output_audio_transcription: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            response_modalities: vec![Modality::Audio],
            system_instruction: None,
            input_audio_transcription: false,
            output_audio_transcription: false,
        }
    }
}

impl LiveConfig {
    pub fn builder() -> LiveConfigBuilder {
        LiveConfigBuilder::new()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    /// Wire form of this configuration.
    pub fn into_setup(self) -> SetupEvent {
        SetupEvent {
            model: self.model,
            generation_config: GenerationConfig {
                response_modalities: self.response_modalities,
            },
            system_instruction: self
                .system_instruction
                .as_deref()
                .map(Content::from_text),
            input_audio_transcription: self
                .input_audio_transcription
                .then(AudioTranscriptionConfig::default),
            output_audio_transcription: self
                .output_audio_transcription
                .then(AudioTranscriptionConfig::default),
        }
    }
}

pub struct LiveConfigBuilder {
    config: LiveConfig,
}

impl Default for LiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LiveConfig::default(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.config.response_modalities = modalities;
        self
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.config.system_instruction = Some(instruction.to_string());
        self
    }

    pub fn with_input_transcription_enable(mut self) -> Self {
        self.config.input_audio_transcription = true;
        self
    }

    pub fn with_output_transcription_enable(mut self) -> Self {
        self.config.output_audio_transcription = true;
        self
    }

    pub fn build(self) -> LiveConfig {
        self.config
    }
}
