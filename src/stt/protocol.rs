//! JSON messages exchanged with a streaming recognition endpoint.
//!
//! Field names follow the proto3 JSON mapping (lowerCamelCase) of a
//! streaming speech-to-text API: one `sessionOptions` message, then raw
//! audio as binary frames, then `partial`/`final` events coming back.

use crate::stt::session::RecognitionConfig;
use serde::{Deserialize, Serialize};

/// First message of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRequest {
    pub session_options: StreamingOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingOptions {
    pub recognition_model: RecognitionModelOptions,
    pub eou_classifier: EouClassifierOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionModelOptions {
    pub model: String,
    pub audio_format: AudioFormatOptions,
    pub language_restriction: LanguageRestrictionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormatOptions {
    pub raw_audio: RawAudio,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAudio {
    pub audio_encoding: String,
    pub sample_rate_hertz: u32,
    pub audio_channel_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageRestrictionOptions {
    pub restriction_type: String,
    pub language_code: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EouClassifierOptions {
    pub default_classifier: DefaultEouClassifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultEouClassifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub max_pause_between_words_hint_ms: u32,
}

impl StreamingRequest {
    /// Builds the configuration message for `config`.
    pub fn session_options(config: &RecognitionConfig) -> Self {
        Self {
            session_options: StreamingOptions {
                recognition_model: RecognitionModelOptions {
                    model: config.model.clone(),
                    audio_format: AudioFormatOptions {
                        raw_audio: RawAudio {
                            audio_encoding: "LINEAR16_PCM".to_string(),
                            sample_rate_hertz: config.sample_rate,
                            audio_channel_count: config.channels,
                        },
                    },
                    language_restriction: LanguageRestrictionOptions {
                        restriction_type: "WHITELIST".to_string(),
                        language_code: vec![config.language.clone()],
                    },
                },
                eou_classifier: EouClassifierOptions {
                    default_classifier: DefaultEouClassifier {
                        kind: config.eou_sensitivity.as_str().to_string(),
                        max_pause_between_words_hint_ms: config.eou_max_pause_ms,
                    },
                },
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An event received from the endpoint. Unknown event kinds deserialize
/// with every field empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResponse {
    #[serde(default)]
    pub partial: Option<AlternativeUpdate>,
    #[serde(default, rename = "final")]
    pub final_update: Option<AlternativeUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlternativeUpdate {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub text: String,
}

impl StreamingResponse {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Texts of a final event; `None` for anything else.
    pub fn final_texts(&self) -> Option<impl Iterator<Item = &str>> {
        self.final_update
            .as_ref()
            .map(|update| update.alternatives.iter().map(|alt| alt.text.as_str()))
    }
}
