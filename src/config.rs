use crate::defaults;
use crate::error::{CohostError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub memory: MemoryConfig,
}

/// Stream and chat identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Media URL handed to the decoder.
    pub url: String,
    /// Channel the bot sits in.
    pub channel: String,
    /// The bot's own chat name.
    pub username: String,
    /// Drop incoming chat messages; only the streamer's speech is processed.
    pub ignore_chat: bool,
    /// Log replies instead of posting them.
    pub disable_notifications: bool,
    pub restart_backoff_secs: u64,
}

/// Audio decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Decoder executable (name on PATH or absolute path).
    pub ffmpeg: String,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Streaming recognition WebSocket endpoint.
    pub endpoint: String,
    pub api_key: String,
    pub language: String,
    pub model: String,
}

/// Both LLM tiers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(
        default = "LlmTierConfig::decision",
        deserialize_with = "deserialize_decision_tier"
    )]
    pub decision: LlmTierConfig,
    pub reply: LlmTierConfig,
}

/// One OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmTierConfig {
    pub base_url: String,
    pub token: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Keys present in one `[llm.*]` table.
#[derive(Deserialize)]
struct LlmTierOverrides {
    base_url: Option<String>,
    token: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LlmTierOverrides {
    fn apply(self, mut tier: LlmTierConfig) -> LlmTierConfig {
        if let Some(base_url) = self.base_url {
            tier.base_url = base_url;
        }
        if let Some(token) = self.token {
            tier.token = token;
        }
        if let Some(model) = self.model {
            tier.model = model;
        }
        if let Some(temperature) = self.temperature {
            tier.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            tier.max_tokens = max_tokens;
        }
        tier
    }
}

// Missing decision keys fall back to the decision tier's sampling, not the
// reply tier's.
fn deserialize_decision_tier<'de, D>(
    deserializer: D,
) -> std::result::Result<LlmTierConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(LlmTierOverrides::deserialize(deserializer)?.apply(LlmTierConfig::decision()))
}

/// Conversation pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    pub cooldown_secs: u64,
    pub history_size: usize,
    pub queue_capacity: usize,
}

/// Long-term memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub facts_path: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            channel: String::new(),
            username: "cohost".to_string(),
            ignore_chat: false,
            disable_notifications: false,
            restart_backoff_secs: defaults::RESTART_BACKOFF_SECS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg: defaults::FFMPEG_PROGRAM.to_string(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            language: defaults::STT_LANGUAGE.to_string(),
            model: defaults::STT_MODEL.to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            decision: LlmTierConfig::decision(),
            reply: LlmTierConfig::default(),
        }
    }
}

impl Default for LlmTierConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            token: String::new(),
            model: String::new(),
            temperature: defaults::REPLY_TEMPERATURE,
            max_tokens: defaults::REPLY_MAX_TOKENS,
        }
    }
}

impl LlmTierConfig {
    /// Low-temperature defaults for the decision tier.
    pub fn decision() -> Self {
        Self {
            temperature: defaults::DECISION_TEMPERATURE,
            max_tokens: defaults::DECISION_MAX_TOKENS,
            ..Self::default()
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::REPLY_COOLDOWN_SECS,
            history_size: defaults::HISTORY_SIZE,
            queue_capacity: defaults::EVENT_QUEUE_CAPACITY,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            facts_path: PathBuf::from(defaults::FACTS_PATH),
        }
    }
}

impl StreamConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }
}

impl ConversationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - COHOST_STREAM_URL → stream.url
    /// - COHOST_CHANNEL → stream.channel
    /// - COHOST_DECISION_TOKEN → llm.decision.token
    /// - COHOST_REPLY_TOKEN → llm.reply.token
    /// - COHOST_STT_API_KEY → stt.api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("COHOST_STREAM_URL")
            && !url.is_empty()
        {
            self.stream.url = url;
        }

        if let Ok(channel) = std::env::var("COHOST_CHANNEL")
            && !channel.is_empty()
        {
            self.stream.channel = channel;
        }

        if let Ok(token) = std::env::var("COHOST_DECISION_TOKEN")
            && !token.is_empty()
        {
            self.llm.decision.token = token;
        }

        if let Ok(token) = std::env::var("COHOST_REPLY_TOKEN")
            && !token.is_empty()
        {
            self.llm.reply.token = token;
        }

        if let Ok(key) = std::env::var("COHOST_STT_API_KEY")
            && !key.is_empty()
        {
            self.stt.api_key = key;
        }

        self
    }

    /// Checks the values a run cannot start without.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("stream.url", &self.stream.url),
            ("stream.channel", &self.stream.channel),
            ("stream.username", &self.stream.username),
            ("stt.endpoint", &self.stt.endpoint),
            ("llm.decision.base_url", &self.llm.decision.base_url),
            ("llm.decision.model", &self.llm.decision.model),
            ("llm.reply.base_url", &self.llm.reply.base_url),
            ("llm.reply.model", &self.llm.reply.model),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(CohostError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "value is required".to_string(),
                });
            }
        }

        if self.conversation.queue_capacity == 0 {
            return Err(CohostError::ConfigInvalidValue {
                key: "conversation.queue_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.conversation.history_size == 0 {
            return Err(CohostError::ConfigInvalidValue {
                key: "conversation.history_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        fn mask(secret: &mut String) {
            if !secret.is_empty() {
                *secret = "***".to_string();
            }
        }

        let mut config = self.clone();
        mask(&mut config.stt.api_key);
        mask(&mut config.llm.decision.token);
        mask(&mut config.llm.reply.token);
        config
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/cohost/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cohost")
            .join("config.toml")
    }
}
