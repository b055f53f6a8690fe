//! Configuration management for the OS1 voice front end

pub mod file;

use std::time::Duration;

use crate::{Error, Result};

use file::Os1ConfigFile;

/// Default OpenAI-compatible endpoint for chat completions
pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1";

/// Default system prompt for the conversation phase
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are OS1, a warm, empathetic, curious AI companion. \
Keep responses natural and conversational (2-4 sentences). \
Show genuine interest and emotional intelligence.";

/// Front end configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Recognition locale
    pub locale: String,

    /// Chat collaborator
    pub chat: ChatConfig,

    /// Speech synthesis collaborator
    pub tts: TtsConfig,

    /// Whisper transcription for the microphone recognizer
    pub stt: SttConfig,

    /// Capture timing
    pub capture: CaptureConfig,

    /// Playback timing and sanitizing
    pub playback: PlaybackConfig,

    /// Persona names assigned at the end of setup
    pub personas: PersonaNames,
}

/// Chat collaborator configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of an OpenAI-compatible API
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub max_tokens: u32,
}

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    ElevenLabs,
    OpenAi,
}

impl std::str::FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" | "11labs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub api_key: Option<String>,
    pub model: String,
    /// Voice used by the setup wizard
    pub setup_voice: String,
    pub female_voice: String,
    pub male_voice: String,
}

/// Whisper configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: Option<String>,
    pub model: String,
}

/// Capture timing
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// How long to wait for trailing final results after stopping recognition
    pub settle: Duration,
}

/// Playback configuration
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    /// Pause after cancelling an utterance so the output device can release
    pub grace: Duration,
    /// Keep removed stage directions as single spaces
    pub keep_pauses: bool,
}

/// Persona display names
#[derive(Debug, Clone)]
pub struct PersonaNames {
    pub female: String,
    pub male: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(400),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(150),
            keep_pauses: false,
        }
    }
}

impl Default for PersonaNames {
    fn default() -> Self {
        Self {
            female: "Sam".to_string(),
            male: "Theo".to_string(),
        }
    }
}

impl TtsConfig {
    fn defaults_for(provider: TtsProvider) -> Self {
        match provider {
            TtsProvider::ElevenLabs => Self {
                provider,
                api_key: None,
                model: "eleven_multilingual_v2".to_string(),
                setup_voice: "ErXwobaYiN019PkySvjV".to_string(),
                female_voice: "JSWO6cw2AyFE324d5kEr".to_string(),
                male_voice: "TxGEqnHWrfWFTfGW9XjX".to_string(),
            },
            TtsProvider::OpenAi => Self {
                provider,
                api_key: None,
                model: "tts-1".to_string(),
                setup_voice: "alloy".to_string(),
                female_voice: "nova".to_string(),
                male_voice: "onyx".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured value cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured value cannot be parsed
    pub fn from_sources(fc: Os1ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let openai_key = env("OPENAI_API_KEY");

        let locale = env("OS1_LOCALE")
            .or(fc.locale)
            .unwrap_or_else(|| "en-US".to_string());

        let chat = ChatConfig {
            url: env("OS1_CHAT_URL")
                .or(fc.chat.url)
                .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            model: env("OS1_CHAT_MODEL")
                .or(fc.chat.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: openai_key.clone().or(fc.chat.api_key),
            system_prompt: fc
                .chat
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: fc.chat.max_tokens.unwrap_or(300),
        };

        let provider = env("OS1_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map_or(Ok(TtsProvider::ElevenLabs), |p| p.parse())?;
        let defaults = TtsConfig::defaults_for(provider);
        let tts_key = match provider {
            TtsProvider::ElevenLabs => env("ELEVENLABS_API_KEY").or(fc.tts.api_key),
            TtsProvider::OpenAi => openai_key.clone().or(fc.tts.api_key),
        };
        let tts = TtsConfig {
            provider,
            api_key: tts_key,
            model: env("OS1_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or(defaults.model),
            setup_voice: fc.tts.setup_voice.unwrap_or(defaults.setup_voice),
            female_voice: fc.tts.female_voice.unwrap_or(defaults.female_voice),
            male_voice: fc.tts.male_voice.unwrap_or(defaults.male_voice),
        };

        let stt = SttConfig {
            api_key: openai_key.or(fc.stt.api_key),
            model: fc.stt.model.unwrap_or_else(|| "whisper-1".to_string()),
        };

        let capture = CaptureConfig {
            settle: parse_millis(env("OS1_SETTLE_MS"), "OS1_SETTLE_MS")?
                .or(fc.capture.settle_ms.map(Duration::from_millis))
                .unwrap_or(CaptureConfig::default().settle),
        };

        let keep_pauses = match env("OS1_KEEP_PAUSES") {
            Some(v) => Some(parse_bool(&v)?),
            None => fc.playback.keep_pauses,
        };
        let playback = PlaybackConfig {
            grace: parse_millis(env("OS1_GRACE_MS"), "OS1_GRACE_MS")?
                .or(fc.playback.grace_ms.map(Duration::from_millis))
                .unwrap_or(PlaybackConfig::default().grace),
            keep_pauses: keep_pauses.unwrap_or(false),
        };

        let default_names = PersonaNames::default();
        let personas = PersonaNames {
            female: fc.personas.female_name.unwrap_or(default_names.female),
            male: fc.personas.male_name.unwrap_or(default_names.male),
        };

        Ok(Self {
            locale,
            chat,
            tts,
            stt,
            capture,
            playback,
            personas,
        })
    }

    /// Check that the keys needed for a live session are present
    ///
    /// # Errors
    ///
    /// Returns error naming the first missing key
    pub fn validate(&self) -> Result<()> {
        if self.chat.api_key.is_none() {
            return Err(Error::Config(
                "chat API key required (OPENAI_API_KEY or chat.api_key)".to_string(),
            ));
        }
        if self.tts.api_key.is_none() {
            let hint = match self.tts.provider {
                TtsProvider::ElevenLabs => "ELEVENLABS_API_KEY or tts.api_key",
                TtsProvider::OpenAi => "OPENAI_API_KEY or tts.api_key",
            };
            return Err(Error::Config(format!("TTS API key required ({hint})")));
        }
        Ok(())
    }
}

fn parse_millis(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        })
        .transpose()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("expected a boolean, got {other}"))),
    }
}
