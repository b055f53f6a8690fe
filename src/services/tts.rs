//! Text-to-speech over HTTP

use async_trait::async_trait;

use super::{SpeechRequest, SpeechSynthesizer};
use crate::config::{TtsConfig, TtsProvider};
use crate::{Error, Result};

/// Synthesizes speech with ElevenLabs or `OpenAI`
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: TtsProvider,
}

#[derive(serde::Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.5,
            use_speaker_boost: true,
        }
    }
}

impl HttpSpeechSynthesizer {
    /// Create a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("API key required for TTS".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            provider: config.provider,
        })
    }

    /// Synthesize using ElevenLabs
    async fn synthesize_elevenlabs(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            request.voice_id
        );

        let body = ElevenLabsRequest {
            text: &request.text,
            model_id: &self.model,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs API error ({status}): {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct OpenAiRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let body = OpenAiRequest {
            model: &self.model,
            input: &request.text,
            voice: &request.voice_id,
            response_format: "mp3",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error ({status}): {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        tracing::debug!(
            provider = ?self.provider,
            kind = %request.kind,
            voice = %request.voice_id,
            chars = request.text.len(),
            "synthesizing"
        );

        let audio = match self.provider {
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(request).await,
            TtsProvider::OpenAi => self.synthesize_openai(request).await,
        }?;

        tracing::debug!(bytes = audio.len(), "audio generated");
        Ok(audio)
    }
}
