//! One-at-a-time speech playback
//!
//! Each [`SpeechJob`] goes `Requesting → Decoding → Playing` and back to
//! `Idle`. Starting a job supersedes whatever was active: the previous source
//! is stopped, the generation counter moves on, and any late result for an
//! older generation is thrown away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::persona::{PersonaCatalog, VoiceKind};
use crate::services::{SpeechRequest, SpeechSynthesizer};
use crate::voice::sanitize::{SanitizeOptions, sanitize};
use crate::voice::unlock::{AudioBuffer, AudioContext, AudioSource, AudioUnlockManager};
use crate::{Error, Result};

/// A request to synthesize and play one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechJob {
    pub text: String,
    pub kind: VoiceKind,
    /// Assigned by the controller when the job starts
    pub generation: u64,
}

impl SpeechJob {
    #[must_use]
    pub fn new(text: impl Into<String>, kind: VoiceKind) -> Self {
        Self {
            text: text.into(),
            kind,
            generation: 0,
        }
    }
}

/// Playback lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Requesting,
    Decoding,
    Playing,
}

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to its natural end
    Finished,
    /// Superseded by a newer job or cancelled explicitly
    Cancelled,
}

/// Fetches, decodes and plays synthesized speech
pub struct PlaybackController {
    audio: Arc<AudioUnlockManager>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    catalog: PersonaCatalog,
    sanitize: SanitizeOptions,
    grace: Duration,
    generation: watch::Sender<u64>,
    state: Mutex<PlaybackState>,
    active: Mutex<Option<(u64, Box<dyn AudioSource>)>>,
    /// Set by `cancel()` so the next job still waits out the grace delay
    cancelled: AtomicBool,
    /// Held while a synthesis request is in flight so replies keep their order
    requests: tokio::sync::Mutex<()>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(
        audio: Arc<AudioUnlockManager>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        catalog: PersonaCatalog,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            audio,
            synthesizer,
            catalog,
            sanitize: SanitizeOptions::default(),
            grace: Duration::from_millis(150),
            generation,
            state: Mutex::new(PlaybackState::Idle),
            active: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            requests: tokio::sync::Mutex::new(()),
        }
    }

    /// Delay after cancelling a job before the next one proceeds
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub const fn with_sanitize(mut self, options: SanitizeOptions) -> Self {
        self.sanitize = options;
        self
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PlaybackState::Idle)
    }

    /// Whether any job is between request and end of playback
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() != PlaybackState::Idle
    }

    /// Current generation counter
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Speak `job`, superseding any active job
    ///
    /// Resolves when playback reaches its end or the job is superseded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioLocked`] if audio was never unlocked, the
    /// synthesizer's error if the request fails, and [`Error::Decode`] if the
    /// audio cannot be decoded even after recreating the context once.
    pub async fn speak(&self, job: SpeechJob) -> Result<SpeechOutcome> {
        let cancelled = self.cancelled.swap(false, Ordering::SeqCst);
        let had_previous = self.is_active() || cancelled;
        let generation = self.advance();
        let job = SpeechJob { generation, ..job };

        if had_previous {
            tokio::time::sleep(self.grace).await;
            if !self.is_current(generation) {
                return Ok(SpeechOutcome::Cancelled);
            }
        }

        let result = self.run(&job).await;
        if self.is_current(generation) {
            self.clear_active(generation);
            self.set_state(generation, PlaybackState::Idle);
        }

        match &result {
            Ok(SpeechOutcome::Finished) => tracing::debug!(generation, "finished speaking"),
            Ok(SpeechOutcome::Cancelled) => tracing::debug!(generation, "speech superseded"),
            Err(e) => tracing::warn!(generation, error = %e, "speech failed"),
        }
        result
    }

    /// Stop whatever is playing or pending
    pub fn cancel(&self) {
        if self.is_active() {
            let generation = self.advance();
            self.set_state(generation, PlaybackState::Idle);
            self.cancelled.store(true, Ordering::SeqCst);
            tracing::debug!(generation, "playback cancelled");
        }
    }

    async fn run(&self, job: &SpeechJob) -> Result<SpeechOutcome> {
        let generation = job.generation;
        let ctx = self.audio.ensure_running().await?;

        let text = sanitize(&job.text, self.sanitize);
        if text.is_empty() {
            tracing::debug!(generation, "nothing speakable");
            return Ok(SpeechOutcome::Finished);
        }

        let request = SpeechRequest {
            text,
            voice_id: self.catalog.voice_id(job.kind).to_string(),
            kind: job.kind,
        };
        tracing::debug!(
            generation,
            kind = %job.kind,
            text = %truncate(&request.text, 50),
            "speaking"
        );

        self.set_state(generation, PlaybackState::Requesting);
        let audio = {
            let _order = self.requests.lock().await;
            if !self.is_current(generation) {
                return Ok(SpeechOutcome::Cancelled);
            }
            self.synthesizer.synthesize(&request).await
        };
        if !self.is_current(generation) {
            return Ok(SpeechOutcome::Cancelled);
        }
        let audio = audio?;

        self.set_state(generation, PlaybackState::Decoding);
        let Some((ctx, buffer)) = self.decode(generation, ctx, &audio).await? else {
            return Ok(SpeechOutcome::Cancelled);
        };
        if !self.is_current(generation) {
            return Ok(SpeechOutcome::Cancelled);
        }

        self.set_state(generation, PlaybackState::Playing);
        let started = ctx
            .start(buffer)
            .map_err(|e| Error::Audio(e.to_string()))?;
        if let Ok(mut active) = self.active.lock() {
            *active = Some((generation, started.source));
        }
        tracing::debug!(generation, "playing audio");

        let mut generations = self.generation.subscribe();
        tokio::select! {
            biased;
            _ = generations.wait_for(|current| *current != generation) => Ok(SpeechOutcome::Cancelled),
            ended = started.ended => {
                if ended.is_err() {
                    tracing::debug!(generation, "source released without end signal");
                }
                Ok(SpeechOutcome::Finished)
            }
        }
    }

    /// Decode, recreating the context and retrying exactly once on failure
    ///
    /// Returns `None` once `generation` is superseded; a stale job never
    /// touches the shared context.
    async fn decode(
        &self,
        generation: u64,
        ctx: Arc<dyn AudioContext>,
        data: &[u8],
    ) -> Result<Option<(Arc<dyn AudioContext>, AudioBuffer)>> {
        let first = match ctx.decode(data).await {
            Ok(buffer) => return Ok(Some((ctx, buffer))),
            Err(e) => e,
        };
        if !self.is_current(generation) {
            tracing::debug!(generation, error = %first, "stale decode failure dropped");
            return Ok(None);
        }

        tracing::warn!(generation, error = %first, "decode failed, recreating audio context");
        let fresh = self.audio.recreate().await?;
        match fresh.decode(data).await {
            Ok(buffer) => {
                tracing::info!(generation, "decode recovered after context reset");
                Ok(Some((fresh, buffer)))
            }
            Err(_) if !self.is_current(generation) => Ok(None),
            Err(e) => Err(Error::Decode(format!("{e} (retry after: {first})"))),
        }
    }

    /// Move to a new generation and stop the active source
    fn advance(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            next = *g;
        });

        let previous = self.active.lock().ok().and_then(|mut a| a.take());
        if let Some((old, mut source)) = previous {
            if let Err(e) = source.stop() {
                tracing::debug!(generation = old, error = %e, "stop on finished source");
            }
        }
        next
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.borrow() == generation
    }

    fn set_state(&self, generation: u64, state: PlaybackState) {
        if self.is_current(generation) {
            if let Ok(mut s) = self.state.lock() {
                *s = state;
            }
        }
    }

    fn clear_active(&self, generation: u64) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|(g, _)| *g == generation) {
                *active = None;
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
