//! Audio context ownership and unlocking
//!
//! Output contexts start suspended on restrictive platforms and may only be
//! created or resumed from a user gesture. [`AudioUnlockManager`] holds the
//! single process-wide context and is the only thing that creates, resumes
//! or replaces it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Errors raised by an audio backend
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("context creation failed: {0}")]
    Create(String),

    #[error("resume failed: {0}")]
    Resume(String),

    #[error("decode failed: {0}")]
    Decode(String),

    /// Stopping a source that already ended; harmless
    #[error("source already stopped")]
    AlreadyStopped,

    #[error("context closed")]
    Closed,

    #[error("device error: {0}")]
    Device(String),
}

/// Lifecycle state of an audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Closed,
}

/// Decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// A single silent frame, enough to unlock output on restrictive platforms
    #[must_use]
    pub fn silent(sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0],
            sample_rate,
        }
    }

    /// Playback length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// A playing buffer that can be stopped early
pub trait AudioSource: Send {
    /// Stop output; may fail if the source already ended
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be stopped
    fn stop(&mut self) -> std::result::Result<(), AudioError>;
}

/// A started source and the signal fired when it plays to its natural end
pub struct StartedSource {
    pub source: Box<dyn AudioSource>,
    pub ended: oneshot::Receiver<()>,
}

/// One audio output context
#[async_trait]
pub trait AudioContext: Send + Sync {
    fn state(&self) -> ContextState;

    /// Resume a suspended context
    async fn resume(&self) -> std::result::Result<(), AudioError>;

    /// Decode encoded audio (MP3 from the synthesizer) into PCM
    async fn decode(&self, data: &[u8]) -> std::result::Result<AudioBuffer, AudioError>;

    /// Start playing a buffer to the output
    ///
    /// # Errors
    ///
    /// Returns error if the output cannot be started
    fn start(&self, buffer: AudioBuffer) -> std::result::Result<StartedSource, AudioError>;

    /// Release the context; it cannot be used afterwards
    fn close(&self);
}

/// Creates audio contexts
pub trait AudioBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the platform refuses to create a context
    fn create_context(&self) -> std::result::Result<Arc<dyn AudioContext>, AudioError>;
}

/// Guarantees a usable audio context before capture or playback
pub struct AudioUnlockManager {
    backend: Arc<dyn AudioBackend>,
    context: Mutex<Option<Arc<dyn AudioContext>>>,
    /// Serializes unlock and recreate so concurrent gestures share one context
    gate: tokio::sync::Mutex<()>,
    unlocked: AtomicBool,
}

impl AudioUnlockManager {
    #[must_use]
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            context: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
            unlocked: AtomicBool::new(false),
        }
    }

    /// Create, resume and prime the audio context
    ///
    /// Call from a user gesture. Idempotent once unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioLocked`] if the context cannot be created or resumed;
    /// the user has to retry the gesture.
    pub async fn unlock(&self) -> Result<Arc<dyn AudioContext>> {
        let _guard = self.gate.lock().await;

        let ctx = match self.current() {
            Some(ctx) if ctx.state() != ContextState::Closed => ctx,
            _ => self.install_new()?,
        };

        if ctx.state() == ContextState::Suspended {
            ctx.resume().await.map_err(|e| {
                tracing::warn!(error = %e, "audio context resume failed");
                Error::AudioLocked(e.to_string())
            })?;
        }

        if !self.unlocked.load(Ordering::Acquire) {
            match ctx.start(AudioBuffer::silent(24_000)) {
                Ok(primer) => drop(primer),
                Err(e) => tracing::debug!(error = %e, "silent primer failed"),
            }
            self.unlocked.store(true, Ordering::Release);
            tracing::info!("audio unlocked");
        }

        Ok(ctx)
    }

    /// Whether a gesture has unlocked audio
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    /// The current context, if one exists
    #[must_use]
    pub fn context(&self) -> Option<Arc<dyn AudioContext>> {
        self.current()
    }

    /// Context ready for playback, resuming it if the platform suspended it
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioLocked`] if audio was never unlocked or cannot resume
    pub async fn ensure_running(&self) -> Result<Arc<dyn AudioContext>> {
        let ctx = self
            .current()
            .filter(|_| self.is_unlocked())
            .ok_or_else(|| Error::AudioLocked("audio not unlocked yet".to_string()))?;

        match ctx.state() {
            ContextState::Running => Ok(ctx),
            ContextState::Suspended => {
                ctx.resume()
                    .await
                    .map_err(|e| Error::AudioLocked(e.to_string()))?;
                Ok(ctx)
            }
            ContextState::Closed => Err(Error::AudioLocked("audio context closed".to_string())),
        }
    }

    /// Discard the current context and replace it with a fresh one
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioLocked`] if the replacement cannot be created or resumed
    pub async fn recreate(&self) -> Result<Arc<dyn AudioContext>> {
        let _guard = self.gate.lock().await;

        if let Some(old) = self.take() {
            old.close();
        }

        let ctx = self.install_new()?;
        if ctx.state() == ContextState::Suspended {
            ctx.resume()
                .await
                .map_err(|e| Error::AudioLocked(e.to_string()))?;
        }

        tracing::info!("audio context recreated");
        Ok(ctx)
    }

    /// Resume a context the platform suspended while the page was hidden
    pub async fn on_visibility_change(&self, visible: bool) {
        if !visible {
            return;
        }

        let Some(ctx) = self.current() else {
            return;
        };

        if ctx.state() == ContextState::Suspended {
            match ctx.resume().await {
                Ok(()) => tracing::debug!("audio context resumed after visibility change"),
                Err(e) => tracing::warn!(error = %e, "failed to resume audio context"),
            }
        }
    }

    fn install_new(&self) -> Result<Arc<dyn AudioContext>> {
        let ctx = self.backend.create_context().map_err(|e| {
            tracing::warn!(error = %e, "audio context creation failed");
            Error::AudioLocked(e.to_string())
        })?;

        if let Ok(mut slot) = self.context.lock() {
            *slot = Some(Arc::clone(&ctx));
        }
        tracing::debug!("audio context created");
        Ok(ctx)
    }

    fn current(&self) -> Option<Arc<dyn AudioContext>> {
        self.context.lock().ok().and_then(|slot| slot.clone())
    }

    fn take(&self) -> Option<Arc<dyn AudioContext>> {
        self.context.lock().ok().and_then(|mut slot| slot.take())
    }
}
