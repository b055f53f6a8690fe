//! Shared test utilities
//!
//! Fakes for every platform seam and collaborator, so the turn-taking logic
//! runs without audio hardware or network access.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use os1_voice::services::{ChatRequest, ChatService, SpeechRequest, SpeechSynthesizer};
use os1_voice::voice::{
    AudioBackend, AudioBuffer, AudioContext, AudioError, AudioSource, AudioUnlockManager,
    CaptureController, ContextState, PlaybackController, RecognitionEvent, RecognitionSender,
    Recognizer, RecognizerError, Segment, StartedSource, recognition_channel,
};
use os1_voice::{Error, Gender, PersonaCatalog, Result, SetupWizard, TurnCoordinator, VoiceProfile};

/// Fake audio plays one millisecond per encoded byte
pub const SAMPLE_RATE: u32 = 24_000;

/// Counters shared by every fake audio context
#[derive(Default)]
pub struct AudioStats {
    pub created: AtomicUsize,
    pub create_failures: AtomicUsize,
    pub decodes: AtomicUsize,
    /// Remaining decode calls that fail
    pub decode_failures: AtomicUsize,
    /// How long each decode takes
    pub decode_delay_ms: AtomicU64,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub finished: AtomicUsize,
}

impl AudioStats {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    pub stats: Arc<AudioStats>,
}

impl AudioBackend for FakeBackend {
    fn create_context(&self) -> std::result::Result<Arc<dyn AudioContext>, AudioError> {
        if self.stats.create_failures.load(Ordering::SeqCst) > 0 {
            self.stats.create_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AudioError::Create("not allowed".into()));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            stats: Arc::clone(&self.stats),
            state: Mutex::new(ContextState::Suspended),
        }))
    }
}

struct FakeContext {
    stats: Arc<AudioStats>,
    state: Mutex<ContextState>,
}

#[async_trait]
impl AudioContext for FakeContext {
    fn state(&self) -> ContextState {
        *self.state.lock().unwrap()
    }

    async fn resume(&self) -> std::result::Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        if *state == ContextState::Closed {
            return Err(AudioError::Closed);
        }
        *state = ContextState::Running;
        Ok(())
    }

    async fn decode(&self, data: &[u8]) -> std::result::Result<AudioBuffer, AudioError> {
        self.stats.decodes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .stats
            .decode_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let delay = self.stats.decode_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state() == ContextState::Closed {
            return Err(AudioError::Closed);
        }
        if failing {
            return Err(AudioError::Decode("corrupt frame".into()));
        }

        Ok(AudioBuffer {
            samples: vec![0.0; data.len() * (SAMPLE_RATE as usize / 1000)],
            sample_rate: SAMPLE_RATE,
        })
    }

    fn start(&self, buffer: AudioBuffer) -> std::result::Result<StartedSource, AudioError> {
        self.stats.started.fetch_add(1, Ordering::SeqCst);

        let stopped = Arc::new(AtomicBool::new(false));
        let (tx, ended) = oneshot::channel();
        let duration = Duration::from_millis(buffer.duration_ms());
        let flag = Arc::clone(&stopped);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if !flag.swap(true, Ordering::SeqCst) {
                stats.finished.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }
        });

        Ok(StartedSource {
            source: Box::new(FakeSource {
                stopped,
                stats: Arc::clone(&self.stats),
            }),
            ended,
        })
    }

    fn close(&self) {
        *self.state.lock().unwrap() = ContextState::Closed;
    }
}

struct FakeSource {
    stopped: Arc<AtomicBool>,
    stats: Arc<AudioStats>,
}

impl AudioSource for FakeSource {
    fn stop(&mut self) -> std::result::Result<(), AudioError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyStopped);
        }
        self.stats.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Synthesizer that returns `audio_len` bytes after a delay
pub struct FakeSynth {
    pub requests: Mutex<Vec<SpeechRequest>>,
    /// "start:<text>" and "end:<text>" in the order they happened
    pub log: Mutex<Vec<String>>,
    pub audio_len: AtomicUsize,
    pub fail: AtomicBool,
    delay: Duration,
    delays: Mutex<HashMap<String, Duration>>,
}

impl Default for FakeSynth {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            audio_len: AtomicUsize::new(200),
            fail: AtomicBool::new(false),
            delay: Duration::from_millis(10),
            delays: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeSynth {
    /// Make requests for `text` take `delay`
    pub fn delay_for(&self, text: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(text.to_string(), delay);
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn last(&self) -> Option<SpeechRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        self.log.lock().unwrap().push(format!("start:{}", request.text));

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&request.text)
            .copied()
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;

        self.log.lock().unwrap().push(format!("end:{}", request.text));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tts("503 service unavailable".into()));
        }
        Ok(vec![0xFF; self.audio_len.load(Ordering::SeqCst)])
    }
}

/// Chat service replaying scripted replies; `None` fails that turn
#[derive(Default)]
pub struct FakeChat {
    pub script: Mutex<VecDeque<Option<String>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn push_reply(&self, reply: &str) {
        self.script.lock().unwrap().push_back(Some(reply.to_string()));
    }

    pub fn push_failure(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn reply(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        match self.script.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(Error::Chat("API failed 500".into())),
            None => Ok("That's lovely.".to_string()),
        }
    }
}

#[derive(Default)]
pub struct RecognizerCalls {
    pub starts: usize,
    pub stops: usize,
    pub running: bool,
    pub refuse: Option<RecognizerError>,
}

/// Recognizer that reports `End` whenever it is stopped
pub struct FakeRecognizer {
    pub calls: Arc<Mutex<RecognizerCalls>>,
    events: RecognitionSender,
}

impl Recognizer for FakeRecognizer {
    fn start(&mut self) -> std::result::Result<(), RecognizerError> {
        let mut calls = self.calls.lock().unwrap();
        calls.starts += 1;
        if let Some(err) = calls.refuse.clone() {
            return Err(err);
        }
        if calls.running {
            return Err(RecognizerError::AlreadyStarted);
        }
        calls.running = true;
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), RecognizerError> {
        let mut calls = self.calls.lock().unwrap();
        calls.stops += 1;
        if !calls.running {
            return Err(RecognizerError::NotRunning);
        }
        calls.running = false;
        let _ = self.events.send(RecognitionEvent::End);
        Ok(())
    }
}

pub fn test_catalog() -> PersonaCatalog {
    PersonaCatalog::new(
        "setup-voice",
        VoiceProfile::new("Sam", "f-voice", Gender::Female),
        VoiceProfile::new("Theo", "m-voice", Gender::Male),
    )
}

/// Unlock manager and playback controller over fake audio
pub fn fake_playback(
    stats: &Arc<AudioStats>,
    synth: &Arc<FakeSynth>,
) -> (Arc<AudioUnlockManager>, Arc<PlaybackController>) {
    let audio = Arc::new(AudioUnlockManager::new(Arc::new(FakeBackend {
        stats: Arc::clone(stats),
    })));
    let playback = Arc::new(PlaybackController::new(
        Arc::clone(&audio),
        Arc::clone(synth) as Arc<dyn SpeechSynthesizer>,
        test_catalog(),
    ));
    (audio, playback)
}

/// A coordinator wired entirely to fakes
pub struct Harness {
    pub coordinator: TurnCoordinator,
    pub stats: Arc<AudioStats>,
    pub synth: Arc<FakeSynth>,
    pub chat: Arc<FakeChat>,
    pub recognizer: Arc<Mutex<RecognizerCalls>>,
    pub events: RecognitionSender,
}

impl Harness {
    pub fn new() -> Self {
        let stats = Arc::new(AudioStats::default());
        let synth = Arc::new(FakeSynth::default());
        let chat = Arc::new(FakeChat::default());
        let (audio, playback) = fake_playback(&stats, &synth);

        let (events, rx) = recognition_channel();
        let recognizer = Arc::new(Mutex::new(RecognizerCalls::default()));
        let capture = CaptureController::new(
            Box::new(FakeRecognizer {
                calls: Arc::clone(&recognizer),
                events: events.clone(),
            }),
            rx,
            Duration::from_millis(400),
        );

        let coordinator = TurnCoordinator::new(
            audio,
            capture,
            playback,
            SetupWizard::new(test_catalog()),
            Arc::clone(&chat) as Arc<dyn ChatService>,
        )
        .with_system_prompt("You are OS1.");

        Self {
            coordinator,
            stats,
            synth,
            chat,
            recognizer,
            events,
        }
    }

    /// Deliver a final recognition result
    pub fn hear(&self, text: &str) {
        self.events
            .send(RecognitionEvent::Results(vec![
                Segment::interim(text),
                Segment::final_text(text),
            ]))
            .unwrap();
    }

    /// One full hold: press, hear `text` (if any), release
    pub async fn turn(&mut self, text: Option<&str>) -> os1_voice::TurnOutcome {
        let pressed = self.coordinator.on_press_start().await;
        assert_eq!(pressed, os1_voice::PressOutcome::Capturing);
        if let Some(text) = text {
            self.hear(text);
        }
        self.coordinator.on_press_end().await
    }

    /// Run setup through to conversation with the given voice answer
    pub async fn complete_setup(&mut self, voice_answer: &str) {
        assert_eq!(
            self.coordinator.on_press_start().await,
            os1_voice::PressOutcome::SetupStarted
        );
        self.turn(Some("I'm pretty social")).await;
        self.turn(Some("It's complicated")).await;
        self.turn(Some(voice_answer)).await;
    }
}
