//! Voice processing module
//!
//! Handles audio unlocking, press-and-hold capture, text sanitizing and
//! one-at-a-time speech playback. `device` and `mic` are the real platform
//! backends; everything else talks to them through traits.

mod capture;
mod device;
mod mic;
mod playback;
mod sanitize;
mod unlock;

pub use capture::{
    CaptureController, CaptureState, Haptics, RecognitionEvent, RecognitionReceiver,
    RecognitionSender, Recognizer, RecognizerError, Segment, Utterance, recognition_channel,
};
pub use device::DeviceBackend;
pub use mic::{MicRecognizer, SAMPLE_RATE, samples_to_wav};
pub use playback::{PlaybackController, PlaybackState, SpeechJob, SpeechOutcome};
pub use sanitize::{SanitizeOptions, sanitize};
pub use unlock::{
    AudioBackend, AudioBuffer, AudioContext, AudioError, AudioSource, AudioUnlockManager,
    ContextState, StartedSource,
};
