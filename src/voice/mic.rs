//! Microphone recognizer backed by Whisper
//!
//! Audio is buffered while the hold lasts. On stop the buffer is encoded as
//! WAV and transcribed in the background; the transcript arrives as a single
//! final segment followed by the end event.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::capture::{RecognitionEvent, RecognitionSender, Recognizer, RecognizerError, Segment};
use crate::services::WhisperClient;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// A quarter second; shorter holds are not worth a transcription request
const MIN_SAMPLES: usize = 4000;

/// Records from the default input device and transcribes on stop
pub struct MicRecognizer {
    whisper: WhisperClient,
    events: RecognitionSender,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicRecognizer {
    #[must_use]
    pub fn new(whisper: WhisperClient, events: RecognitionSender) -> Self {
        Self {
            whisper,
            events,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        }
    }

    fn open_stream(&self) -> std::result::Result<Stream, RecognizerError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            RecognizerError::PermissionDenied("no input device available".to_string())
        })?;

        let config = input_config(&device)
            .ok_or_else(|| RecognizerError::Other("no suitable audio config found".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "microphone opened"
        );

        let buffer = Arc::clone(&self.buffer);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    RecognizerError::PermissionDenied(e.to_string())
                }
                other => RecognizerError::Other(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| RecognizerError::Other(e.to_string()))?;
        Ok(stream)
    }

    fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn transcribe_in_background(&self, samples: Vec<f32>) {
        let events = self.events.clone();

        if samples.len() < MIN_SAMPLES {
            tracing::debug!(samples = samples.len(), "hold too short to transcribe");
            let _ = events.send(RecognitionEvent::End);
            return;
        }

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                let _ = events.send(RecognitionEvent::Error(RecognizerError::Other(e.to_string())));
                let _ = events.send(RecognitionEvent::End);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime for transcription");
            let _ = events.send(RecognitionEvent::End);
            return;
        };

        let whisper = self.whisper.clone();
        runtime.spawn(async move {
            match whisper.transcribe(wav).await {
                Ok(text) if !text.trim().is_empty() => {
                    let _ = events.send(RecognitionEvent::Results(vec![Segment::final_text(
                        text.trim(),
                    )]));
                }
                Ok(_) => tracing::debug!("empty transcription"),
                Err(e) => {
                    let _ = events.send(RecognitionEvent::Error(RecognizerError::Other(
                        e.to_string(),
                    )));
                }
            }
            let _ = events.send(RecognitionEvent::End);
        });
    }
}

impl Recognizer for MicRecognizer {
    fn start(&mut self) -> std::result::Result<(), RecognizerError> {
        if self.stream.is_some() {
            return Err(RecognizerError::AlreadyStarted);
        }

        self.take_buffer();
        self.stream = Some(self.open_stream()?);
        tracing::debug!("microphone capture started");
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), RecognizerError> {
        let stream = self.stream.take().ok_or(RecognizerError::NotRunning)?;
        drop(stream);

        let samples = self.take_buffer();
        tracing::debug!(samples = samples.len(), "microphone capture stopped");
        self.transcribe_in_background(samples);
        Ok(())
    }
}

fn input_config(device: &cpal::Device) -> Option<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    device
        .supported_input_configs()
        .ok()?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .map(|c| c.with_sample_rate(rate).config())
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_length() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44 byte header plus 2 bytes per sample
        assert_eq!(wav.len(), 44 + 8);
    }

    #[test]
    fn test_wav_clamps_out_of_range() {
        let wav = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32768]);
    }
}
