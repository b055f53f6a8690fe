//! Audio output on the default device

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use super::unlock::{
    AudioBackend, AudioBuffer, AudioContext, AudioError, AudioSource, ContextState, StartedSource,
};

/// Creates contexts that play through the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceBackend;

impl AudioBackend for DeviceBackend {
    fn create_context(&self) -> Result<Arc<dyn AudioContext>, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Create("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio output context created"
        );

        Ok(Arc::new(DeviceContext {
            state: Mutex::new(ContextState::Suspended),
        }))
    }
}

/// Output context; starts suspended until resumed from a gesture
pub struct DeviceContext {
    state: Mutex<ContextState>,
}

#[async_trait]
impl AudioContext for DeviceContext {
    fn state(&self) -> ContextState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ContextState::Closed)
    }

    async fn resume(&self) -> Result<(), AudioError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AudioError::Resume(e.to_string()))?;
        match *state {
            ContextState::Closed => Err(AudioError::Closed),
            _ => {
                *state = ContextState::Running;
                Ok(())
            }
        }
    }

    async fn decode(&self, data: &[u8]) -> Result<AudioBuffer, AudioError> {
        if self.state() == ContextState::Closed {
            return Err(AudioError::Closed);
        }

        let data = data.to_vec();
        tokio::task::spawn_blocking(move || decode_mp3(&data))
            .await
            .map_err(|e| AudioError::Decode(e.to_string()))?
    }

    fn start(&self, buffer: AudioBuffer) -> Result<StartedSource, AudioError> {
        if self.state() != ContextState::Running {
            return Err(AudioError::Device("context not running".to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let (ended_tx, ended) = oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread_stop = Arc::clone(&stop);
        let thread_done = Arc::clone(&done);

        // cpal streams are not Send; the stream lives and dies on this thread
        std::thread::spawn(move || {
            let duration = Duration::from_millis(buffer.duration_ms());
            let (stream, finished) = match build_output(&buffer) {
                Ok(parts) => {
                    let _ = ready_tx.send(Ok(()));
                    parts
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    thread_done.store(true, Ordering::Release);
                    return;
                }
            };

            let natural = wait_for_end(&finished, &thread_stop, duration);
            if natural {
                // Let the device drain its last period
                std::thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
            thread_done.store(true, Ordering::Release);

            if natural {
                let _ = ended_tx.send(());
            }
            tracing::debug!(natural, "device playback ended");
        });

        ready_rx
            .recv()
            .map_err(|e| AudioError::Device(e.to_string()))??;

        Ok(StartedSource {
            source: Box::new(DeviceSource { stop, done }),
            ended,
        })
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = ContextState::Closed;
        }
    }
}

/// Handle to one playing buffer
struct DeviceSource {
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl AudioSource for DeviceSource {
    fn stop(&mut self) -> Result<(), AudioError> {
        if self.done.load(Ordering::Acquire) {
            return Err(AudioError::AlreadyStopped);
        }
        self.stop.store(true, Ordering::Release);
        Ok(())
    }
}

fn wait_for_end(finished: &AtomicBool, stop: &AtomicBool, duration: Duration) -> bool {
    let started = Instant::now();
    let timeout = duration + Duration::from_millis(500);

    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        if finished.load(Ordering::Acquire) || started.elapsed() > timeout {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn build_output(buffer: &AudioBuffer) -> Result<(Stream, Arc<AtomicBool>), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Device("no output device".to_string()))?;

    let (config, samples) = match find_output_config(&device, buffer.sample_rate) {
        Some(config) => (config, buffer.samples.clone()),
        None => {
            let config = device
                .default_output_config()
                .map_err(|e| AudioError::Device(e.to_string()))?
                .config();
            let samples = resample(&buffer.samples, buffer.sample_rate, config.sample_rate.0);
            (config, samples)
        }
    };

    let channels = usize::from(config.channels);
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = position.load(Ordering::Relaxed);
                    let sample = samples.get(pos).copied().map_or_else(
                        || {
                            finished_cb.store(true, Ordering::Release);
                            0.0
                        },
                        |s| {
                            position.store(pos + 1, Ordering::Relaxed);
                            s
                        },
                    );
                    frame.fill(sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))?;

    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    Ok((stream, finished))
}

/// Mono or stereo output config at exactly `sample_rate`
fn find_output_config(device: &cpal::Device, sample_rate: u32) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    device
        .supported_output_configs()
        .ok()?
        .find(|c| supports(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .map(|c| c.with_sample_rate(rate).config())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(data: &[u8]) -> Result<AudioBuffer, AudioError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(AudioError::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(AudioError::Decode("no audio frames".to_string()));
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}

/// Linear resampling for devices that cannot run at the source rate
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || from == 0 || to == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from) / f64::from(to);
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = (src.floor() as usize).min(last);
            let frac = (src - idx as f64) as f32;
            let a = samples[idx];
            let b = samples[(idx + 1).min(last)];
            (b - a).mul_add(frac, a)
        })
        .collect()
}
