//! Audio playback to speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Preferred playback sample rate
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Cue tone frequency in Hz
const CUE_FREQUENCY: f32 = 880.0;

/// Cue tone length
const CUE_DURATION: Duration = Duration::from_millis(120);

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let preferred = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
            .find(|c| {
                c.channels() <= 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .map(|c| c.with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE)));

        let supported = match preferred {
            Some(c) => c,
            None => device
                .default_output_config()
                .map_err(|e| Error::Audio(e.to_string()))?,
        };

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::Audio("no f32 output config found".to_string()));
        }

        let config = supported.config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Output sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Play mono samples, blocking until they have been rendered
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(self.sample_rate());
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        while !finished.load(Ordering::Relaxed) && start.elapsed() < timeout {
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        tracing::trace!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Generate a sine tone at the given sample rate
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn sine_tone(frequency: f32, duration: Duration, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration.as_secs_f32()) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude
        })
        .collect()
}

/// Short chime played when the microphone opens for a command
pub struct ListeningCue {
    playback: AudioPlayback,
    tone: Vec<f32>,
}

impl ListeningCue {
    /// Open the default output device and prepare the tone
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    pub fn new() -> Result<Self> {
        let playback = AudioPlayback::new()?;
        let tone = sine_tone(CUE_FREQUENCY, CUE_DURATION, 0.3, playback.sample_rate());
        Ok(Self { playback, tone })
    }

    /// Play the cue; failures are logged
    pub fn play(&self) {
        if let Err(e) = self.playback.play(self.tone.clone()) {
            tracing::debug!(error = %e, "listening cue failed");
        }
    }
}
