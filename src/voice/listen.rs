//! Command capture: record one spoken phrase and turn it into text

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::capture::{AudioSource, rms, samples_to_wav};
use super::playback::ListeningCue;
use super::stt::Transcriber;
use crate::Error;

/// Speech onset threshold (an energy of 500 on 16-bit PCM)
pub const ONSET_THRESHOLD: f32 = 0.015;

/// Trailing silence that ends a phrase
pub const PAUSE_DURATION: Duration = Duration::from_millis(800);

/// Analysis frame (30ms at 16kHz)
const FRAME_SAMPLES: usize = 480;

/// How often the microphone buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Slack allowed past the listen window before a silent microphone is a fault
const STALL_GRACE: Duration = Duration::from_secs(2);

/// Result of one listening attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Lowercased transcript of the phrase
    Transcript(String),
    /// Nobody spoke before the listen timeout
    NoSpeech,
    /// Speech was captured but could not be understood
    Unrecognized,
    /// The speech service could not be reached
    Unreachable,
    /// The microphone failed; treat as a request to stop
    HardStop,
}

/// Produces one [`CaptureOutcome`] per wake
///
/// Not `Send`: the microphone stream is bound to the thread that opened it.
#[async_trait(?Send)]
pub trait CommandListener {
    /// Listen for a single command on `mic`
    async fn listen(&mut self, mic: &mut dyn AudioSource) -> CaptureOutcome;
}

/// Progress reported by [`PhraseRecorder::push`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// Keep feeding audio
    Pending,
    /// A phrase was recorded
    Complete(Vec<f32>),
    /// No speech began within the listen timeout
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Recording,
    Done,
}

/// Splits a stream of samples into a single phrase
///
/// Waits up to the listen timeout for speech onset, then records until the
/// phrase limit or a pause, whichever comes first. Durations are counted in
/// samples so the recorder is independent of wall-clock time.
#[derive(Debug)]
pub struct PhraseRecorder {
    threshold: f32,
    listen_samples: usize,
    limit_samples: usize,
    pause_samples: usize,
    phase: Phase,
    waited: usize,
    silence: usize,
    phrase: Vec<f32>,
}

impl PhraseRecorder {
    /// Create a recorder for audio at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32, listen_timeout: Duration, phrase_limit: Duration) -> Self {
        Self {
            threshold: ONSET_THRESHOLD,
            listen_samples: samples_for(listen_timeout, sample_rate),
            limit_samples: samples_for(phrase_limit, sample_rate),
            pause_samples: samples_for(PAUSE_DURATION, sample_rate),
            phase: Phase::Waiting,
            waited: 0,
            silence: 0,
            phrase: Vec::new(),
        }
    }

    /// Whether speech onset has been seen
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }

    /// Feed captured samples
    ///
    /// Once `Complete` or `TimedOut` has been returned, further input is ignored.
    pub fn push(&mut self, samples: &[f32]) -> RecorderEvent {
        for frame in samples.chunks(FRAME_SAMPLES) {
            let is_speech = rms(frame) > self.threshold;

            match self.phase {
                Phase::Done => return RecorderEvent::Pending,
                Phase::Waiting => {
                    if is_speech {
                        tracing::debug!(waited = self.waited, "speech onset");
                        self.phase = Phase::Recording;
                        self.phrase.extend_from_slice(frame);
                    } else {
                        self.waited += frame.len();
                        if self.waited >= self.listen_samples {
                            self.phase = Phase::Done;
                            return RecorderEvent::TimedOut;
                        }
                    }
                }
                Phase::Recording => {
                    self.phrase.extend_from_slice(frame);
                    if is_speech {
                        self.silence = 0;
                    } else {
                        self.silence += frame.len();
                    }

                    if self.silence >= self.pause_samples
                        || self.phrase.len() >= self.limit_samples
                    {
                        self.phase = Phase::Done;
                        let mut phrase = std::mem::take(&mut self.phrase);
                        phrase.truncate(self.limit_samples);
                        return RecorderEvent::Complete(phrase);
                    }
                }
            }
        }

        RecorderEvent::Pending
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)) as usize
}

/// Timing for a listening attempt
#[derive(Debug, Clone, Copy)]
pub struct ListenSettings {
    /// How long to wait for speech onset
    pub listen_timeout: Duration,
    /// Maximum phrase duration
    pub phrase_limit: Duration,
}

/// Records a command from the microphone and transcribes it
pub struct CommandCapturer {
    transcriber: Arc<dyn Transcriber>,
    settings: ListenSettings,
    cue: Option<ListeningCue>,
}

impl CommandCapturer {
    /// Create a capturer without a listening cue
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>, settings: ListenSettings) -> Self {
        Self {
            transcriber,
            settings,
            cue: None,
        }
    }

    /// Play `cue` each time the microphone opens
    #[must_use]
    pub fn with_cue(mut self, cue: Option<ListeningCue>) -> Self {
        self.cue = cue;
        self
    }

    /// Record audio until a phrase ends, or report why none was captured
    async fn record(&self, mic: &mut dyn AudioSource) -> Result<Option<Vec<f32>>, String> {
        let mut recorder = PhraseRecorder::new(
            mic.sample_rate(),
            self.settings.listen_timeout,
            self.settings.phrase_limit,
        );
        let deadline = tokio::time::Instant::now()
            + self.settings.listen_timeout
            + self.settings.phrase_limit
            + STALL_GRACE;

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            if let Some(fault) = mic.take_fault() {
                return Err(fault);
            }

            match recorder.push(&mic.take_buffer()) {
                RecorderEvent::Complete(phrase) => return Ok(Some(phrase)),
                RecorderEvent::TimedOut => return Ok(None),
                RecorderEvent::Pending => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err("microphone stopped delivering audio".to_string());
            }
        }
    }

    /// Transcribe a recorded phrase
    async fn transcribe(&self, phrase: &[f32], sample_rate: u32) -> CaptureOutcome {
        let wav = match samples_to_wav(phrase, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode phrase");
                return CaptureOutcome::Unrecognized;
            }
        };

        match self.transcriber.transcribe(&wav).await {
            Ok(text) => {
                let text = normalize_transcript(&text);
                if text.is_empty() {
                    CaptureOutcome::Unrecognized
                } else {
                    CaptureOutcome::Transcript(text)
                }
            }
            Err(Error::Http(e)) => {
                tracing::warn!(error = %e, "speech service unreachable");
                CaptureOutcome::Unreachable
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech not recognized");
                CaptureOutcome::Unrecognized
            }
        }
    }
}

#[async_trait(?Send)]
impl CommandListener for CommandCapturer {
    async fn listen(&mut self, mic: &mut dyn AudioSource) -> CaptureOutcome {
        // Drop anything left over from wake detection
        mic.take_buffer();

        if let Err(e) = mic.start() {
            tracing::error!(error = %e, "failed to open microphone");
            return CaptureOutcome::HardStop;
        }

        if let Some(cue) = &self.cue {
            cue.play();
            mic.take_buffer();
        }

        tracing::info!("listening");
        let recorded = self.record(mic).await;
        let sample_rate = mic.sample_rate();
        mic.stop();

        match recorded {
            Ok(Some(phrase)) => {
                tracing::debug!(samples = phrase.len(), "processing phrase");
                self.transcribe(&phrase, sample_rate).await
            }
            Ok(None) => CaptureOutcome::NoSpeech,
            Err(fault) => {
                tracing::error!(fault = %fault, "microphone fault");
                CaptureOutcome::HardStop
            }
        }
    }
}

/// Lowercase a transcript and strip surrounding whitespace and punctuation
#[must_use]
pub fn normalize_transcript(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn tone(secs: f32) -> Vec<f32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = (RATE as f32 * secs) as usize;
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / RATE as f32;
                0.3 * (2.0 * std::f32::consts::PI * 300.0 * t).sin()
            })
            .collect()
    }

    fn silence(secs: f32) -> Vec<f32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = (RATE as f32 * secs) as usize;
        vec![0.0; n]
    }

    fn recorder() -> PhraseRecorder {
        PhraseRecorder::new(RATE, Duration::from_secs(3), Duration::from_secs(10))
    }

    #[test]
    fn test_times_out_without_speech() {
        let mut r = recorder();
        assert_eq!(r.push(&silence(2.0)), RecorderEvent::Pending);
        assert_eq!(r.push(&silence(1.5)), RecorderEvent::TimedOut);
    }

    #[test]
    fn test_phrase_ends_on_pause() {
        let mut r = recorder();
        assert_eq!(r.push(&silence(1.0)), RecorderEvent::Pending);
        assert_eq!(r.push(&tone(1.2)), RecorderEvent::Pending);
        assert!(r.is_recording());

        match r.push(&silence(1.0)) {
            RecorderEvent::Complete(phrase) => {
                // speech plus the pause that ended it
                assert!(phrase.len() >= 19_000 && phrase.len() <= 33_000, "{}", phrase.len());
            }
            other => panic!("expected a phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_phrase_limit_caps_recording() {
        let mut r = PhraseRecorder::new(RATE, Duration::from_secs(3), Duration::from_secs(2));
        match r.push(&tone(5.0)) {
            RecorderEvent::Complete(phrase) => assert_eq!(phrase.len(), 32_000),
            other => panic!("expected a phrase, got {other:?}"),
        }
    }

    #[test]
    fn test_onset_resets_listen_timeout() {
        let mut r = recorder();
        assert_eq!(r.push(&silence(2.9)), RecorderEvent::Pending);
        assert_eq!(r.push(&tone(0.5)), RecorderEvent::Pending);
        // silence after onset is a pause, not a timeout
        assert!(matches!(r.push(&silence(1.0)), RecorderEvent::Complete(_)));
    }

    #[test]
    fn test_ignores_input_after_completion() {
        let mut r = recorder();
        assert_eq!(r.push(&silence(4.0)), RecorderEvent::TimedOut);
        assert_eq!(r.push(&tone(1.0)), RecorderEvent::Pending);
    }

    #[test]
    fn test_normalize_transcript() {
        assert_eq!(
            normalize_transcript("  Turn off the kitchen light. "),
            "turn off the kitchen light"
        );
        assert_eq!(normalize_transcript("Stop!"), "stop");
        assert_eq!(normalize_transcript("...  "), "");
    }
}
