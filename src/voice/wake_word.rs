//! Wake word detection
//!
//! Classifies fixed-length audio frames and reports which keyword, if any,
//! was spoken. The shipped [`KeywordSpotter`] is a hybrid: local energy
//! segmentation picks out short utterances, and each finished utterance is
//! verified by transcribing it and searching for a keyword.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::capture::{SAMPLE_RATE, rms, samples_to_wav};
use super::stt::Transcriber;
use crate::{Error, Result};

/// Frame length consumed by the spotter (32ms at 16kHz)
pub const FRAME_LENGTH: usize = 512;

/// Energy threshold at sensitivity 0.0; scales linearly to zero at 1.0
const BASE_ENERGY_THRESHOLD: f32 = 0.1;

/// Minimum duration of speech to verify (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence duration that ends an utterance (0.5 seconds)
const SILENCE_SAMPLES: usize = 8000;

/// Longest utterance considered a wake phrase (3 seconds)
const MAX_SEGMENT_SAMPLES: usize = 48000;

/// A frame classifier for wake words
///
/// Stateless from the caller's point of view: any buffering is internal.
#[async_trait]
pub trait WakeWordEngine: Send {
    /// Number of samples expected per frame
    fn frame_length(&self) -> usize;

    /// Classify one frame; `Some(index)` names the detected keyword
    ///
    /// # Errors
    ///
    /// Returns error if the frame has the wrong length
    async fn process(&mut self, frame: &[f32]) -> Result<Option<usize>>;
}

/// State of the utterance segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotterState {
    /// Waiting for speech
    Idle,
    /// Accumulating a candidate utterance
    Listening,
}

/// Energy-gated keyword spotter verified by speech-to-text
pub struct KeywordSpotter {
    keywords: Vec<String>,
    energy_threshold: f32,
    transcriber: Arc<dyn Transcriber>,
    state: SpotterState,
    segment: Vec<f32>,
    silence_counter: usize,
}

impl std::fmt::Debug for KeywordSpotter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordSpotter")
            .field("keywords", &self.keywords)
            .field("energy_threshold", &self.energy_threshold)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl KeywordSpotter {
    /// Create a new spotter
    ///
    /// # Arguments
    ///
    /// * `access_key` - Key for the verifying speech service
    /// * `keywords` - Keywords to detect (e.g. "jarvis")
    /// * `sensitivities` - One value in `[0, 1]` per keyword
    /// * `transcriber` - Service used to verify candidate utterances
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty, no keyword is given, the lists differ
    /// in length, or a sensitivity is out of range
    pub fn new(
        access_key: &SecretString,
        keywords: &[String],
        sensitivities: &[f32],
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        if access_key.expose_secret().trim().is_empty() {
            return Err(Error::WakeWord("access key required".to_string()));
        }

        let keywords: Vec<String> = keywords
            .iter()
            .map(|w| w.trim().to_lowercase())
            .collect();

        if keywords.is_empty() || keywords.iter().any(String::is_empty) {
            return Err(Error::WakeWord("at least one keyword required".to_string()));
        }

        if keywords.len() != sensitivities.len() {
            return Err(Error::WakeWord(format!(
                "{} keywords but {} sensitivities",
                keywords.len(),
                sensitivities.len()
            )));
        }

        if let Some(bad) = sensitivities.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(Error::WakeWord(format!(
                "sensitivity {bad} is outside [0, 1]"
            )));
        }

        // The most sensitive keyword decides how quiet a candidate may be
        let sensitivity = sensitivities.iter().copied().fold(0.0_f32, f32::max);
        let energy_threshold = BASE_ENERGY_THRESHOLD * (1.0 - sensitivity);

        tracing::debug!(?keywords, energy_threshold, "keyword spotter initialized");

        Ok(Self {
            keywords,
            energy_threshold,
            transcriber,
            state: SpotterState::Idle,
            segment: Vec::new(),
            silence_counter: 0,
        })
    }

    /// Current segmenter state
    #[must_use]
    pub const fn state(&self) -> SpotterState {
        self.state
    }

    /// Configured keywords, normalized to lowercase
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Energy above which a frame counts as speech
    #[must_use]
    pub const fn energy_threshold(&self) -> f32 {
        self.energy_threshold
    }

    /// Index of the first keyword present in `transcript`
    #[must_use]
    pub fn match_keyword(&self, transcript: &str) -> Option<usize> {
        let words: Vec<String> = transcript
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        self.keywords.iter().position(|keyword| {
            let needle: Vec<&str> = keyword.split_whitespace().collect();
            words
                .windows(needle.len())
                .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
        })
    }

    /// Reset to idle, discarding any partial utterance
    pub fn reset(&mut self) {
        self.state = SpotterState::Idle;
        self.segment.clear();
        self.silence_counter = 0;
    }

    /// Feed one frame to the segmenter; returns true when an utterance ended
    fn segment_frame(&mut self, frame: &[f32]) -> bool {
        let is_speech = rms(frame) > self.energy_threshold;

        match self.state {
            SpotterState::Idle => {
                if is_speech {
                    self.state = SpotterState::Listening;
                    self.segment.clear();
                    self.segment.extend_from_slice(frame);
                    self.silence_counter = 0;
                    tracing::trace!("speech onset");
                }
                false
            }
            SpotterState::Listening => {
                self.segment.extend_from_slice(frame);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += frame.len();
                }

                let speech_len = self.segment.len().saturating_sub(self.silence_counter);

                if self.segment.len() >= MAX_SEGMENT_SAMPLES {
                    if speech_len > MIN_SPEECH_SAMPLES {
                        return true;
                    }
                    self.reset();
                    return false;
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if speech_len > MIN_SPEECH_SAMPLES {
                        return true;
                    }
                    tracing::trace!("utterance too short, resetting");
                    self.reset();
                }

                false
            }
        }
    }

    /// Transcribe the finished utterance and look for a keyword
    async fn verify_segment(&mut self) -> Option<usize> {
        let segment = std::mem::take(&mut self.segment);
        self.reset();

        let wav = match samples_to_wav(&segment, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode wake candidate");
                return None;
            }
        };

        match self.transcriber.transcribe(&wav).await {
            Ok(text) => {
                let hit = self.match_keyword(&text);
                tracing::debug!(transcript = %text, hit = ?hit, "wake candidate checked");
                hit
            }
            Err(e) => {
                tracing::warn!(error = %e, "wake verification failed");
                None
            }
        }
    }
}

#[async_trait]
impl WakeWordEngine for KeywordSpotter {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    async fn process(&mut self, frame: &[f32]) -> Result<Option<usize>> {
        if frame.len() != FRAME_LENGTH {
            return Err(Error::WakeWord(format!(
                "expected {FRAME_LENGTH} samples, got {}",
                frame.len()
            )));
        }

        if !self.segment_frame(frame) {
            return Ok(None);
        }

        let hit = self.verify_segment().await;
        if let Some(index) = hit {
            tracing::info!(keyword = %self.keywords[index], "wake word detected");
        }
        Ok(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverCalled;

    #[async_trait]
    impl Transcriber for NeverCalled {
        async fn transcribe(&self, _wav: &[u8]) -> Result<String> {
            Err(Error::Stt("unexpected call".to_string()))
        }
    }

    fn spotter(keywords: &[&str]) -> KeywordSpotter {
        let keywords: Vec<String> = keywords.iter().map(ToString::to_string).collect();
        let sensitivities = vec![0.7; keywords.len()];
        KeywordSpotter::new(
            &SecretString::from("key".to_string()),
            &keywords,
            &sensitivities,
            Arc::new(NeverCalled),
        )
        .unwrap()
    }

    #[test]
    fn test_sensitivity_sets_threshold() {
        let s = spotter(&["jarvis"]);
        assert!((s.energy_threshold() - 0.03).abs() < 1e-6);
    }

    #[test]
    fn test_keyword_match_is_word_bounded() {
        let s = spotter(&["jarvis", "hey computer"]);

        assert_eq!(s.match_keyword("Jarvis."), Some(0));
        assert_eq!(s.match_keyword("okay, hey Computer, lights"), Some(1));
        assert_eq!(s.match_keyword("jarvisville"), None);
        assert_eq!(s.match_keyword("hey there computer"), None);
    }

    #[test]
    fn test_init_failures() {
        let key = SecretString::from("key".to_string());
        let t: Arc<dyn Transcriber> = Arc::new(NeverCalled);

        let jarvis = vec!["jarvis".to_string()];

        let empty_key = SecretString::from(String::new());
        assert!(KeywordSpotter::new(&empty_key, &jarvis, &[0.7], Arc::clone(&t)).is_err());
        assert!(KeywordSpotter::new(&key, &[], &[], Arc::clone(&t)).is_err());
        assert!(KeywordSpotter::new(&key, &jarvis, &[0.7, 0.5], Arc::clone(&t)).is_err());
        assert!(KeywordSpotter::new(&key, &jarvis, &[1.5], t).is_err());
    }

    #[tokio::test]
    async fn test_wrong_frame_length_rejected() {
        let mut s = spotter(&["jarvis"]);
        assert!(s.process(&[0.0; 100]).await.is_err());
    }

    #[tokio::test]
    async fn test_silence_never_triggers() {
        let mut s = spotter(&["jarvis"]);
        for _ in 0..100 {
            assert_eq!(s.process(&[0.0; FRAME_LENGTH]).await.unwrap(), None);
        }
        assert_eq!(s.state(), SpotterState::Idle);
    }
}
