//! Voice processing module
//!
//! Handles microphone capture, wake word detection, command capture,
//! speech-to-text, and spoken output.

mod capture;
mod devices;
mod listen;
mod playback;
mod speaker;
mod stt;
mod wake_word;

pub use capture::{AudioCapture, AudioSource, SAMPLE_RATE, rms, samples_to_wav};
pub use devices::{find_input_device, list_input_devices, resolve_input_device};
pub use listen::{
    CaptureOutcome, CommandCapturer, CommandListener, ListenSettings, ONSET_THRESHOLD,
    PAUSE_DURATION, PhraseRecorder, RecorderEvent, normalize_transcript,
};
pub use playback::{AudioPlayback, ListeningCue, sine_tone};
pub use speaker::{Speaker, SystemSpeaker};
pub use stt::{SpeechToText, SttProvider, Transcriber};
pub use wake_word::{FRAME_LENGTH, KeywordSpotter, SpotterState, WakeWordEngine};
