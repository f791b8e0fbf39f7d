//! The wake, listen, think, act loop
//!
//! One cycle per wake word:
//!
//! ```text
//! IdleWatching -> Triggered -> HealthCheck -> Listening -> Thinking -> Dispatching -> IdleWatching
//! ```
//!
//! An unhealthy hub sends the cycle straight back to watching after one
//! spoken apology. A stop phrase or a microphone fault ends the process.
//! Stages never overlap: each one is awaited before the next begins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::DeviceCatalog;
use crate::config::Config;
use crate::dispatch::ActionDispatcher;
use crate::hub::{HomeAssistantClient, HomeHub};
use crate::intent::{IntentResolver, LanguageModel, LlmClient};
use crate::voice::{
    AudioSource, CaptureOutcome, CommandCapturer, CommandListener, ListenSettings, ListeningCue,
    Speaker, SystemSpeaker, Transcriber, WakeWordEngine,
};
use crate::{Error, Result};

/// Phrases that end the session when spoken as the whole command
pub const STOP_PHRASES: [&str; 3] = ["stop", "exit", "shut down"];

/// How often the watch loop drains the microphone
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

const STARTUP_FAILURE_REPLY: &str = "System failure. Cannot reach Home Assistant.";
const HUB_DOWN_REPLY: &str = "Home Assistant is unreachable.";
const UNRECOGNIZED_REPLY: &str = "Sorry, I didn't catch that.";
const STT_DOWN_REPLY: &str = "Speech service is unreachable.";
const GOODBYE_REPLY: &str = "Goodbye.";

/// Where the assistant is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Feeding microphone frames to the wake engine
    IdleWatching,
    /// The wake word was heard
    Triggered,
    /// Checking the hub before listening
    HealthCheck,
    /// Capturing the spoken command
    Listening,
    /// Resolving the transcript to actions
    Thinking,
    /// Executing actions
    Dispatching,
}

/// What the loop should do after handling a wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Go back to watching for the wake word
    Resume,
    /// Stop the assistant
    Shutdown,
}

/// Collaborators the assistant drives
pub struct Components {
    /// Home-automation hub
    pub hub: Arc<dyn HomeHub>,
    /// Spoken output
    pub speaker: Arc<dyn Speaker>,
    /// Command capture
    pub listener: Box<dyn CommandListener>,
    /// Intent model
    pub model: Box<dyn LanguageModel>,
    /// Known devices
    pub catalog: DeviceCatalog,
    /// Pause between a service call and the next action
    pub action_pause: Duration,
    /// Pause before reopening the microphone after a wake
    pub settle: Duration,
}

/// Voice assistant state machine
pub struct Assistant {
    hub: Arc<dyn HomeHub>,
    speaker: Arc<dyn Speaker>,
    listener: Box<dyn CommandListener>,
    resolver: IntentResolver,
    dispatcher: ActionDispatcher,
    settle: Duration,
    state: LoopState,
}

impl Assistant {
    /// Assemble an assistant from its parts
    #[must_use]
    pub fn new(parts: Components) -> Self {
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&parts.hub),
            Arc::clone(&parts.speaker),
            parts.action_pause,
        );

        Self {
            hub: parts.hub,
            speaker: parts.speaker,
            listener: parts.listener,
            resolver: IntentResolver::new(parts.model, parts.catalog),
            dispatcher,
            settle: parts.settle,
            state: LoopState::IdleWatching,
        }
    }

    /// Build the production assistant
    ///
    /// `transcriber` is shared with the wake engine so both use one STT client.
    ///
    /// # Errors
    ///
    /// Returns error if the hub or LLM client cannot be created
    pub fn from_config(config: &Config, transcriber: Arc<dyn Transcriber>) -> Result<Self> {
        let hub = HomeAssistantClient::new(&config.hub)?;
        let speaker = SystemSpeaker::detect(config.tts_command.clone());
        let model = LlmClient::from_config(&config.llm)?;

        let cue = match ListeningCue::new() {
            Ok(cue) => Some(cue),
            Err(e) => {
                tracing::warn!(error = %e, "listening cue unavailable");
                None
            }
        };

        let listener = CommandCapturer::new(
            transcriber,
            ListenSettings {
                listen_timeout: config.audio.listen_timeout,
                phrase_limit: config.audio.phrase_limit,
            },
        )
        .with_cue(cue);

        Ok(Self::new(Components {
            hub: Arc::new(hub),
            speaker: Arc::new(speaker),
            listener: Box::new(listener),
            model: Box::new(model),
            catalog: config.devices.clone(),
            action_pause: config.dispatch.action_pause,
            settle: config.audio.settle,
        }))
    }

    /// Current cycle state
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Pre-flight hub check and greeting
    ///
    /// # Errors
    ///
    /// Returns error if the hub is unreachable
    pub async fn startup(&self) -> Result<()> {
        if !self.hub.is_healthy().await {
            tracing::error!("home assistant is unreachable");
            self.speaker.speak(STARTUP_FAILURE_REPLY).await;
            return Err(Error::Hub("cannot reach Home Assistant".to_string()));
        }

        let devices = self.resolver.catalog().len();
        tracing::info!(devices, "health check passed");
        self.speaker
            .speak(&format!("Jarvis online. Loaded {devices} devices."))
            .await;
        Ok(())
    }

    /// Handle one wake: check the hub, listen, resolve, dispatch
    ///
    /// The caller must have stopped `mic`; it is left stopped on return.
    pub async fn handle_wake(&mut self, mic: &mut dyn AudioSource) -> CycleOutcome {
        self.state = LoopState::Triggered;
        let outcome = self.run_cycle(mic).await;
        self.state = LoopState::IdleWatching;
        outcome
    }

    async fn run_cycle(&mut self, mic: &mut dyn AudioSource) -> CycleOutcome {
        self.state = LoopState::HealthCheck;
        if !self.hub.is_healthy().await {
            self.speaker.speak(HUB_DOWN_REPLY).await;
            return CycleOutcome::Resume;
        }

        // Give the audio backend time to release the device
        tokio::time::sleep(self.settle).await;

        self.state = LoopState::Listening;
        let transcript = match self.listener.listen(mic).await {
            CaptureOutcome::Transcript(text) => text,
            CaptureOutcome::NoSpeech => {
                tracing::info!("no speech detected");
                return CycleOutcome::Resume;
            }
            CaptureOutcome::Unrecognized => {
                self.speaker.speak(UNRECOGNIZED_REPLY).await;
                return CycleOutcome::Resume;
            }
            CaptureOutcome::Unreachable => {
                self.speaker.speak(STT_DOWN_REPLY).await;
                return CycleOutcome::Resume;
            }
            CaptureOutcome::HardStop => {
                self.speaker.speak(GOODBYE_REPLY).await;
                return CycleOutcome::Shutdown;
            }
        };

        tracing::info!(transcript = %transcript, "heard command");
        if is_stop_phrase(&transcript) {
            self.speaker.speak(GOODBYE_REPLY).await;
            return CycleOutcome::Shutdown;
        }

        self.state = LoopState::Thinking;
        let decision = self.resolver.resolve(&transcript).await;

        self.state = LoopState::Dispatching;
        self.dispatcher.handle_decision(decision).await;

        CycleOutcome::Resume
    }

    /// Watch for the wake word until `shutdown` resolves or a cycle ends the session
    ///
    /// The microphone is stopped on every exit path.
    ///
    /// # Errors
    ///
    /// Returns error if the microphone fails or the wake engine rejects a frame
    pub async fn run<F>(
        &mut self,
        mic: &mut dyn AudioSource,
        wake: &mut dyn WakeWordEngine,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if let Err(e) = mic.start() {
            mic.stop();
            return Err(e);
        }
        tracing::info!("watching for wake word");

        let mut pending = Vec::new();
        let result = loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("interrupted, stopping");
                    break Ok(());
                }
                step = self.watch(mic, wake, &mut pending) => match step {
                    Ok(CycleOutcome::Resume) => {}
                    Ok(CycleOutcome::Shutdown) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        mic.stop();
        self.state = LoopState::IdleWatching;
        result
    }

    /// Drain the microphone once and feed whole frames to the wake engine
    async fn watch(
        &mut self,
        mic: &mut dyn AudioSource,
        wake: &mut dyn WakeWordEngine,
        pending: &mut Vec<f32>,
    ) -> Result<CycleOutcome> {
        tokio::time::sleep(WATCH_INTERVAL).await;

        if let Some(fault) = mic.take_fault() {
            return Err(Error::Audio(fault));
        }
        pending.extend(mic.take_buffer());

        let frame_length = wake.frame_length();
        let mut consumed = 0;
        while pending.len() - consumed >= frame_length {
            let frame = &pending[consumed..consumed + frame_length];
            consumed += frame_length;

            let detected = wake.process(frame).await?;
            if let Some(keyword) = detected {
                tracing::info!(keyword, "wake word detected");
                pending.clear();
                mic.stop();

                let outcome = self.handle_wake(mic).await;
                if outcome == CycleOutcome::Resume {
                    mic.start()?;
                    tracing::info!("resuming watch");
                }
                return Ok(outcome);
            }
        }

        pending.drain(..consumed);
        Ok(CycleOutcome::Resume)
    }
}

/// Whether a normalized transcript asks the assistant to quit
#[must_use]
pub fn is_stop_phrase(transcript: &str) -> bool {
    STOP_PHRASES.contains(&transcript.trim())
}
