//! Spoken output through the operating system's speech synthesizer

use async_trait::async_trait;

use crate::{Error, Result};

/// Speech commands tried in order when none is configured
const CANDIDATE_COMMANDS: [&str; 4] = ["say", "spd-say", "espeak-ng", "espeak"];

/// Speaks text aloud
///
/// Speaking never fails from the caller's point of view; problems are logged.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`, returning once playback has finished
    async fn speak(&self, text: &str);
}

/// Runs a local text-to-speech command with the text as its only argument
#[derive(Debug, Clone)]
pub struct SystemSpeaker {
    command: Option<String>,
}

impl SystemSpeaker {
    /// Use an explicit command, or the first candidate found on `PATH`
    #[must_use]
    pub fn detect(command: Option<String>) -> Self {
        let command = command.or_else(|| {
            CANDIDATE_COMMANDS
                .iter()
                .find(|c| which::which(c).is_ok())
                .map(ToString::to_string)
        });

        match &command {
            Some(cmd) => tracing::debug!(command = %cmd, "speech command selected"),
            None => tracing::warn!("no speech command found, replies will only be logged"),
        }

        Self { command }
    }

    /// The command in use, if any
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }
}

#[async_trait]
impl Speaker for SystemSpeaker {
    async fn speak(&self, text: &str) {
        tracing::info!("Jarvis: {text}");

        let Some(command) = &self.command else {
            return;
        };

        if let Err(e) = run_speech_command(command, text).await {
            tracing::warn!(command = %command, error = %e, "speech command failed");
        }
    }
}

/// Run `command` with `text` as a single argv entry, so quotes in replies are harmless
async fn run_speech_command(command: &str, text: &str) -> Result<()> {
    let status = tokio::process::Command::new(command).arg(text).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Tts(format!("{command} exited with {status}")))
    }
}
