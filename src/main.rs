use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jarvis_relay::config::DEFAULT_MIC_NAME;
use jarvis_relay::voice::{
    AudioCapture, AudioSource, KeywordSpotter, ListeningCue, Speaker, SpeechToText,
    SystemSpeaker, Transcriber, find_input_device, list_input_devices, resolve_input_device, rms,
};
use jarvis_relay::{Assistant, Config, HomeAssistantClient, HomeHub, IntentResolver, LlmClient};

/// Jarvis - voice control for Home Assistant
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for the wake word and act on commands (default)
    Run,
    /// List input devices and show which one matches
    Devices {
        /// Microphone name substring
        #[arg(long, env = "MIC_NAME", default_value = DEFAULT_MIC_NAME)]
        mic_name: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Microphone name substring
        #[arg(long, env = "MIC_NAME", default_value = DEFAULT_MIC_NAME)]
        mic_name: String,
        /// Device index used when no name matches
        #[arg(long, env = "JARVIS_MIC_FALLBACK_INDEX", default_value = "1")]
        fallback_index: usize,
    },
    /// Play the listening cue
    TestSpeaker,
    /// Speak text through the configured speech command
    Say {
        /// Text to speak
        #[arg(default_value = "Jarvis speech test.")]
        text: String,
        /// Speech command override
        #[arg(long, env = "JARVIS_TTS_COMMAND")]
        tts_command: Option<String>,
    },
    /// Check that Home Assistant is reachable
    Health,
    /// Resolve text to actions without executing them
    Intent {
        /// Command text, as if spoken
        text: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,jarvis_relay=info",
        1 => "info,jarvis_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_assistant().await,
        Command::Devices { mic_name } => list_devices(&mic_name),
        Command::TestMic {
            duration,
            mic_name,
            fallback_index,
        } => test_mic(duration, &mic_name, fallback_index).await,
        Command::TestSpeaker => test_speaker(),
        Command::Say { text, tts_command } => {
            SystemSpeaker::detect(tts_command).speak(&text).await;
            Ok(())
        }
        Command::Health => check_health().await,
        Command::Intent { text } => resolve_intent(&text).await,
    }
}

/// Run the assistant until a stop phrase or Ctrl-C
#[allow(clippy::future_not_send)]
async fn run_assistant() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::debug!(?config, "loaded configuration");

    let names = list_input_devices()?;
    let index = resolve_input_device(&names, &config.audio.mic_name, config.audio.fallback_index);

    let stt: Arc<dyn Transcriber> = Arc::new(SpeechToText::from_config(&config.stt)?);
    let mut wake = KeywordSpotter::new(
        &config.wake.access_key,
        std::slice::from_ref(&config.wake.keyword),
        &[config.wake.sensitivity],
        Arc::clone(&stt),
    )?;
    let mut mic = AudioCapture::open(Some(index))?;

    let mut assistant = Assistant::from_config(&config, stt)?;
    assistant.startup().await?;

    tracing::info!("jarvis ready - say \"{}\"", config.wake.keyword);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    assistant.run(&mut mic, &mut wake, shutdown).await?;
    tracing::info!("jarvis stopped");
    Ok(())
}

/// Print input devices, marking the configured match
fn list_devices(mic_name: &str) -> anyhow::Result<()> {
    let names = list_input_devices()?;
    let matched = find_input_device(&names, mic_name);

    println!("Input devices (looking for \"{mic_name}\"):");
    for (i, name) in names.iter().enumerate() {
        let marker = if matched == Some(i) { "*" } else { " " };
        println!("{marker} [{i}] {name}");
    }

    if matched.is_none() {
        println!("\nNo device matched; the fallback index will be used.");
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, mic_name: &str, fallback_index: usize) -> anyhow::Result<()> {
    let names = list_input_devices()?;
    let index = resolve_input_device(&names, mic_name, fallback_index);

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open(Some(index))?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        if let Some(fault) = capture.take_fault() {
            anyhow::bail!("microphone fault: {fault}");
        }

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("Speech onset needs an RMS above 0.015.");
    println!("If RMS stayed near 0, run `jarvis devices` and set MIC_NAME.");

    Ok(())
}

/// Play the listening cue
fn test_speaker() -> anyhow::Result<()> {
    println!("Playing the listening cue...");
    ListeningCue::new()?.play();
    println!("If you heard a short chime, your speakers are working!");
    Ok(())
}

/// Check hub health, failing when unreachable
async fn check_health() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let hub = HomeAssistantClient::new(&config.hub)?;

    if !hub.is_healthy().await {
        anyhow::bail!("Home Assistant at {} is unreachable", hub.base_url());
    }

    println!("Home Assistant at {} is healthy.", hub.base_url());
    Ok(())
}

/// Resolve text and print the resulting actions
async fn resolve_intent(text: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let model = LlmClient::from_config(&config.llm)?;
    let resolver = IntentResolver::new(Box::new(model), config.devices.clone());

    match resolver.resolve(&text.to_lowercase()).await {
        Some(actions) if !actions.is_empty() => {
            for (i, action) in actions.iter().enumerate() {
                println!("{}. {action:?}", i + 1);
            }
        }
        _ => println!("No decision."),
    }
    Ok(())
}
