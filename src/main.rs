use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use os1_voice::services::{HttpChatService, HttpSpeechSynthesizer, WhisperClient};
use os1_voice::voice::{
    AudioUnlockManager, CaptureController, CaptureState, DeviceBackend, MicRecognizer,
    PlaybackController, SanitizeOptions, SpeechJob, recognition_channel, sanitize,
};
use os1_voice::{
    Config, PersonaCatalog, PressOutcome, SetupWizard, TurnCoordinator, TurnOutcome, VoiceKind,
};

/// Whisper only answers after release, so the settle window has to cover a request
const WHISPER_SETTLE: Duration = Duration::from_secs(8);

/// OS1 - hold-to-talk voice companion
#[derive(Parser)]
#[command(name = "os1", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Recognition locale (e.g., "en-US")
    #[arg(long)]
    locale: Option<String>,

    /// How long to wait for trailing results after release, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive hold-to-talk session (default)
    Run,
    /// Speak one line with the setup voice
    Say {
        /// Text to speak
        text: String,
    },
    /// Print text as it would be sent for synthesis
    Sanitize {
        text: String,
        /// Replace removed spans with a space instead of deleting them
        #[arg(long)]
        keep_pauses: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,os1_voice=debug",
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
    let Cli {
        locale,
        settle_ms,
        command,
        ..
    } = cli;
    let command = command.unwrap_or(Command::Run);

    if let Command::Sanitize { text, keep_pauses } = &command {
        println!("{}", sanitize(text, SanitizeOptions { keep_pauses: *keep_pauses }));
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(locale) = locale {
        config.locale = locale;
    }
    if let Some(ms) = settle_ms {
        config.capture.settle = Duration::from_millis(ms);
    }
    config.validate()?;

    tracing::info!(
        locale = %config.locale,
        tts = ?config.tts.provider,
        chat_model = %config.chat.model,
        "starting os1"
    );

    match command {
        Command::Say { text } => say(&config, &text).await,
        Command::Run | Command::Sanitize { .. } => interactive(config).await,
    }
}

fn build_playback(
    config: &Config,
    audio: &Arc<AudioUnlockManager>,
) -> anyhow::Result<Arc<PlaybackController>> {
    let synthesizer = Arc::new(HttpSpeechSynthesizer::new(&config.tts)?);
    let catalog = PersonaCatalog::from_config(&config.tts, &config.personas);

    Ok(Arc::new(
        PlaybackController::new(Arc::clone(audio), synthesizer, catalog)
            .with_grace(config.playback.grace)
            .with_sanitize(SanitizeOptions {
                keep_pauses: config.playback.keep_pauses,
            }),
    ))
}

async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let audio = Arc::new(AudioUnlockManager::new(Arc::new(DeviceBackend)));
    let playback = build_playback(config, &audio)?;

    audio.unlock().await?;
    let outcome = playback.speak(SpeechJob::new(text, VoiceKind::Setup)).await?;
    tracing::debug!(?outcome, "say finished");
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn interactive(config: Config) -> anyhow::Result<()> {
    let audio = Arc::new(AudioUnlockManager::new(Arc::new(DeviceBackend)));
    let playback = build_playback(&config, &audio)?;

    let (events_tx, events_rx) = recognition_channel();
    let whisper = WhisperClient::new(&config.stt, &config.locale)?;
    let recognizer = MicRecognizer::new(whisper, events_tx);
    let capture = CaptureController::new(
        Box::new(recognizer),
        events_rx,
        config.capture.settle.max(WHISPER_SETTLE),
    );

    let wizard = SetupWizard::new(PersonaCatalog::from_config(&config.tts, &config.personas));
    let chat = Arc::new(HttpChatService::new(&config.chat)?);

    let mut coordinator = TurnCoordinator::new(audio, capture, playback, wizard, chat)
        .with_system_prompt(config.chat.system_prompt.clone());

    let mut ui = coordinator.subscribe();
    tokio::spawn(async move {
        while ui.changed().await.is_ok() {
            let state = *ui.borrow_and_update();
            println!("[{state}]");
        }
    });

    let (keys_tx, mut keys) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if keys_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("Enter: start OS1 / hold / release   v: toggle background   q: quit");

    let mut visible = true;
    loop {
        tokio::select! {
            key = keys.recv() => {
                let Some(key) = key else { break };
                match key.trim() {
                    "q" => break,
                    "v" => {
                        visible = !visible;
                        coordinator.on_visibility_change(visible).await;
                    }
                    _ => {
                        press(&mut coordinator).await;

                        // Input typed while busy hit a disabled button
                        let mut dropped = 0_usize;
                        while keys.try_recv().is_ok() {
                            dropped += 1;
                        }
                        if dropped > 0 {
                            tracing::debug!(dropped, "ignored input while busy");
                        }
                    }
                }
            }
            event = coordinator.next_recognition_event() => {
                let Some(event) = event else { break };
                coordinator.on_recognition_event(event);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    coordinator.playback().cancel();
    tracing::info!("goodbye");
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn press(coordinator: &mut TurnCoordinator) {
    if coordinator.capture_state() == CaptureState::Capturing {
        match coordinator.on_press_end().await {
            TurnOutcome::WizardComplete(name) => println!("{name} is here."),
            TurnOutcome::NoSpeech => println!("No speech detected. Press Enter to try again."),
            outcome => tracing::debug!(?outcome, "turn finished"),
        }
        return;
    }

    match coordinator.on_press_start().await {
        PressOutcome::Capturing => println!("Listening... press Enter to release."),
        PressOutcome::SetupStarted => println!("Press Enter to answer."),
        PressOutcome::Ignored => tracing::debug!("press ignored"),
    }
}
