mod reload;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use voxtalk_audio::{CpalDeviceMonitor, DeviceManager, DeviceMonitor, InputSourceFactory};
use voxtalk_core::{AppConfig, InputSourceKind, SpeechEvent, TaskHint};
use voxtalk_dialog::{
    ChatOptions, CommandOptions, CommandRecognizer, ContinuousOptions, ContinuousRecognizer,
    InterruptibleChat, RecognizerSetup, RecoverySettings, SynthesisSetup,
};
use voxtalk_engine::{EngineRegistry, RecognitionSettings};
use voxtalk_synthesis::{SynthesisEngine, SynthesisRegistry, SynthesisSettings};

#[derive(Parser)]
#[command(name = "voxtalk", about = "Speech recognition and synthesis sessions")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe speech until interrupted or the input ends
    Dictate,
    /// Recognize one short voice command
    Command,
    /// Spoken back-and-forth; talking over the reply interrupts it
    Chat,
    /// List the synthesis engine's voices
    Voices {
        /// Only voices whose language starts with this prefix, e.g. "en"
        #[arg(short, long)]
        language: Option<String>,
    },
    /// List audio input and output devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!(locale = %config.general.locale, "voxtalk starting");

    match cli.command {
        Command::Dictate => run_dictate(&config).await,
        Command::Command => run_command(&config).await,
        Command::Chat => run_chat(config, &cli.config).await,
        Command::Voices { language } => run_voices(&config, language.as_deref()).await,
        Command::Devices => run_devices(),
    }
}

// ── Setup ─────────────────────────────────────────────────────

fn input_kind(config: &AppConfig) -> Result<InputSourceKind> {
    let kind = config
        .input
        .source_kind()
        .context("invalid [input] section")?;
    if kind == InputSourceKind::CustomStream {
        bail!("input source 'custom' is fed by an embedding application; use 'microphone' or 'file'");
    }
    Ok(kind)
}

async fn recognizer_setup(config: &AppConfig, task_hint: TaskHint) -> Result<RecognizerSetup> {
    let name = &config.recognition.engine;
    let engine = EngineRegistry::new()
        .build(name, config.engine_table(name))
        .await
        .with_context(|| format!("failed to start speech engine '{name}'"))?;

    let inputs = InputSourceFactory::from_config(input_kind(config)?, &config.input);
    let settings =
        RecognitionSettings::from_config(&config.general.locale, &config.recognition, task_hint);
    Ok(RecognizerSetup::new(engine, Arc::new(inputs), settings))
}

async fn synthesis_engine(config: &AppConfig) -> Result<Box<dyn SynthesisEngine>> {
    let name = &config.synthesis.engine;
    SynthesisRegistry::new()
        .build(name, config.engine_table(name))
        .await
        .with_context(|| format!("failed to start synthesis engine '{name}'"))
}

// ── Subcommands ───────────────────────────────────────────────

async fn run_dictate(config: &AppConfig) -> Result<()> {
    let setup = recognizer_setup(config, TaskHint::Dictation).await?;
    let options = ContinuousOptions::from_config(&config.recognition);
    let mut recognizer = ContinuousRecognizer::spawn(setup, options);
    let mut results = recognizer
        .take_result_receiver()
        .context("result receiver already taken")?;
    let mut events = recognizer
        .take_event_receiver()
        .context("event receiver already taken")?;

    recognizer.start().await.context("failed to start dictation")?;
    tracing::info!("dictating, press Ctrl+C to stop");

    loop {
        tokio::select! {
            Some(result) = results.recv() => match result {
                Ok(text) => println!("{text}"),
                Err(e) => tracing::error!("recognition failed: {e}"),
            },
            Some(event) = events.recv() => {
                tracing::debug!(?event, "dictation event");
                // With keep-alive the recognizer restarts itself.
                if event == SpeechEvent::StoppedListening && !options.keep_alive {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    recognizer.shutdown().await;
    while let Ok(result) = results.try_recv() {
        if let Ok(text) = result {
            println!("{text}");
        }
    }
    Ok(())
}

async fn run_command(config: &AppConfig) -> Result<()> {
    let setup = recognizer_setup(config, TaskHint::Query).await?;
    let options = CommandOptions {
        silence_timeout: config.recognition.inactivity_timeout(),
    };
    let mut recognizer = CommandRecognizer::spawn(setup, options);
    let mut results = recognizer
        .take_result_receiver()
        .context("result receiver already taken")?;
    let mut events = recognizer
        .take_event_receiver()
        .context("event receiver already taken")?;

    recognizer.start().await.context("failed to start listening")?;
    tracing::info!("listening for a command");

    let mut command = None;
    loop {
        tokio::select! {
            Some(result) = results.recv() => {
                command = Some(result);
                break;
            }
            Some(event) = events.recv() => {
                if event == SpeechEvent::StoppedListening {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    recognizer.shutdown().await;
    let command = match command {
        Some(result) => Some(result),
        None => results.try_recv().ok(),
    };
    match command {
        Some(Ok(text)) => println!("{text}"),
        Some(Err(e)) => return Err(e).context("command recognition failed"),
        None => tracing::info!("no command heard"),
    }
    Ok(())
}

async fn run_chat(config: AppConfig, config_path: &Path) -> Result<()> {
    let kind = input_kind(&config)?;
    let setup = recognizer_setup(&config, TaskHint::Unspecified).await?;
    let synthesis = SynthesisSetup::new(
        synthesis_engine(&config).await?,
        SynthesisSettings::from_config(&config.general.locale, &config.synthesis),
    );

    // A pinned device name never follows the system default.
    let monitor: Option<Box<dyn DeviceMonitor>> =
        if kind == InputSourceKind::Microphone && config.input.device_name == "default" {
            let poll = Duration::from_millis(config.recovery.poll_interval_ms);
            Some(Box::new(CpalDeviceMonitor::start(poll)))
        } else {
            None
        };

    let options = ChatOptions {
        recovery: RecoverySettings::from_config(&config.recovery),
        ..ChatOptions::default()
    };
    let mut chat = InterruptibleChat::spawn(setup, synthesis, monitor, options);
    let mut results = chat
        .take_result_receiver()
        .context("result receiver already taken")?;
    let mut events = chat
        .take_event_receiver()
        .context("event receiver already taken")?;

    let mut watcher = reload::ConfigWatcher::start(config_path, config.clone())
        .with_context(|| format!("failed to watch {config_path:?}"))?;

    chat.start().await.context("failed to start chat")?;
    tracing::info!("chat running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            Some(result) = results.recv() => match result {
                Ok(turn) if turn.is_final && !turn.text.trim().is_empty() => {
                    println!("> {}", turn.text);
                    let reply = format!("You said: {}.", turn.text.trim());
                    if let Err(e) = chat.synthesize(&reply, true, None).await {
                        tracing::warn!("reply failed: {e}");
                    }
                }
                Ok(turn) => tracing::trace!(text = %turn.text, "partial turn"),
                Err(e) => tracing::warn!("recognition failed: {e}"),
            },
            Some(event) = events.recv() => tracing::debug!(?event, "chat event"),
            Some(diff) = watcher.next_diff() => {
                for warning in &diff.non_reloadable {
                    tracing::warn!("config reload: {warning}");
                }
                if let Some(synthesis) = diff.synthesis_change {
                    tracing::info!("config reload: applying synthesis settings");
                    chat.update_voice(SynthesisSettings::from_config(
                        &config.general.locale,
                        &synthesis,
                    ));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    chat.shutdown().await;
    Ok(())
}

async fn run_voices(config: &AppConfig, language: Option<&str>) -> Result<()> {
    let engine = synthesis_engine(config).await?;
    let mut voices = engine.available_voices();
    voices.retain(|v| language.map_or(true, |prefix| v.language.starts_with(prefix)));
    voices.sort_by(|a, b| (&a.language, &a.name).cmp(&(&b.language, &b.name)));

    for voice in voices {
        println!(
            "{:<8} {:<24} {:<12} {:?}/{:?}",
            voice.language, voice.identifier, voice.name, voice.gender, voice.quality
        );
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    let manager = DeviceManager::new();
    let default_input = manager.default_input_device_name();
    let default_output = manager.default_output_device_name();

    let inputs = manager
        .list_input_devices()
        .context("failed to list input devices")?;
    println!("Input devices:");
    for (name, _) in &inputs {
        let marker = if default_input.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("  {marker} {name}");
    }

    let outputs = manager
        .list_output_devices()
        .context("failed to list output devices")?;
    println!("Output devices:");
    for (name, _) in &outputs {
        let marker = if default_output.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("  {marker} {name}");
    }
    Ok(())
}
