//! Quran Tajik audio player (qtj-ap) - command-line entry point
//!
//! Plays one verse, a full surah or a surah verse by verse through the
//! system audio device, logging state changes and remembering the last
//! played target.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qtj_ap::alignment::{AlignmentLoader, AlignmentSource};
use qtj_ap::backend::native::NativeBackend;
use qtj_ap::config::PlayerSettings;
use qtj_ap::last_played::LastPlayedStore;
use qtj_ap::resolver::CdnUrlResolver;
use qtj_ap::translation_audio::TajikAudioService;
use qtj_ap::{AudioController, PlaybackState};
use qtj_common::config::{ConfigResolver, TomlConfig};
use qtj_common::SurahCatalog;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long playback must stay idle before the player exits
const IDLE_EXIT_DELAY: Duration = Duration::from_millis(1500);

/// Command-line arguments for qtj-ap
#[derive(Parser, Debug)]
#[command(name = "qtj-ap")]
#[command(about = "Quran recitation player with Tajik translation audio")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "QTJ_CONFIG")]
    config: Option<PathBuf>,

    /// Reciter or translation edition ("default" uses the configured reciter)
    #[arg(short, long, default_value = "default")]
    edition: String,

    /// Playback rate multiplier
    #[arg(short, long)]
    speed: Option<f64>,

    /// Replay the verse or surah when it ends
    #[arg(short, long)]
    repeat: bool,

    /// Output device name (system default if omitted)
    #[arg(long)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a full surah recording
    PlaySurah { surah: u16 },
    /// Play a single verse
    PlayVerse { surah: u16, verse: u16 },
    /// Play a surah one verse at a time from verse 1
    VerseByVerse { surah: u16 },
    /// Resume the last played verse or surah
    Resume,
    /// List audio output devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    init_tracing(&config)?;

    info!(
        "Starting qtj-ap (git {} built {} [{}])",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if matches!(args.command, Command::Devices) {
        for name in NativeBackend::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let catalog = SurahCatalog::standard();
    let mut settings = PlayerSettings::from(&config);
    if let Some(speed) = args.speed {
        settings.playback_speed = speed;
    }
    settings.repeat |= args.repeat;

    let tajik_audio = TajikAudioService::new(
        config.data.tajik_audio_api.clone(),
        config.data.tajik_cache_ttl(),
    )
    .context("Failed to create Tajik audio client")?;
    let resolver = CdnUrlResolver::new(catalog).with_translation_lookup(Arc::new(tajik_audio));

    let alignment = AlignmentLoader::new(AlignmentSource::parse(&config.data.alignment_source))
        .context("Failed to create alignment loader")?;

    let backend = NativeBackend::with_device(args.device.clone())
        .context("Failed to open audio output")?;

    let controller = AudioController::builder(backend)
        .resolver(Arc::new(resolver))
        .alignment(Arc::new(alignment))
        .catalog(catalog)
        .settings(settings)
        .build();

    let store = LastPlayedStore::new(config.data.last_played_path());
    let (idle_tx, mut idle_rx) = watch::channel(true);
    let _logger = controller.subscribe(move |state: &PlaybackState| {
        log_state(state);
        store.record_from_state(state);
        let _ = idle_tx.send(!state.is_playing && !state.is_loading);
    });

    run_command(&controller, &args, &config)
        .await
        .context("Playback failed to start")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping playback");
        }
        _ = wait_for_idle(&mut idle_rx) => {
            info!("Playback finished");
        }
    }

    controller.shutdown();
    Ok(())
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let default_filter = format!(
        "qtj_ap={level},qtj_common={level}",
        level = config.logging.level
    );
    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn run_command(
    controller: &AudioController<NativeBackend>,
    args: &Args,
    config: &TomlConfig,
) -> Result<()> {
    match &args.command {
        Command::PlaySurah { surah } => controller.play_surah(*surah, &args.edition).await?,
        Command::PlayVerse { surah, verse } => {
            controller.play_verse(*surah, *verse, &args.edition).await?
        }
        Command::VerseByVerse { surah } => {
            controller
                .play_surah_verse_by_verse(*surah, &args.edition)
                .await?
        }
        Command::Devices => {}
        Command::Resume => {
            let store = LastPlayedStore::new(config.data.last_played_path());
            let Some(last) = store.load().context("Failed to read last played")? else {
                anyhow::bail!("Nothing has been played yet");
            };
            info!(
                "Resuming {} {}:{}",
                last.reciter_id,
                last.surah_number,
                last.verse_number.map_or("-".to_string(), |v| v.to_string())
            );
            match last.verse_number {
                Some(verse) => {
                    controller
                        .play_verse(last.surah_number, verse, &last.reciter_id)
                        .await?
                }
                None => controller.play_surah(last.surah_number, &last.reciter_id).await?,
            }
        }
    }
    Ok(())
}

/// Resolves once playback has stayed idle for [`IDLE_EXIT_DELAY`]
async fn wait_for_idle(idle_rx: &mut watch::Receiver<bool>) {
    loop {
        if idle_rx.wait_for(|idle| *idle).await.is_err() {
            return;
        }
        match tokio::time::timeout(IDLE_EXIT_DELAY, idle_rx.wait_for(|idle| !*idle)).await {
            Err(_) => return,
            Ok(Err(_)) => return,
            Ok(Ok(_)) => continue,
        }
    }
}

fn log_state(state: &PlaybackState) {
    if let Some(error) = &state.error {
        warn!(target_label = %state.target_label(), "{}", error);
        return;
    }
    info!(
        target_label = %state.target_label(),
        playing = state.is_playing,
        loading = state.is_loading,
        word = ?state.current_word_number,
        "{:.1}/{:.1}s",
        state.position,
        state.duration
    );
}
