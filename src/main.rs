//! announcer-rs: bilingual (Korean/English) airport announcement player.

mod api;
mod config;
mod engine;
mod error;
mod notifier;
mod player;
mod prefs;
mod script;
mod segmenter;
mod service;
mod sink;
mod translator;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::simulated::SimulatedEngine;
use crate::engine::wait_for_voices;
use crate::notifier::Notifier;
use crate::player::VoiceSelection;
use crate::prefs::{JsonPreferences, PreferenceStore};
use crate::script::{ScriptInputs, Source};
use crate::segmenter::Lang;
use crate::service::{AnnouncerService, ServiceHandle, TransportReply};
use crate::sink::{PlayerBoard, SinkFactory, TerminalSinks};

#[derive(Parser, Debug)]
#[command(name = "announcer-rs", about = "Bilingual airport announcement player")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split text into language runs
    Segment { text: String },
    /// List engine voices and the voice selection
    Voices,
    /// Read custom text or a broadcast aloud
    Speak(SpeakArgs),
    /// Translate a romanized name into Korean
    Translate { name: String },
    /// Run the HTTP control API
    Serve {
        /// Override api.port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(clap::Args, Debug)]
struct SpeakArgs {
    /// Announcement text
    #[arg(short, long, conflicts_with = "broadcast")]
    text: Option<String>,

    /// Broadcast id (see config `broadcasts`)
    #[arg(short, long)]
    broadcast: Option<String>,

    /// Passenger name or number
    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    gate: String,

    #[arg(long, default_value = "")]
    floor: String,

    #[arg(long, default_value = "")]
    hour: String,

    #[arg(long, default_value = "")]
    minute: String,

    /// Repeat the main input this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Repeat the gate this many times
    #[arg(long, default_value_t = 1)]
    gate_repeat: u32,

    #[arg(long)]
    flight: Option<String>,

    /// Destination airport code
    #[arg(long)]
    destination: Option<String>,

    #[arg(long)]
    rate: Option<f32>,

    #[arg(long)]
    pitch: Option<f32>,

    #[arg(long)]
    korean_voice: Option<String>,

    #[arg(long)]
    english_voice: Option<String>,
}

impl SpeakArgs {
    fn source(&self) -> Result<(String, Source), String> {
        match (&self.text, &self.broadcast) {
            (Some(text), _) => Ok((api::CUSTOM_PLAYER.to_string(), Source::Custom(text.clone()))),
            (None, Some(id)) => Ok((
                id.clone(),
                Source::Broadcast {
                    id: id.clone(),
                    inputs: ScriptInputs {
                        name: self.name.clone(),
                        gate: self.gate.clone(),
                        floor: self.floor.clone(),
                        hour: self.hour.clone(),
                        minute: self.minute.clone(),
                        repeat: self.repeat,
                        gate_repeat: self.gate_repeat,
                    },
                },
            )),
            (None, None) => Err("Either --text or --broadcast is required".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(args.config.as_deref());

    match args.command {
        Command::Segment { text } => {
            for run in segmenter::segment(&text) {
                println!("{:>4}  {:<11} {:?}", run.start, run.lang.to_string(), run.text);
            }
        }
        Command::Voices => list_voices(&config).await?,
        Command::Speak(speak_args) => speak(config, speak_args).await?,
        Command::Translate { name } => {
            let notifier = Arc::new(Notifier::new(config.feedback.notifications));
            let translator = translator::Translator::new(config.translation.clone(), notifier);
            println!("{}", translator.translate(&name).await?);
        }
        Command::Serve { port } => serve(config, port).await?,
    }

    Ok(())
}

async fn list_voices(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let engine = SimulatedEngine::new(&config.engine, events_tx);
    let voices = wait_for_voices(&engine, &config.voices.load).await?;

    let store = JsonPreferences::open(&JsonPreferences::default_path());
    let korean = store
        .get(prefs::KOREAN_VOICE)
        .or_else(|| config.voices.korean.clone());
    let english = store
        .get(prefs::ENGLISH_VOICE)
        .or_else(|| config.voices.english.clone());
    let selection = VoiceSelection::resolve(&voices, korean.as_deref(), english.as_deref());

    for voice in &voices {
        let marker = if selection.korean.as_deref() == Some(voice.name.as_str())
            || selection.english.as_deref() == Some(voice.name.as_str())
        {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<12} {}", voice.name, voice.lang);
    }
    Ok(())
}

/// Build the service around the simulated engine and spawn its loop.
fn start_service(
    config: Config,
    sinks: Arc<dyn SinkFactory>,
) -> (ServiceHandle, tokio::task::JoinHandle<()>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let engine = SimulatedEngine::new(&config.engine, events_tx);
    let notifier = Arc::new(Notifier::new(config.feedback.notifications));
    let prefs = Box::new(JsonPreferences::open(&JsonPreferences::default_path()));

    let (tx, rx) = mpsc::channel(32);
    let service = AnnouncerService::new(config, engine, prefs, sinks, notifier);
    let task = tokio::spawn(service.run(rx, events_rx));
    (ServiceHandle::new(tx), task)
}

async fn speak(config: Config, args: SpeakArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (player, source) = args.source()?;

    let (sinks, mut done) = TerminalSinks::new();
    let (handle, task) = start_service(config, Arc::new(sinks));

    if args.rate.is_some() || args.pitch.is_some() {
        handle.adjust(args.rate, args.pitch).await?;
    }
    if args.flight.is_some() || args.destination.is_some() {
        handle
            .select_flight(args.flight.clone(), args.destination.clone())
            .await?;
    }
    for (lang, name) in [
        (Lang::Korean, &args.korean_voice),
        (Lang::English, &args.english_voice),
    ] {
        if let Some(name) = name {
            handle.select_voice(lang, name).await?;
        }
    }

    match handle.toggle(&player, source).await? {
        TransportReply::Started => {
            tokio::select! {
                _ = done.wait_for(|finished| *finished) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping playback");
                    handle.stop(None).await?;
                }
            }
        }
        reply => info!("Nothing to play ({reply:?})"),
    }

    drop(handle);
    task.await?;
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.api.port);
    let board = PlayerBoard::default();
    let notifier = Arc::new(Notifier::new(config.feedback.notifications));
    let translator = Arc::new(translator::Translator::new(
        config.translation.clone(),
        notifier,
    ));
    let broadcasts = Arc::new(config.broadcasts.clone());

    let (handle, task) = start_service(config, Arc::new(board.clone()));

    let state = api::ApiState {
        service: handle.clone(),
        board,
        translator,
        broadcasts,
    };

    tokio::select! {
        result = api::serve(state, port) => {
            if let Err(e) = &result {
                warn!("API server failed: {e}");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    handle.stop(None).await?;
    drop(handle);
    task.abort();
    Ok(())
}
