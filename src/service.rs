//! Announcer service: owns the playback controller and serializes every
//! request against it.
//!
//! Commands (CLI, HTTP), engine events and controller timers are all handled
//! on one task, so the controller never needs a lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{wait_for_voices, EngineEvent, SpeechEngine, Voice};
use crate::error::PlaybackError;
use crate::notifier::Notify;
use crate::player::{PlaybackController, PlaybackSettings, PlayerState, ToggleOutcome, VoiceSelection};
use crate::prefs::{self, PreferenceStore};
use crate::script::{compose, FlightSelection, Source};
use crate::segmenter::Lang;
use crate::sink::SinkFactory;

const NO_ENGLISH_VOICES: &str = "No English voices were found. Please check your \
    Text-to-Speech settings and make sure English language data is installed.";

/// Sample utterances behind the settings preview buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Korean,
    English,
    Rate,
    Pitch,
}

impl PreviewKind {
    pub fn text(self) -> &'static str {
        match self {
            Self::Korean => "안녕하세요. 한국어 음성입니다.",
            Self::English => "Hello, this is an English voice.",
            Self::Rate => "Testing the speed.",
            Self::Pitch => "Testing the pitch.",
        }
    }

    pub fn lang(self) -> Lang {
        match self {
            Self::Korean => Lang::Korean,
            _ => Lang::English,
        }
    }
}

/// What a play/pause press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportReply {
    Paused,
    Resumed,
    Started,
    /// Nothing to read.
    Nothing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub ready: bool,
    pub state: PlayerState,
    pub active_player: Option<String>,
    pub voices: Vec<Voice>,
    pub selection: VoiceSelection,
    pub rate: f32,
    pub pitch: f32,
    pub flight: String,
    pub destination: String,
}

type Reply<T> = oneshot::Sender<Result<T, String>>;

pub enum Command {
    /// Play/pause button of a player.
    Toggle {
        player: String,
        source: Source,
        reply: Reply<TransportReply>,
    },
    /// Stop one player (only if it is the active one) or everything.
    Stop { player: Option<String> },
    Preview {
        kind: PreviewKind,
        reply: Reply<()>,
    },
    SelectVoice {
        lang: Lang,
        name: String,
        reply: Reply<()>,
    },
    SelectFlight {
        flight: Option<String>,
        destination: Option<String>,
    },
    Adjust {
        rate: Option<f32>,
        pitch: Option<f32>,
    },
    Status { reply: oneshot::Sender<ServiceStatus> },
}

pub struct AnnouncerService<E: SpeechEngine> {
    config: Config,
    controller: PlaybackController<E>,
    prefs: Box<dyn PreferenceStore>,
    sinks: Arc<dyn SinkFactory>,
    notifier: Arc<dyn Notify>,
    selection: VoiceSelection,
    flight: FlightSelection,
    ready: bool,
}

impl<E: SpeechEngine> AnnouncerService<E> {
    pub fn new(
        config: Config,
        engine: E,
        prefs: Box<dyn PreferenceStore>,
        sinks: Arc<dyn SinkFactory>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        let controller = PlaybackController::new(
            engine,
            PlaybackSettings::from(&config.playback),
            notifier.clone(),
        );

        let flight = FlightSelection {
            flight: prefs
                .get(prefs::FLIGHT)
                .or_else(|| config.flights.first().cloned())
                .unwrap_or_default(),
            destination: prefs
                .get(prefs::DESTINATION)
                .or_else(|| config.airports.keys().next().cloned())
                .unwrap_or_default(),
        };

        Self {
            config,
            controller,
            prefs,
            sinks,
            notifier,
            selection: VoiceSelection::default(),
            flight,
            ready: false,
        }
    }

    /// Wait for engine voices and resolve the voice selection. Runs once.
    pub async fn ensure_ready(&mut self) -> Result<(), PlaybackError> {
        if self.ready {
            return Ok(());
        }

        let voices = match wait_for_voices(self.controller.engine(), &self.config.voices.load).await {
            Ok(voices) => voices,
            Err(e) => {
                self.notifier.alert(&e.to_string());
                return Err(e);
            }
        };

        let korean = self
            .prefs
            .get(prefs::KOREAN_VOICE)
            .or_else(|| self.config.voices.korean.clone());
        let english = self
            .prefs
            .get(prefs::ENGLISH_VOICE)
            .or_else(|| self.config.voices.english.clone());
        self.selection = VoiceSelection::resolve(&voices, korean.as_deref(), english.as_deref());

        info!(
            "{} voices loaded (korean: {}, english: {})",
            voices.len(),
            self.selection.korean.as_deref().unwrap_or("-"),
            self.selection.english.as_deref().unwrap_or("-"),
        );
        if self.selection.english.is_none() && self.selection.korean.is_some() {
            self.notifier.alert(NO_ENGLISH_VOICES);
        }

        self.controller.set_voices(voices);
        self.ready = true;
        Ok(())
    }

    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Toggle {
                player,
                source,
                reply,
            } => {
                let result = self.toggle(&player, source).await;
                let _ = reply.send(result);
            }
            Command::Stop { player } => self.stop(player.as_deref()),
            Command::Preview { kind, reply } => {
                let result = self.preview(kind).await;
                let _ = reply.send(result);
            }
            Command::SelectVoice { lang, name, reply } => {
                let result = self.select_voice(lang, name).await;
                let _ = reply.send(result);
            }
            Command::SelectFlight {
                flight,
                destination,
            } => self.select_flight(flight, destination),
            Command::Adjust { rate, pitch } => self.adjust(rate, pitch),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn toggle(&mut self, player: &str, source: Source) -> Result<TransportReply, String> {
        match self.controller.toggle(player) {
            ToggleOutcome::Paused => return Ok(TransportReply::Paused),
            ToggleOutcome::Resumed => return Ok(TransportReply::Resumed),
            ToggleOutcome::Inactive => {}
        }

        self.controller.stop();

        let text = compose(
            &source,
            &self.config.broadcasts,
            &self.flight,
            &self.config.airports,
        )
        .map_err(|e| {
            self.notifier.alert(&e.to_string());
            e.to_string()
        })?;

        self.ensure_ready().await.map_err(|e| e.to_string())?;

        let sink = self.sinks.sink(player, &text);
        match self.controller.play(&text, &self.selection, sink) {
            Ok(PlayerState::Idle) => Ok(TransportReply::Nothing),
            Ok(_) => Ok(TransportReply::Started),
            Err(e) => Err(e.to_string()),
        }
    }

    fn stop(&mut self, player: Option<&str>) {
        match player {
            Some(id) if self.controller.active_player() != Some(id) => {
                debug!("Stop for inactive player {id} ignored");
            }
            _ => self.controller.stop(),
        }
    }

    async fn preview(&mut self, kind: PreviewKind) -> Result<(), String> {
        self.ensure_ready().await.map_err(|e| e.to_string())?;

        let Some(voice) = self.selection.get(kind.lang()).map(str::to_string) else {
            let err = PlaybackError::PreviewVoiceUnavailable(format!("no {} voice", kind.lang()));
            self.notifier.alert(&err.to_string());
            return Err(err.to_string());
        };

        self.controller
            .preview(kind.text(), &voice)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn select_voice(&mut self, lang: Lang, name: String) -> Result<(), String> {
        self.ensure_ready().await.map_err(|e| e.to_string())?;

        let known = self
            .controller
            .voices()
            .iter()
            .any(|v| v.name == name && v.speaks(lang));
        if !known {
            return Err(format!("Unknown {lang} voice: {name}"));
        }

        let key = match lang {
            Lang::Korean => {
                self.selection.korean = Some(name.clone());
                prefs::KOREAN_VOICE
            }
            Lang::English => {
                self.selection.english = Some(name.clone());
                prefs::ENGLISH_VOICE
            }
            Lang::Unspecified => return Err("A language is required".into()),
        };
        self.prefs.set(key, &name);
        info!("{lang} voice set to {name}");
        Ok(())
    }

    fn select_flight(&mut self, flight: Option<String>, destination: Option<String>) {
        if let Some(flight) = flight {
            self.prefs.set(prefs::FLIGHT, &flight);
            self.flight.flight = flight;
        }
        if let Some(destination) = destination {
            self.prefs.set(prefs::DESTINATION, &destination);
            self.flight.destination = destination;
        }
        info!(
            "Flight {} to {}",
            self.flight.flight, self.flight.destination
        );
    }

    fn adjust(&mut self, rate: Option<f32>, pitch: Option<f32>) {
        if let Some(rate) = rate {
            self.controller.set_rate(rate);
        }
        if let Some(pitch) = pitch {
            self.controller.set_pitch(pitch);
        }
        let settings = self.controller.settings();
        debug!("Rate {} pitch {}", settings.rate, settings.pitch);
    }

    pub fn status(&self) -> ServiceStatus {
        let settings = self.controller.settings();
        ServiceStatus {
            ready: self.ready,
            state: self.controller.state(),
            active_player: self.controller.active_player().map(str::to_string),
            voices: self.controller.voices().to_vec(),
            selection: self.selection.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            flight: self.flight.flight.clone(),
            destination: self.flight.destination.clone(),
        }
    }

    /// Main loop. Returns when every command sender is gone.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        let keep_alive_secs = self.config.playback.keep_alive_secs;
        let mut keep_alive = tokio::time::interval(Duration::from_secs(keep_alive_secs.max(1)));
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Announcer service ready");

        loop {
            let deadline = self.controller.next_deadline();
            let timer = tokio::time::sleep_until(
                deadline
                    .map(tokio::time::Instant::from_std)
                    .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600)),
            );

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        info!("Command channel closed");
                        break;
                    }
                },
                Some(event) = events.recv() => self.controller.handle_event(event),
                _ = timer, if deadline.is_some() => self.controller.on_timer(Instant::now()),
                _ = keep_alive.tick(), if keep_alive_secs > 0 && self.ready => {
                    self.controller.keep_alive();
                }
            }
        }

        self.controller.stop();
    }
}

/// Cloneable front end for the service task.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Command>,
}

impl ServiceHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: Command) -> Result<(), String> {
        self.tx.send(command).await.map_err(|_| {
            warn!("Announcer service is not running");
            "Announcer service is not running".to_string()
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, String> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await
            .map_err(|_| "Announcer service dropped the request".to_string())?
    }

    pub async fn toggle(&self, player: &str, source: Source) -> Result<TransportReply, String> {
        let player = player.to_string();
        self.request(|reply| Command::Toggle {
            player,
            source,
            reply,
        })
        .await
    }

    pub async fn stop(&self, player: Option<&str>) -> Result<(), String> {
        self.send(Command::Stop {
            player: player.map(str::to_string),
        })
        .await
    }

    pub async fn preview(&self, kind: PreviewKind) -> Result<(), String> {
        self.request(|reply| Command::Preview { kind, reply }).await
    }

    pub async fn select_voice(&self, lang: Lang, name: &str) -> Result<(), String> {
        let name = name.to_string();
        self.request(|reply| Command::SelectVoice { lang, name, reply })
            .await
    }

    pub async fn select_flight(
        &self,
        flight: Option<String>,
        destination: Option<String>,
    ) -> Result<(), String> {
        self.send(Command::SelectFlight {
            flight,
            destination,
        })
        .await
    }

    pub async fn adjust(&self, rate: Option<f32>, pitch: Option<f32>) -> Result<(), String> {
        self.send(Command::Adjust { rate, pitch }).await
    }

    pub async fn status(&self) -> Result<ServiceStatus, String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await
            .map_err(|_| "Announcer service dropped the request".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoiceLoadConfig;
    use crate::engine::testing::{english_voice, korean_voice, RecordingEngine};
    use crate::engine::{EngineEventKind, Slot, UtteranceId};
    use crate::notifier::testing::RecordingNotifier;
    use crate::prefs::MemoryPreferences;
    use crate::script::ScriptInputs;
    use crate::sink::{PlayerBoard, Transport};

    struct Fixture {
        service: AnnouncerService<RecordingEngine>,
        board: PlayerBoard,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(voices: Vec<Voice>) -> Fixture {
        let mut config = Config::default();
        config.voices.load = VoiceLoadConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
        };
        let board = PlayerBoard::default();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AnnouncerService::new(
            config,
            RecordingEngine::with_voices(voices),
            Box::new(MemoryPreferences::default()),
            Arc::new(board.clone()),
            notifier.clone(),
        );
        Fixture {
            service,
            board,
            notifier,
        }
    }

    fn finish_probe(service: &mut AnnouncerService<RecordingEngine>) {
        let probe = service.controller.engine().spoken.last().unwrap().id;
        assert_eq!(probe.slot, Slot::Probe);
        service.controller.handle_event(EngineEvent {
            utterance: probe,
            kind: EngineEventKind::End,
        });
    }

    #[tokio::test]
    async fn test_toggle_starts_then_pauses_active_player() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);

        let reply = f
            .service
            .toggle("custom", Source::Custom("Hello 안녕".into()))
            .await
            .unwrap();
        assert_eq!(reply, TransportReply::Started);
        assert!(f.service.status().ready);
        assert_eq!(f.board.snapshot()["custom"].text, "Hello 안녕");

        finish_probe(&mut f.service);

        let reply = f
            .service
            .toggle("custom", Source::Custom("ignored".into()))
            .await
            .unwrap();
        assert_eq!(reply, TransportReply::Paused);
        assert_eq!(f.board.snapshot()["custom"].transport, Transport::Paused);
    }

    #[tokio::test]
    async fn test_toggle_other_player_supersedes() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);
        f.service
            .toggle("custom", Source::Custom("first".into()))
            .await
            .unwrap();

        let source = Source::Broadcast {
            id: "boarding".into(),
            inputs: ScriptInputs::default(),
        };
        let reply = f.service.toggle("boarding", source).await.unwrap();

        assert_eq!(reply, TransportReply::Started);
        assert_eq!(f.service.status().active_player.as_deref(), Some("boarding"));
        assert_eq!(f.board.snapshot()["custom"].transport, Transport::Stopped);
    }

    #[tokio::test]
    async fn test_script_error_is_alerted() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);
        let err = f
            .service
            .toggle("custom", Source::Custom("  ".into()))
            .await
            .unwrap_err();

        assert_eq!(err, "Please enter an announcement.");
        assert_eq!(f.notifier.messages(), vec![err]);
        assert!(f.service.controller.engine().spoken.is_empty());
    }

    #[tokio::test]
    async fn test_no_voices_times_out() {
        let mut f = fixture(Vec::new());
        let err = f
            .service
            .toggle("custom", Source::Custom("Hello".into()))
            .await
            .unwrap_err();

        assert!(err.contains("2 attempts"));
        assert!(!f.service.status().ready);
        assert_eq!(f.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_korean_only_engine_warns_once_ready() {
        let mut f = fixture(vec![korean_voice()]);
        f.service.ensure_ready().await.unwrap();
        assert_eq!(f.notifier.messages(), vec![NO_ENGLISH_VOICES.to_string()]);

        // Ready is sticky
        f.service.ensure_ready().await.unwrap();
        assert_eq!(f.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_select_voice_persists_and_rejects_unknown() {
        let heami = Voice {
            name: "Heami".into(),
            lang: "ko-KR".into(),
        };
        let mut f = fixture(vec![korean_voice(), heami, english_voice()]);

        f.service
            .select_voice(Lang::Korean, "Heami".into())
            .await
            .unwrap();
        assert_eq!(f.service.selection.korean.as_deref(), Some("Heami"));
        assert_eq!(
            f.service.prefs.get(prefs::KOREAN_VOICE).as_deref(),
            Some("Heami")
        );

        assert!(f
            .service
            .select_voice(Lang::English, "Heami".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_preview_uses_language_voice() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);
        f.service.preview(PreviewKind::Rate).await.unwrap();
        finish_probe(&mut f.service);

        let runs = f.service.controller.engine().runs();
        assert_eq!(runs[0].text, "Testing the speed.");
        assert_eq!(runs[0].voice.as_ref().unwrap().name, "Samantha");
    }

    #[tokio::test]
    async fn test_preview_without_language_voice_uses_preview_message() {
        let mut f = fixture(vec![korean_voice()]);
        let err = f.service.preview(PreviewKind::English).await.unwrap_err();

        assert!(err.starts_with("The selected preview voice"));
        assert_eq!(f.notifier.messages().last(), Some(&err));
        assert!(f.service.controller.engine().spoken.is_empty());
    }

    #[tokio::test]
    async fn test_stop_ignores_inactive_player() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);
        f.service
            .toggle("custom", Source::Custom("Hello".into()))
            .await
            .unwrap();

        f.service.stop(Some("boarding"));
        assert_eq!(f.service.status().active_player.as_deref(), Some("custom"));

        f.service.stop(Some("custom"));
        assert_eq!(f.service.status().state, PlayerState::Idle);
    }

    #[test]
    fn test_flight_selection_and_adjust() {
        let mut f = fixture(vec![korean_voice(), english_voice()]);
        f.service
            .select_flight(Some("KE123".into()), Some("PUS".into()));
        f.service.adjust(Some(20.0), Some(1.5));

        let status = f.service.status();
        assert_eq!(status.flight, "KE123");
        assert_eq!(status.destination, "PUS");
        assert_eq!(status.rate, 10.0);
        assert_eq!(status.pitch, 1.5);
        assert_eq!(f.service.prefs.get(prefs::FLIGHT).as_deref(), Some("KE123"));
    }

    #[tokio::test]
    async fn test_run_loop_serves_handle() {
        let f = fixture(vec![korean_voice(), english_voice()]);
        let (tx, rx) = mpsc::channel(8);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = ServiceHandle::new(tx);
        let task = tokio::spawn(f.service.run(rx, events_rx));

        let reply = handle
            .toggle("custom", Source::Custom("Hello".into()))
            .await
            .unwrap();
        assert_eq!(reply, TransportReply::Started);

        // Probe of the first session
        events_tx
            .send(EngineEvent {
                utterance: UtteranceId {
                    session: 1,
                    slot: Slot::Probe,
                },
                kind: EngineEventKind::End,
            })
            .unwrap();
        let mut state = PlayerState::ProbingReadiness;
        for _ in 0..50 {
            state = handle.status().await.unwrap().state;
            if state != PlayerState::ProbingReadiness {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state, PlayerState::RunInFlight(0));

        drop(handle);
        task.await.unwrap();
    }
}
