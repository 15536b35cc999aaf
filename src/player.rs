//! Playback sequencing.
//!
//! One [`PlaybackController`] owns the engine and at most one active session.
//! A session walks `ProbingReadiness → RunInFlight(0..n) → Finished`, and the
//! next run is only queued once the previous one has ended. Every utterance
//! carries its session generation, so events from a superseded or stopped
//! session are dropped on arrival.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::engine::{EngineEvent, EngineEventKind, Slot, SpeechEngine, Utterance, UtteranceId, Voice};
use crate::error::PlaybackError;
use crate::notifier::Notify;
use crate::segmenter::{segment, Lang, Run};

/// Character span of the source text currently being spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
}

impl Highlight {
    /// The highlighted part of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        let byte_at = |chars: usize| {
            text.char_indices()
                .nth(chars)
                .map_or(text.len(), |(i, _)| i)
        };
        &text[byte_at(self.start)..byte_at(self.end)]
    }
}

/// Presentation surface of one player (a broadcast row, the CLI, ...).
pub trait UiSink: Send + Sync {
    fn player_id(&self) -> &str;

    fn on_playing(&self);

    fn on_paused(&self);

    /// Fraction of the source text reached, in `[0, 1)`.
    fn on_progress(&self, fraction: f64);

    fn on_highlight(&self, span: Highlight);

    /// Playback finished or was stopped: progress back to zero, play icon shown.
    fn on_reset(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "run", rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    ProbingReadiness,
    RunInFlight(usize),
    Finished,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::ProbingReadiness => write!(f, "PROBING"),
            Self::RunInFlight(i) => write!(f, "RUN({i})"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Chosen voice names per language.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoiceSelection {
    pub korean: Option<String>,
    pub english: Option<String>,
}

impl VoiceSelection {
    /// Keep each preferred name if the engine has it, otherwise take the
    /// first voice for that language.
    pub fn resolve(voices: &[Voice], korean: Option<&str>, english: Option<&str>) -> Self {
        let available = |name: &&str| voices.iter().any(|v| v.name == *name);
        let first = |want: Lang| {
            voices
                .iter()
                .find(|v| v.speaks(want) && (want == Lang::Korean || !v.speaks(Lang::Korean)))
                .map(|v| v.name.clone())
        };

        Self {
            korean: korean
                .filter(available)
                .map(str::to_string)
                .or_else(|| first(Lang::Korean)),
            english: english
                .filter(available)
                .map(str::to_string)
                .or_else(|| first(Lang::English)),
        }
    }

    pub fn get(&self, lang: Lang) -> Option<&str> {
        match lang {
            Lang::Korean => self.korean.as_deref(),
            Lang::English => self.english.as_deref(),
            Lang::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackSettings {
    pub rate: f32,
    pub pitch: f32,
    pub grace_delay: Duration,
    pub probe_settle: Duration,
}

/// Speaking rate limited to `0.1..=10`. Non-finite values fall back to 1.
pub fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(0.1, 10.0)
    } else {
        1.0
    }
}

/// Pitch limited to `0..=2`. Non-finite values fall back to 1.
pub fn clamp_pitch(pitch: f32) -> f32 {
    if pitch.is_finite() {
        pitch.clamp(0.0, 2.0)
    } else {
        1.0
    }
}

impl From<&PlaybackConfig> for PlaybackSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            rate: clamp_rate(config.rate),
            pitch: clamp_pitch(config.pitch),
            grace_delay: Duration::from_millis(config.grace_delay_ms),
            probe_settle: Duration::from_millis(config.probe_settle_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Paused,
    Resumed,
    /// The player does not own a speaking session.
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    ProbeSettled,
    Grace,
}

#[derive(Debug)]
struct Timer {
    at: Instant,
    session: u64,
    kind: TimerKind,
}

struct ActiveSession {
    id: u64,
    chars: Vec<char>,
    runs: Vec<Run>,
    korean: Option<Voice>,
    english: Option<Voice>,
    state: PlayerState,
    last_offset: Option<usize>,
    sink: Option<Arc<dyn UiSink>>,
}

impl ActiveSession {
    fn voice_for(&self, lang: Lang) -> Option<Voice> {
        match lang {
            Lang::Korean => self.korean.clone(),
            Lang::English => self.english.clone(),
            Lang::Unspecified => self.english.clone().or_else(|| self.korean.clone()),
        }
    }

    fn report_boundary(&mut self, run_index: usize, local: usize) {
        let Some(run) = self.runs.get(run_index) else {
            return;
        };

        // Engines occasionally report past the end of the utterance
        let local = local.min(run.char_len().saturating_sub(1));
        let global = run.start + local;

        if self.last_offset.is_some_and(|last| global < last) {
            debug!("Ignoring backwards boundary at {global}");
            return;
        }
        self.last_offset = Some(global);

        let total = self.chars.len();
        let end = self.chars[global + 1..]
            .iter()
            .position(|c| c.is_whitespace())
            .map_or(total, |p| global + 1 + p);

        if let Some(sink) = &self.sink {
            sink.on_progress(global as f64 / total as f64);
            sink.on_highlight(Highlight { start: global, end });
        }
    }

    fn reset_sink(&self) {
        if let Some(sink) = &self.sink {
            sink.on_reset();
        }
    }
}

pub struct PlaybackController<E: SpeechEngine> {
    engine: E,
    voices: Vec<Voice>,
    settings: PlaybackSettings,
    notifier: Arc<dyn Notify>,
    generation: u64,
    session: Option<ActiveSession>,
    timer: Option<Timer>,
}

impl<E: SpeechEngine> PlaybackController<E> {
    pub fn new(engine: E, settings: PlaybackSettings, notifier: Arc<dyn Notify>) -> Self {
        Self {
            engine,
            voices: Vec::new(),
            settings,
            notifier,
            generation: 0,
            session: None,
            timer: None,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.voices = voices;
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Applies to runs queued from now on.
    pub fn set_rate(&mut self, rate: f32) {
        self.settings.rate = clamp_rate(rate);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.settings.pitch = clamp_pitch(pitch);
    }

    pub fn state(&self) -> PlayerState {
        self.session.as_ref().map_or(PlayerState::Idle, |s| s.state)
    }

    pub fn active_player(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.sink.as_ref())
            .map(|sink| sink.player_id())
    }

    fn find_voice(&self, name: Option<&str>) -> Option<Voice> {
        let name = name?;
        self.voices.iter().find(|v| v.name == name).cloned()
    }

    /// Start reading `text` on behalf of `sink`, superseding any active session.
    ///
    /// Text without runs is a no-op and returns `Idle`. A language without a
    /// usable voice aborts before anything is queued.
    pub fn play(
        &mut self,
        text: &str,
        selection: &VoiceSelection,
        sink: Arc<dyn UiSink>,
    ) -> Result<PlayerState, PlaybackError> {
        let runs = segment(text);
        if runs.is_empty() {
            debug!("Nothing to read for player {}", sink.player_id());
            return Ok(PlayerState::Idle);
        }

        let korean = self.find_voice(selection.korean.as_deref());
        let english = self.find_voice(selection.english.as_deref());

        for (lang, voice) in [(Lang::Korean, &korean), (Lang::English, &english)] {
            if voice.is_none() && runs.iter().any(|r| r.lang == lang) {
                let err = PlaybackError::VoiceUnavailable(lang);
                self.detach();
                sink.on_reset();
                self.notifier.alert(&err.to_string());
                return Err(err);
            }
        }

        self.detach();
        info!(
            "Player {}: {} runs, {} chars",
            sink.player_id(),
            runs.len(),
            text.chars().count()
        );
        self.start_session(text, runs, korean, english, Some(sink));
        Ok(self.state())
    }

    /// Speak a sample with one explicit voice. Not tied to any player.
    pub fn preview(&mut self, text: &str, voice_name: &str) -> Result<PlayerState, PlaybackError> {
        let Some(voice) = self.find_voice(Some(voice_name)) else {
            let err = PlaybackError::PreviewVoiceUnavailable(voice_name.to_string());
            self.notifier.alert(&err.to_string());
            return Err(err);
        };
        if text.trim().is_empty() {
            return Ok(PlayerState::Idle);
        }

        self.detach();
        let run = Run {
            text: text.to_string(),
            lang: Lang::Unspecified,
            start: 0,
        };
        self.start_session(text, vec![run], Some(voice.clone()), Some(voice), None);
        Ok(self.state())
    }

    /// Pause or resume, but only for the player that owns the speaking session.
    pub fn toggle(&mut self, player: &str) -> ToggleOutcome {
        let owner = self
            .session
            .as_ref()
            .and_then(|s| s.sink.clone())
            .filter(|sink| sink.player_id() == player);

        match owner {
            Some(sink) if self.engine.is_speaking() => {
                if self.engine.is_paused() {
                    self.engine.resume();
                    sink.on_playing();
                    info!("Player {player} resumed");
                    ToggleOutcome::Resumed
                } else {
                    self.engine.pause();
                    sink.on_paused();
                    info!("Player {player} paused");
                    ToggleOutcome::Paused
                }
            }
            _ => ToggleOutcome::Inactive,
        }
    }

    /// Cancel everything queued and reset the active player.
    pub fn stop(&mut self) {
        self.engine.cancel();
        self.timer = None;
        if let Some(session) = self.session.take() {
            info!("Session {} stopped in {}", session.id, session.state);
            session.reset_sink();
        }
    }

    /// Nudge an idle engine with a silent utterance so it does not go to sleep.
    pub fn keep_alive(&mut self) {
        if self.voices.is_empty() || self.session.is_some() || self.engine.is_speaking() {
            return;
        }
        debug!("Waking up speech engine");
        self.engine.cancel();
        self.engine.speak(Utterance::silent(UtteranceId {
            session: self.generation,
            slot: Slot::KeepAlive,
        }));
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("No active session, dropping {:?}", event.kind);
            return;
        };
        if event.utterance.session != session.id {
            debug!(
                "Dropping {:?} from superseded session {}",
                event.kind, event.utterance.session
            );
            return;
        }

        match (event.utterance.slot, event.kind) {
            (Slot::Probe, EngineEventKind::End) => self.begin_runs(),
            (Slot::Probe, EngineEventKind::Error(reason)) => {
                warn!("Readiness probe failed: {reason}");
                self.begin_runs();
            }
            (Slot::Probe | Slot::KeepAlive, _) => {}
            (Slot::Run(i), kind) => {
                if session.state != PlayerState::RunInFlight(i) {
                    debug!("Dropping {kind:?} for run {i} while {}", session.state);
                    return;
                }
                match kind {
                    EngineEventKind::Start => {
                        if i == 0 {
                            if let Some(sink) = &session.sink {
                                sink.on_playing();
                            }
                        }
                    }
                    EngineEventKind::Boundary { char_index } => {
                        session.report_boundary(i, char_index);
                    }
                    EngineEventKind::End => self.finish_run(i),
                    EngineEventKind::Error(reason) => {
                        warn!("Run {i} failed: {reason}, continuing");
                        self.finish_run(i);
                    }
                }
            }
        }
    }

    /// When the controller next needs [`on_timer`](Self::on_timer).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.as_ref().map(|t| t.at)
    }

    pub fn on_timer(&mut self, now: Instant) {
        let timer = match self.timer.take() {
            Some(timer) if timer.at <= now => timer,
            pending => {
                self.timer = pending;
                return;
            }
        };
        if self.session.as_ref().map(|s| s.id) != Some(timer.session) {
            return;
        }

        match timer.kind {
            TimerKind::ProbeSettled => self.begin_runs(),
            TimerKind::Grace => {
                if let Some(session) = self.session.take() {
                    info!("Session {} finished", session.id);
                    session.reset_sink();
                }
            }
        }
    }

    /// Cancel speech left over from earlier sessions and reset their player.
    fn detach(&mut self) {
        self.timer = None;
        if let Some(old) = self.session.take() {
            debug!("Superseding session {}", old.id);
            old.reset_sink();
        }
        if self.engine.is_speaking() {
            self.engine.cancel();
        }
    }

    fn start_session(
        &mut self,
        text: &str,
        runs: Vec<Run>,
        korean: Option<Voice>,
        english: Option<Voice>,
        sink: Option<Arc<dyn UiSink>>,
    ) {
        self.generation += 1;
        let id = self.generation;
        self.session = Some(ActiveSession {
            id,
            chars: text.chars().collect(),
            runs,
            korean,
            english,
            state: PlayerState::ProbingReadiness,
            last_offset: None,
            sink,
        });

        if self.engine.is_speaking() {
            // Engine still busy after cancel: give it a moment instead of a probe
            self.engine.cancel();
            self.timer = Some(Timer {
                at: Instant::now() + self.settings.probe_settle,
                session: id,
                kind: TimerKind::ProbeSettled,
            });
        } else {
            self.engine.speak(Utterance::silent(UtteranceId {
                session: id,
                slot: Slot::Probe,
            }));
        }
    }

    fn begin_runs(&mut self) {
        if self.state() == PlayerState::ProbingReadiness {
            self.submit_run(0);
        }
    }

    fn submit_run(&mut self, index: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(run) = session.runs.get(index) else {
            return;
        };

        let utterance = Utterance {
            id: UtteranceId {
                session: session.id,
                slot: Slot::Run(index),
            },
            text: run.text.clone(),
            voice: session.voice_for(run.lang),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            volume: 1.0,
        };
        debug!(
            "Session {} run {index} [{}]: {:?}",
            session.id, run.lang, run.text
        );
        session.state = PlayerState::RunInFlight(index);
        self.engine.speak(utterance);
    }

    fn finish_run(&mut self, index: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if index + 1 < session.runs.len() {
            self.submit_run(index + 1);
        } else {
            session.state = PlayerState::Finished;
            self.timer = Some(Timer {
                at: Instant::now() + self.settings.grace_delay,
                session: session.id,
                kind: TimerKind::Grace,
            });
        }
    }
}
