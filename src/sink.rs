//! UI sinks: where player notifications end up.
//!
//! - `TerminalSink`: logs the word being read, signals completion to the CLI
//! - `StatusSink`: keeps a per-player snapshot for the HTTP status endpoint

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::player::{Highlight, UiSink};

/// Builds the sink for a player once its text is known.
pub trait SinkFactory: Send + Sync {
    fn sink(&self, player: &str, text: &str) -> Arc<dyn UiSink>;
}

pub struct TerminalSink {
    player: String,
    text: String,
    progress: Mutex<f64>,
    done: watch::Sender<bool>,
}

impl UiSink for TerminalSink {
    fn player_id(&self) -> &str {
        &self.player
    }

    fn on_playing(&self) {
        info!("▶ {}", self.player);
    }

    fn on_paused(&self) {
        info!("⏸ {}", self.player);
    }

    fn on_progress(&self, fraction: f64) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = fraction;
    }

    fn on_highlight(&self, span: Highlight) {
        let progress = *self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        info!("[{:>3.0}%] {}", progress * 100.0, span.slice(&self.text));
    }

    fn on_reset(&self) {
        info!("■ {}", self.player);
        let _ = self.done.send(true);
    }
}

/// Hands out terminal sinks that all report completion on one channel.
pub struct TerminalSinks {
    done: watch::Sender<bool>,
}

impl TerminalSinks {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (done, rx) = watch::channel(false);
        (Self { done }, rx)
    }
}

impl SinkFactory for TerminalSinks {
    fn sink(&self, player: &str, text: &str) -> Arc<dyn UiSink> {
        self.done.send_replace(false);
        Arc::new(TerminalSink {
            player: player.to_string(),
            text: text.to_string(),
            progress: Mutex::new(0.0),
            done: self.done.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

/// What a player shows: play/pause icon, progress bar, highlighted text.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub transport: Transport,
    pub progress: f64,
    pub text: String,
    pub highlight: Option<Highlight>,
    pub highlighted: Option<String>,
}

/// Latest status of every player that has played something.
#[derive(Clone, Default)]
pub struct PlayerBoard {
    players: Arc<Mutex<BTreeMap<String, PlayerStatus>>>,
}

impl PlayerBoard {
    pub fn snapshot(&self) -> BTreeMap<String, PlayerStatus> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, player: &str, f: impl FnOnce(&mut PlayerStatus)) {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = players.get_mut(player) {
            f(status);
        }
    }
}

pub struct StatusSink {
    player: String,
    board: PlayerBoard,
}

impl UiSink for StatusSink {
    fn player_id(&self) -> &str {
        &self.player
    }

    fn on_playing(&self) {
        self.board
            .update(&self.player, |s| s.transport = Transport::Playing);
    }

    fn on_paused(&self) {
        self.board
            .update(&self.player, |s| s.transport = Transport::Paused);
    }

    fn on_progress(&self, fraction: f64) {
        self.board.update(&self.player, |s| s.progress = fraction);
    }

    fn on_highlight(&self, span: Highlight) {
        self.board.update(&self.player, |s| {
            s.highlighted = Some(span.slice(&s.text).to_string());
            s.highlight = Some(span);
        });
    }

    fn on_reset(&self) {
        self.board.update(&self.player, |s| {
            s.transport = Transport::Stopped;
            s.progress = 0.0;
            s.highlight = None;
            s.highlighted = None;
        });
    }
}

impl SinkFactory for PlayerBoard {
    fn sink(&self, player: &str, text: &str) -> Arc<dyn UiSink> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                player.to_string(),
                PlayerStatus {
                    transport: Transport::Stopped,
                    progress: 0.0,
                    text: text.to_string(),
                    highlight: None,
                    highlighted: None,
                },
            );
        Arc::new(StatusSink {
            player: player.to_string(),
            board: self.clone(),
        })
    }
}
