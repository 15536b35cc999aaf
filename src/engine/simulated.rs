//! Simulated speech engine.
//!
//! Plays utterances from a FIFO queue on a background tokio task, pacing
//! each word by character count and emitting a boundary event at every word
//! start. Pause, resume and cancel behave like a platform engine: the queue
//! is kept while paused, and cancel drops everything and reports the
//! interrupted utterance as an error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use super::{EngineEvent, EngineEventKind, SpeechEngine, Utterance, UtteranceId, Voice};
use crate::config::EngineConfig;

const TICK: Duration = Duration::from_millis(10);

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Utterance>,
    current: Option<UtteranceId>,
    paused: bool,
    /// Bumped on every cancel so the worker can tell its utterance was dropped.
    epoch: u64,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    events: mpsc::UnboundedSender<EngineEvent>,
    chars_per_second: f32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False once nobody listens for events anymore.
    fn emit(&self, utterance: UtteranceId, kind: EngineEventKind) -> bool {
        self.events.send(EngineEvent { utterance, kind }).is_ok()
    }
}

pub struct SimulatedEngine {
    shared: Arc<Shared>,
    voices: Vec<Voice>,
    voices_ready_at: Instant,
}

impl SimulatedEngine {
    /// Create the engine and spawn its playback task. Must be called inside a tokio runtime.
    pub fn new(config: &EngineConfig, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            events,
            chars_per_second: config.chars_per_second.max(1.0),
        });

        tokio::spawn(worker(shared.clone()));

        Self {
            shared,
            voices: config.voices.clone(),
            voices_ready_at: Instant::now() + Duration::from_millis(config.voice_load_delay_ms),
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

impl SpeechEngine for SimulatedEngine {
    fn voices(&self) -> Vec<Voice> {
        if Instant::now() >= self.voices_ready_at {
            self.voices.clone()
        } else {
            Vec::new()
        }
    }

    fn speak(&mut self, utterance: Utterance) {
        self.shared.lock().pending.push_back(utterance);
        self.shared.wake.notify_one();
    }

    fn cancel(&mut self) {
        {
            let mut state = self.shared.lock();
            state.pending.clear();
            state.current = None;
            state.paused = false;
            state.epoch += 1;
        }
        self.shared.wake.notify_one();
    }

    fn pause(&mut self) {
        self.shared.lock().paused = true;
    }

    fn resume(&mut self) {
        self.shared.lock().paused = false;
        self.shared.wake.notify_one();
    }

    fn is_speaking(&self) -> bool {
        let state = self.shared.lock();
        state.current.is_some() || !state.pending.is_empty()
    }

    fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }
}

async fn worker(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut state = shared.lock();
            if state.closed {
                return;
            }
            if state.paused {
                None
            } else {
                let epoch = state.epoch;
                state.pending.pop_front().map(|u| {
                    state.current = Some(u.id);
                    (u, epoch)
                })
            }
        };

        match next {
            Some((utterance, epoch)) => {
                if !speak_one(&shared, utterance, epoch).await {
                    debug!("Event receiver gone, stopping simulated engine");
                    return;
                }
            }
            None => shared.wake.notified().await,
        }
    }
}

/// Start offset and length of every word.
fn words(chars: &[char]) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        match (start, c.is_whitespace()) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                words.push((s, i - s));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, chars.len() - s));
    }
    words
}

/// Play one utterance. Returns false if events can no longer be delivered.
async fn speak_one(shared: &Shared, utterance: Utterance, epoch: u64) -> bool {
    let id = utterance.id;
    if !shared.emit(id, EngineEventKind::Start) {
        return false;
    }

    if utterance.volume > 0.0 {
        let chars: Vec<char> = utterance.text.chars().collect();
        let speed = shared.chars_per_second * utterance.rate.max(0.1);

        for (start, len) in words(&chars) {
            if !shared.emit(id, EngineEventKind::Boundary { char_index: start }) {
                return false;
            }
            // Count the following space too
            let duration = Duration::from_secs_f32((len + 1) as f32 / speed);
            if !pace(shared, duration, epoch).await {
                return shared.emit(id, EngineEventKind::Error("interrupted".into()));
            }
        }
    }

    let finished = {
        let mut state = shared.lock();
        if state.epoch == epoch {
            state.current = None;
            true
        } else {
            false
        }
    };

    if finished {
        shared.emit(id, EngineEventKind::End)
    } else {
        shared.emit(id, EngineEventKind::Error("interrupted".into()))
    }
}

/// Sleep for `duration` of unpaused time. False if cancelled meanwhile.
async fn pace(shared: &Shared, duration: Duration, epoch: u64) -> bool {
    let mut remaining = duration;
    loop {
        let paused = {
            let state = shared.lock();
            if state.epoch != epoch || state.closed {
                return false;
            }
            state.paused
        };
        if remaining.is_zero() {
            return true;
        }

        let step = remaining.min(TICK);
        tokio::time::sleep(step).await;
        if !paused {
            remaining = remaining.saturating_sub(step);
        }
    }
}
