//! Speech engine abstraction.
//!
//! The engine owns its voices and a FIFO queue of utterances. It never
//! blocks the caller: `speak` only enqueues, and progress comes back later
//! as [`EngineEvent`]s on the channel handed to the engine at construction.

pub mod simulated;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::VoiceLoadConfig;
use crate::error::PlaybackError;
use crate::segmenter::Lang;

/// A voice owned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP-47 tag, e.g. `ko-KR`.
    pub lang: String,
}

impl Voice {
    /// Whether this voice can read the given language.
    pub fn speaks(&self, lang: Lang) -> bool {
        let tag = self.lang.to_lowercase();
        match lang {
            Lang::Korean => tag.contains("ko"),
            Lang::English => tag.contains("en"),
            Lang::Unspecified => false,
        }
    }
}

/// What an utterance is for within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Silent readiness probe spoken before the first run.
    Probe,
    /// The i-th run of the session.
    Run(usize),
    /// Silent wake-up utterance outside any session.
    KeepAlive,
}

/// Identity of a queued utterance: session generation plus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceId {
    pub session: u64,
    pub slot: Slot,
}

/// One synthesis request.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// `None` lets the engine pick its default voice.
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    /// Zero-volume single-space utterance used to wake the engine.
    pub fn silent(id: UtteranceId) -> Self {
        Self {
            id,
            text: " ".into(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    Start,
    /// Character offset reached within the utterance text.
    Boundary { char_index: usize },
    End,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub utterance: UtteranceId,
    pub kind: EngineEventKind,
}

/// Platform speech-synthesis engine.
pub trait SpeechEngine: Send {
    /// Currently known voices. May be empty while the engine is still loading.
    fn voices(&self) -> Vec<Voice>;

    /// Append an utterance to the engine queue.
    fn speak(&mut self, utterance: Utterance);

    /// Drop every queued and in-flight utterance.
    fn cancel(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    /// True while anything is queued or playing, paused or not.
    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;
}

/// Poll the engine until it reports voices, backing off between attempts.
///
/// Returns the voices sorted by name, or `EngineTimeout` once the attempt
/// budget is spent.
pub async fn wait_for_voices<E: SpeechEngine + ?Sized>(
    engine: &E,
    retry: &VoiceLoadConfig,
) -> Result<Vec<Voice>, PlaybackError> {
    let attempts = retry.max_attempts.max(1);
    let mut delay = Duration::from_millis(retry.initial_delay_ms);
    let max_delay = Duration::from_millis(retry.max_delay_ms);
    // Never shrink the delay; a negative or NaN factor would panic in mul_f32
    let factor = if retry.backoff_factor.is_finite() {
        retry.backoff_factor.max(1.0)
    } else {
        1.0
    };

    for attempt in 1..=attempts {
        let mut voices = engine.voices();
        if !voices.is_empty() {
            voices.sort_by_key(|v| v.name.to_lowercase());
            info!("Loaded {} voices after {attempt} attempt(s)", voices.len());
            return Ok(voices);
        }

        if attempt == attempts {
            break;
        }

        debug!("No voices yet (attempt {attempt}/{attempts}), retrying in {delay:?}");
        tokio::time::sleep(delay).await;
        delay = delay.mul_f32(factor).min(max_delay);
    }

    Err(PlaybackError::EngineTimeout { attempts })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn fast_retry(max_attempts: u32) -> VoiceLoadConfig {
        VoiceLoadConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_voice_language_affinity() {
        assert!(korean_voice().speaks(Lang::Korean));
        assert!(!korean_voice().speaks(Lang::English));
        assert!(english_voice().speaks(Lang::English));
        assert!(!english_voice().speaks(Lang::Unspecified));
    }

    #[tokio::test]
    async fn test_wait_for_voices_sorts_by_name() {
        let engine = RecordingEngine::with_voices(vec![korean_voice(), english_voice()]);
        let voices = wait_for_voices(&engine, &fast_retry(3)).await.unwrap();
        let names: Vec<_> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Samantha", "Yuna"]);
    }

    #[tokio::test]
    async fn test_wait_for_voices_times_out() {
        let engine = RecordingEngine::default();
        let err = wait_for_voices(&engine, &fast_retry(4)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::EngineTimeout { attempts: 4 }));
    }

    #[tokio::test]
    async fn test_bad_backoff_factor_still_times_out() {
        let engine = RecordingEngine::default();
        for backoff_factor in [-1.0, f32::NAN, f32::INFINITY, 0.0] {
            let retry = VoiceLoadConfig {
                backoff_factor,
                ..fast_retry(3)
            };
            let err = wait_for_voices(&engine, &retry).await.unwrap_err();
            assert!(matches!(err, PlaybackError::EngineTimeout { attempts: 3 }));
        }
    }

    #[tokio::test]
    async fn test_wait_for_voices_ignores_case_when_sorting() {
        let lower = Voice {
            name: "alex".into(),
            lang: "en-US".into(),
        };
        let engine = RecordingEngine::with_voices(vec![korean_voice(), english_voice(), lower]);
        let voices = wait_for_voices(&engine, &fast_retry(1)).await.unwrap();
        let names: Vec<_> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["alex", "Samantha", "Yuna"]);
    }
}
