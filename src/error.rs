//! Error types surfaced to the user through the notifier.

use thiserror::Error;

use crate::segmenter::Lang;

/// Failures that abort a playback request before any speech is queued.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No voice is selected (or the selected one is gone) for a language the text needs.
    #[error("Could not find a {0} voice. Please select another voice in the settings.")]
    VoiceUnavailable(Lang),

    /// The engine never reported any voices within the retry budget.
    #[error("Failed to load voices after {attempts} attempts. Please retry.")]
    EngineTimeout { attempts: u32 },

    #[error("The selected preview voice ({0}) is not available. Please choose another voice.")]
    PreviewVoiceUnavailable(String),
}

/// Name translation failures. Never affect playback state.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Please enter a name to translate.")]
    EmptyInput,

    #[error("API server error: {0}")]
    Status(reqwest::StatusCode),

    #[error("Could not find translated text in API response.")]
    MissingText,

    #[error("Translation request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A broadcast template is missing user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Please enter an announcement.")]
    EmptyCustomText,

    #[error("Please enter both name and gate number.")]
    MissingNameAndGate,

    #[error("Please enter both floor and gate numbers.")]
    MissingFloorAndGate,

    #[error("Please enter both hour and minute.")]
    MissingTime,

    #[error("The input field is empty.")]
    EmptyInput,

    #[error("Unknown broadcast: {0}")]
    UnknownBroadcast(String),
}
