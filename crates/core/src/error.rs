//! Error types shared across the orchestrator.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown clip id: {0}")]
pub struct UnknownClip(pub String);

/// Failures of the remote classification call. Every variant is recovered
/// locally by [`crate::IntentResolver`].
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("classifier returned a malformed body: {0}")]
    Malformed(String),

    #[error("classifier returned an unusable category: {0}")]
    InvalidCategory(String),

    #[error("classifier did not answer within {0:?}")]
    Timeout(Duration),
}

/// Synchronous failures of [`crate::speech::SpeechEngine::start`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("speech recognition is not supported")]
    Unsupported,

    #[error("failed to start recognition: {0}")]
    Start(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("failed to load clip: {0}")]
    Load(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("clip was not ready within {0:?}")]
    NotReady(Duration),
}

/// The session loop is gone; commands can no longer be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session loop has stopped")]
pub struct SessionClosed;
