//! The conversation transition table.
//!
//! Pure functions only: no timers, engines or I/O. The session controller
//! folds every event through [`transition_checked`] one at a time.

use crate::classifier::classify_local;
use crate::clip::ClipId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Greeting,
    Listening,
    Responding,
    Goodbye,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Idle,
        Phase::Greeting,
        Phase::Listening,
        Phase::Responding,
        Phase::Goodbye,
    ];

    /// Canonical clip for the phase and whether it loops.
    pub fn default_clip(self) -> (ClipId, bool) {
        match self {
            Phase::Idle => (ClipId::Idle, true),
            Phase::Greeting => (ClipId::Greeting, false),
            Phase::Listening => (ClipId::Listening, true),
            Phase::Responding => (ClipId::General, false),
            Phase::Goodbye => (ClipId::Goodbye, false),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Greeting => "greeting",
            Phase::Listening => "listening",
            Phase::Responding => "responding",
            Phase::Goodbye => "goodbye",
        };
        f.write_str(name)
    }
}

/// Everything that can move the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    StartRequested,
    ClipPlaybackEnded,
    /// A committed utterance while listening. Without a category the text
    /// is classified locally.
    SpeechResolved {
        text: String,
        category: Option<ClipId>,
    },
    /// A committed utterance while the silence prompt was on screen.
    SpeechResolvedDuringPrompt {
        text: String,
        category: Option<ClipId>,
    },
    SpeechFailed,
    MicPermissionDenied,
    SilenceElapsed,
    StopRequested,
}

/// `clip` and `looping` are `None` when the transition leaves them as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionResult {
    pub phase: Phase,
    pub clip: Option<ClipId>,
    pub looping: Option<bool>,
}

impl TransitionResult {
    fn play(phase: Phase, clip: ClipId, looping: bool) -> Self {
        Self {
            phase,
            clip: Some(clip),
            looping: Some(looping),
        }
    }

    /// The no-op answer: same phase, canonical clip.
    pub fn echo(phase: Phase) -> Self {
        let (clip, looping) = phase.default_clip();
        Self::play(phase, clip, looping)
    }
}

fn respond_to(text: &str, category: Option<ClipId>) -> TransitionResult {
    let category = category
        .filter(|c| c.is_response())
        .unwrap_or_else(|| classify_local(text).category);

    if category == ClipId::Goodbye {
        TransitionResult::play(Phase::Goodbye, ClipId::Goodbye, false)
    } else {
        TransitionResult::play(Phase::Responding, category, false)
    }
}

/// Applies the transition table. Returns `None` for combinations the table
/// does not define.
pub fn transition_checked(phase: Phase, event: &ConversationEvent) -> Option<TransitionResult> {
    use ConversationEvent as E;

    let result = match (phase, event) {
        (_, E::StopRequested) => TransitionResult::play(Phase::Goodbye, ClipId::Goodbye, false),
        (Phase::Idle, E::StartRequested) => {
            TransitionResult::play(Phase::Greeting, ClipId::Greeting, false)
        }
        (Phase::Greeting | Phase::Responding, E::ClipPlaybackEnded) => {
            TransitionResult::play(Phase::Listening, ClipId::Listening, true)
        }
        (Phase::Goodbye, E::ClipPlaybackEnded) => {
            TransitionResult::play(Phase::Idle, ClipId::Idle, true)
        }
        (Phase::Listening, E::SpeechResolved { text, category })
        | (Phase::Responding, E::SpeechResolvedDuringPrompt { text, category }) => {
            respond_to(text, *category)
        }
        (Phase::Listening, E::SpeechFailed) => {
            TransitionResult::play(Phase::Responding, ClipId::Fallback, false)
        }
        (Phase::Listening, E::SilenceElapsed) => {
            TransitionResult::play(Phase::Responding, ClipId::Prompt, false)
        }
        _ => return None,
    };
    Some(result)
}

/// Total form of the table: undefined combinations echo the current phase
/// with its canonical clip.
pub fn transition(phase: Phase, event: &ConversationEvent) -> TransitionResult {
    transition_checked(phase, event).unwrap_or_else(|| TransitionResult::echo(phase))
}
