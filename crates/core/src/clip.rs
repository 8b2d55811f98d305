use crate::error::UnknownClip;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifier of a playable clip.
///
/// Response categories and clips are the same closed set: every category the
/// classifier can produce plays the clip of the same name. `Idle`,
/// `Listening` and `Prompt` are bound to phases and are never classifier
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipId {
    Idle,
    Greeting,
    Listening,
    Prompt,
    Goodbye,
    EasterEgg,
    Weather,
    #[serde(alias = "general_response")]
    General,
    Fallback,
}

impl ClipId {
    pub const ALL: [ClipId; 9] = [
        ClipId::Idle,
        ClipId::Greeting,
        ClipId::Listening,
        ClipId::Prompt,
        ClipId::Goodbye,
        ClipId::EasterEgg,
        ClipId::Weather,
        ClipId::General,
        ClipId::Fallback,
    ];

    /// Clips a classifier is allowed to return.
    pub const RESPONSES: [ClipId; 6] = [
        ClipId::Goodbye,
        ClipId::EasterEgg,
        ClipId::Weather,
        ClipId::Greeting,
        ClipId::General,
        ClipId::Fallback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClipId::Idle => "idle",
            ClipId::Greeting => "greeting",
            ClipId::Listening => "listening",
            ClipId::Prompt => "prompt",
            ClipId::Goodbye => "goodbye",
            ClipId::EasterEgg => "easter_egg",
            ClipId::Weather => "weather",
            ClipId::General => "general",
            ClipId::Fallback => "fallback",
        }
    }

    /// Media file stem. Differs from [`ClipId::as_str`] only for `General`,
    /// whose asset predates the category name.
    pub fn file_stem(self) -> &'static str {
        match self {
            ClipId::General => "general_response",
            other => other.as_str(),
        }
    }

    pub fn is_response(self) -> bool {
        Self::RESPONSES.contains(&self)
    }

    pub fn description(self) -> &'static str {
        match self {
            ClipId::Idle => "Resting loop shown while no conversation is running.",
            ClipId::Greeting => "Played once when a conversation starts.",
            ClipId::Listening => "Attentive loop shown while the user speaks.",
            ClipId::Prompt => "Asks whether the user is still there after a silence.",
            ClipId::Goodbye => {
                "User is ending the conversation: goodbye, see you, take care, I'm leaving."
            }
            ClipId::EasterEgg => {
                "User talks about jobs, applying for a job, careers, hiring or a specific position."
            }
            ClipId::Weather => {
                "User asks about weather, forecast, temperature or conditions like rain or sun."
            }
            ClipId::General => "Small talk, greetings and anything that fits no other response.",
            ClipId::Fallback => "The message was unclear, off-topic or not understandable.",
        }
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClipId {
    type Err = UnknownClip;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ClipId::ALL
            .into_iter()
            .find(|clip| clip.as_str() == wanted || clip.file_stem() == wanted)
            .ok_or_else(|| UnknownClip(s.to_string()))
    }
}

/// Maps clips to media locators (`{base}/{stem}.mp4`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipCatalog {
    base: String,
}

impl ClipCatalog {
    pub const DEFAULT_BASE: &'static str = "/video_files";

    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let trimmed = base.trim_end_matches('/');
        Self {
            base: trimmed.to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn locator(&self, clip: ClipId) -> String {
        format!("{}/{}.mp4", self.base, clip.file_stem())
    }

    /// Returns the expected files under `dir` that do not exist.
    pub fn missing_files(dir: &Path) -> Vec<PathBuf> {
        ClipId::ALL
            .into_iter()
            .map(|clip| dir.join(format!("{}.mp4", clip.file_stem())))
            .filter(|path| !path.is_file())
            .collect()
    }
}

impl Default for ClipCatalog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}
