//! Phrase tables for the local intent matcher.
//!
//! Tables are matched as substrings of the normalized utterance, in the order
//! of [`PRIORITY`].

use crate::clip::ClipId;

pub const GOODBYE: &[&str] = &[
    "goodbye",
    "see you again",
    "bye-bye",
    "bye",
    "take care",
    "see you later",
    "see you",
    "farewell",
    "have a good one",
    "catch you later",
    "gotta go",
    "i'm leaving",
    "talk later",
    "until next time",
    "good night",
    "so long",
    "later",
];

pub const EASTER_EGG: &[&str] = &[
    "applying for job",
    "job position",
    "job",
    "jobs",
    "career",
    "hiring",
    "apply",
    "application",
    "position",
    "vacancy",
    "work here",
    "employment",
    "recruit",
    "interview",
];

pub const WEATHER: &[&str] = &[
    "weather",
    "forecast",
    "temperature",
    "rain",
    "raining",
    "sunny",
    "snow",
    "cold",
    "hot",
    "degrees",
    "climate",
    "outside",
];

pub const GREETING: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    "nice to meet you",
];

pub const GENERAL: &[&str] = &[
    "how are you",
    "what's up",
    "how do you do",
    "how's it going",
    "tell me",
    "who are you",
    "what can you do",
    "thank",
];

/// Phrases that explicitly mean "I didn't get that". They resolve to the
/// same clip as no match at all, but are reported as the matched keyword.
pub const FALLBACK: &[&str] = &[
    "i don't know",
    "never mind",
    "nevermind",
    "pardon",
    "sorry",
    "huh",
    "what",
];

pub const PRIORITY: [(ClipId, &[&str]); 5] = [
    (ClipId::Goodbye, GOODBYE),
    (ClipId::EasterEgg, EASTER_EGG),
    (ClipId::Weather, WEATHER),
    (ClipId::Greeting, GREETING),
    (ClipId::General, GENERAL),
];
