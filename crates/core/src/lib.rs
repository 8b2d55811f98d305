//! Conversation orchestration for a talking-avatar loop.
//!
//! The crate is organised leaf-first: [`clip`] and [`classifier`] are pure,
//! [`machine`] is the pure transition table, [`watchdog`], [`speech`] and
//! [`media`] own their timers and platform handles, and [`session`] is the
//! single serialized loop that glues them together.

pub mod classifier;
pub mod clip;
pub mod config;
pub mod error;
pub mod keywords;
pub mod machine;
pub mod media;
pub mod remote;
pub mod session;
pub mod speech;
pub mod watchdog;

mod timer;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

pub use classifier::{Classification, ClassificationSource, IntentResolver, classify_local};
pub use clip::{ClipCatalog, ClipId};
pub use config::SessionConfig;
pub use error::SessionClosed;
pub use machine::{ConversationEvent, Phase, TransitionResult, transition, transition_checked};
pub use session::{SessionController, SessionHandle, SessionInput, SessionParts, SessionSnapshot};

/// Outward callback used by every stateful component.
///
/// Components never call each other directly. Each one reports through a
/// single callback, and the session loop is the only subscriber.
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;
