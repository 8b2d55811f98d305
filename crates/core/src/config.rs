use std::time::Duration;

/// Timing and policy knobs for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Quiet period after which the watchdog fires (default: 9s)
    pub silence_timeout: Duration,

    /// Consecutive elapses before the watchdog flags a repeat (default: 2).
    /// The flag is reported but never ends a session.
    pub silence_repeat_threshold: u32,

    /// Pause after the last speech fragment before an utterance is committed (default: 1.5s)
    pub finalize_delay: Duration,

    /// Delay before restarting an engine that ended on its own (default: 250ms)
    pub restart_delay: Duration,

    /// Automatic restarts allowed per window (default: 5 per 30s)
    pub max_restarts: u32,
    pub restart_window: Duration,

    /// Staged retry delays after network errors; its length is the attempt ceiling.
    pub network_backoff: Vec<Duration>,

    /// Upper bound on a remote classification round trip (default: 8s)
    pub remote_timeout: Duration,

    /// Upper bound on waiting for a clip to become playable (default: 10s)
    pub ready_timeout: Duration,

    pub speech_lang: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_timeout: Duration::from_secs(9),
            silence_repeat_threshold: 2,
            finalize_delay: Duration::from_millis(1500),
            restart_delay: Duration::from_millis(250),
            max_restarts: 5,
            restart_window: Duration::from_secs(30),
            network_backoff: vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
            remote_timeout: Duration::from_secs(8),
            ready_timeout: Duration::from_secs(10),
            speech_lang: "en-US".to_string(),
        }
    }
}
