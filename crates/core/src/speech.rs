//! Speech capture lifecycle around a push-based recognition engine.
//!
//! [`SpeechCapture`] owns the engine, the utterance buffer, the finalization
//! debounce and the restart budget. Everything it hears comes back through
//! one [`Callback`] as a [`CaptureSignal`]; the owner feeds those signals to
//! [`SpeechCapture::on_signal`] and acts on the returned [`CaptureOutcome`].

use crate::Callback;
use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::timer::Timer;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a recognition engine pushes while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    Interim(String),
    Final(String),
    Error(EngineErrorCode),
    /// The engine stopped, on request or on its own.
    End,
}

pub type EngineSink = Callback<EngineSignal>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorCode {
    NotAllowed,
    NoSpeech,
    NoMatch,
    Aborted,
    Network,
    AudioCapture,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Terminal until the user retries.
    Permission,
    /// Treated like the watchdog elapsing.
    Silence,
    /// Speech was heard but not understood.
    Unrecognized,
    /// Retried on a fixed backoff.
    Network,
    /// Restarted within the budget.
    Transient,
}

impl EngineErrorCode {
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            "no-speech" => Self::NoSpeech,
            "no-match" => Self::NoMatch,
            "aborted" => Self::Aborted,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotAllowed => ErrorClass::Permission,
            Self::NoSpeech => ErrorClass::Silence,
            Self::NoMatch => ErrorClass::Unrecognized,
            Self::Network => ErrorClass::Network,
            Self::Aborted | Self::AudioCapture | Self::Other(_) => ErrorClass::Transient,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotAllowed => {
                "Microphone access was denied. Allow microphone access and retry.".to_string()
            }
            Self::NoSpeech => "No speech was detected.".to_string(),
            Self::NoMatch => "Speech was heard but could not be recognized.".to_string(),
            Self::Aborted => "Speech recognition was interrupted.".to_string(),
            Self::Network => "Speech recognition lost its network connection.".to_string(),
            Self::AudioCapture => "No microphone was found.".to_string(),
            Self::Other(code) => format!("Speech recognition error: {code}"),
        }
    }
}

/// A platform speech recognizer.
///
/// `start` must not be called while a previous run is still live;
/// [`SpeechCapture`] guarantees this.
pub trait SpeechEngine: Send {
    fn is_supported(&self) -> bool {
        true
    }

    fn set_lang(&mut self, lang: &str);

    fn start(&mut self, sink: EngineSink) -> Result<(), EngineError>;

    /// Graceful stop. The engine may still emit `End`; [`SpeechCapture`]
    /// ignores anything the stopped run sends afterwards.
    fn stop(&mut self);

    /// Immediate stop. No further signals are expected from the run.
    fn abort(&mut self);
}

/// Signals delivered through the capture callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSignal {
    Engine { run: u64, signal: EngineSignal },
    FinalizeElapsed { generation: u64 },
    RestartElapsed { generation: u64 },
}

/// Which gate is open. `Prompt` tags commits as spoken over the silence prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Listening,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceReason {
    NoSpeech,
    Network,
    RestartBudget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// New speech arrived. `transcript` is the running utterance.
    Activity { transcript: String },
    Utterance { text: String, during_prompt: bool },
    PermissionDenied { message: String },
    Silence { reason: SilenceReason },
    Failed { message: String },
    Unsupported,
}

/// Sliding-window limit on automatic restarts.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    max: u32,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl RestartBudget {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            recent: VecDeque::new(),
        }
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        if self.recent.len() >= self.max as usize {
            return false;
        }
        self.recent.push_back(now);
        true
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

pub struct SpeechCapture {
    engine: Box<dyn SpeechEngine>,
    callback: Callback<CaptureSignal>,
    finalize_delay: Duration,
    restart_delay: Duration,
    network_backoff: Vec<Duration>,

    mode: Option<CaptureMode>,
    desired: bool,
    started: bool,
    run: u64,
    permission_denied: bool,
    hold_restart: bool,
    network_attempts: usize,

    buffer: String,
    interim: String,

    finalize: Timer,
    restart: Timer,
    budget: RestartBudget,
}

impl SpeechCapture {
    pub fn new(
        mut engine: Box<dyn SpeechEngine>,
        config: &SessionConfig,
        callback: Callback<CaptureSignal>,
    ) -> Self {
        engine.set_lang(&config.speech_lang);
        Self {
            engine,
            callback,
            finalize_delay: config.finalize_delay,
            restart_delay: config.restart_delay,
            network_backoff: config.network_backoff.clone(),
            mode: None,
            desired: false,
            started: false,
            run: 0,
            permission_denied: false,
            hold_restart: false,
            network_attempts: 0,
            buffer: String::new(),
            interim: String::new(),
            finalize: Timer::default(),
            restart: Timer::default(),
            budget: RestartBudget::new(config.max_restarts, config.restart_window),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_supported()
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.mode
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_permission_denied(&self) -> bool {
        self.permission_denied
    }

    /// Committed segments plus the current interim, space-joined.
    pub fn transcript(&self) -> String {
        join_words(&self.buffer, &self.interim)
    }

    /// Opens the gate and makes sure the engine is running.
    pub fn arm(&mut self, mode: CaptureMode) -> Option<CaptureOutcome> {
        if self.mode != Some(mode) {
            debug!(?mode, "Capture gate opened");
        }
        if !self.desired {
            self.budget.reset();
            self.network_attempts = 0;
        }
        self.mode = Some(mode);
        self.desired = true;
        self.hold_restart = false;
        self.restart.cancel();
        self.ensure_started()
    }

    /// Closes the gate, stops the engine and drops any partial utterance.
    pub fn disarm(&mut self) {
        self.mode = None;
        self.desired = false;
        self.hold_restart = false;
        self.finalize.cancel();
        self.restart.cancel();
        self.buffer.clear();
        self.interim.clear();
        self.halt_engine(false);
    }

    pub fn retry_permission(&mut self) -> Option<CaptureOutcome> {
        self.permission_denied = false;
        self.budget.reset();
        self.network_attempts = 0;
        let mode = self.mode?;
        info!("Retrying microphone permission");
        self.arm(mode)
    }

    pub fn on_signal(&mut self, signal: CaptureSignal) -> Option<CaptureOutcome> {
        match signal {
            CaptureSignal::Engine { run, signal } => {
                if run != self.run {
                    debug!(run, current = self.run, "Dropping signal from a finished engine run");
                    return None;
                }
                self.on_engine(signal)
            }
            CaptureSignal::FinalizeElapsed { generation } => {
                if !self.finalize.acknowledge(generation) {
                    return None;
                }
                self.commit()
            }
            CaptureSignal::RestartElapsed { generation } => {
                if !self.restart.acknowledge(generation) {
                    return None;
                }
                if !self.desired || self.mode.is_none() {
                    return None;
                }
                self.ensure_started()
            }
        }
    }

    fn on_engine(&mut self, signal: EngineSignal) -> Option<CaptureOutcome> {
        match signal {
            EngineSignal::Interim(text) => {
                self.interim = text.trim().to_string();
                self.heard()
            }
            EngineSignal::Final(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !self.buffer.is_empty() {
                        self.buffer.push(' ');
                    }
                    self.buffer.push_str(text);
                }
                self.interim.clear();
                self.heard()
            }
            EngineSignal::Error(code) => self.on_error(code),
            EngineSignal::End => {
                self.started = false;
                self.run += 1;
                if !self.desired || self.mode.is_none() {
                    return None;
                }
                if self.hold_restart {
                    self.hold_restart = false;
                    debug!("Engine ended after silence, waiting to be re-armed");
                    return None;
                }
                self.restart_or_degrade()
            }
        }
    }

    fn heard(&mut self) -> Option<CaptureOutcome> {
        self.network_attempts = 0;
        self.finalize.schedule(self.finalize_delay, &self.callback, |generation| {
            CaptureSignal::FinalizeElapsed { generation }
        });
        Some(CaptureOutcome::Activity {
            transcript: self.transcript(),
        })
    }

    fn on_error(&mut self, code: EngineErrorCode) -> Option<CaptureOutcome> {
        match code.class() {
            ErrorClass::Permission => {
                warn!("Microphone permission denied");
                self.permission_denied = true;
                self.desired = false;
                self.finalize.cancel();
                self.restart.cancel();
                self.halt_engine(false);
                Some(CaptureOutcome::PermissionDenied {
                    message: code.message(),
                })
            }
            ErrorClass::Silence => {
                debug!("Engine reported no speech");
                self.hold_restart = true;
                Some(CaptureOutcome::Silence {
                    reason: SilenceReason::NoSpeech,
                })
            }
            ErrorClass::Unrecognized => Some(CaptureOutcome::Failed {
                message: code.message(),
            }),
            ErrorClass::Network => {
                self.halt_engine(false);
                let Some(&delay) = self.network_backoff.get(self.network_attempts) else {
                    warn!(
                        attempts = self.network_attempts,
                        "Speech network retries exhausted"
                    );
                    return Some(CaptureOutcome::Silence {
                        reason: SilenceReason::Network,
                    });
                };
                self.network_attempts += 1;
                warn!(
                    attempt = self.network_attempts,
                    ?delay,
                    "Speech network error, retrying"
                );
                self.schedule_restart(delay);
                None
            }
            ErrorClass::Transient => {
                warn!("{}", code.message());
                None
            }
        }
    }

    fn restart_or_degrade(&mut self) -> Option<CaptureOutcome> {
        if self.budget.try_acquire(Instant::now()) {
            debug!(delay = ?self.restart_delay, "Engine ended unexpectedly, restarting");
            self.schedule_restart(self.restart_delay);
            None
        } else {
            warn!("Engine restart budget exhausted");
            Some(CaptureOutcome::Silence {
                reason: SilenceReason::RestartBudget,
            })
        }
    }

    fn schedule_restart(&mut self, delay: Duration) {
        self.restart.schedule(delay, &self.callback, |generation| {
            CaptureSignal::RestartElapsed { generation }
        });
    }

    fn ensure_started(&mut self) -> Option<CaptureOutcome> {
        if self.started {
            debug!("Engine already started");
            return None;
        }
        if self.permission_denied {
            debug!("Not starting engine, permission was denied");
            return None;
        }
        if !self.engine.is_supported() {
            return Some(CaptureOutcome::Unsupported);
        }

        self.run += 1;
        let run = self.run;
        let callback = self.callback.clone();
        let sink: EngineSink = Arc::new(move |signal| {
            callback(CaptureSignal::Engine { run, signal });
        });

        match self.engine.start(sink) {
            Ok(()) => {
                debug!(run, "Engine started");
                self.started = true;
                None
            }
            Err(EngineError::Unsupported) => Some(CaptureOutcome::Unsupported),
            Err(e) => {
                warn!("{}", e);
                self.restart_or_degrade()
            }
        }
    }

    fn commit(&mut self) -> Option<CaptureOutcome> {
        let text = self.transcript();
        self.buffer.clear();
        self.interim.clear();

        let Some(mode) = self.mode else {
            debug!("Dropping utterance, capture gate is closed");
            return None;
        };
        if text.is_empty() {
            return None;
        }

        self.desired = false;
        self.halt_engine(true);
        info!(%text, "Utterance committed");
        Some(CaptureOutcome::Utterance {
            text,
            during_prompt: mode == CaptureMode::Prompt,
        })
    }

    /// Stops the current run and invalidates its remaining signals.
    fn halt_engine(&mut self, graceful: bool) {
        if self.started {
            if graceful {
                self.engine.stop();
            } else {
                self.engine.abort();
            }
        }
        self.started = false;
        self.run += 1;
    }
}

impl std::fmt::Debug for SpeechCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCapture")
            .field("mode", &self.mode)
            .field("started", &self.started)
            .field("run", &self.run)
            .field("permission_denied", &self.permission_denied)
            .finish()
    }
}

fn join_words(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}
