//! The session loop.
//!
//! One task owns a [`SessionController`] and folds every [`SessionInput`]
//! from a single inbox, in arrival order. Timers, engines, media elements
//! and classification calls only ever post back into that inbox, so no
//! session state is shared or locked.

use crate::Callback;
use crate::classifier::{Classification, IntentResolver};
use crate::clip::{ClipCatalog, ClipId};
use crate::config::SessionConfig;
use crate::error::{MediaError, SessionClosed};
use crate::machine::{ConversationEvent, Phase, TransitionResult, transition_checked};
use crate::media::{DisplayOutcome, MediaOutcome, MediaSignal, MediaSynchronizer, PlaybackElement};
use crate::speech::{CaptureMode, CaptureOutcome, CaptureSignal, SpeechCapture, SpeechEngine};
use crate::watchdog::{SilenceWatchdog, WatchdogSignal};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const UNSUPPORTED_MESSAGE: &str =
    "Speech recognition is not supported here. Type your message instead.";

#[derive(Debug)]
pub enum SessionInput {
    Start,
    Stop,
    /// Typed text, handled as a committed utterance.
    SubmitText(String),
    RetryPermission,
    DismissError,
    /// Acts as if the current clip finished playing.
    SimulateClipEnded,
    Shutdown,
    Capture(CaptureSignal),
    Watchdog(WatchdogSignal),
    Media(MediaSignal),
    Classified {
        ticket: u64,
        text: String,
        classification: Classification,
    },
}

/// Read-only view of the session, published after every input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub transcript: String,
    pub current_clip: ClipId,
    pub is_looping: bool,
    pub last_category: Option<ClipId>,
    pub error_message: Option<String>,
    pub permission_denied: bool,
    pub speech_supported: bool,
    pub last_summary: Option<String>,
    pub last_keyword_match: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        let (current_clip, is_looping) = Phase::Idle.default_clip();
        Self {
            phase: Phase::Idle,
            transcript: String::new(),
            current_clip,
            is_looping,
            last_category: None,
            error_message: None,
            permission_denied: false,
            speech_supported: true,
            last_summary: None,
            last_keyword_match: None,
        }
    }
}

/// Platform handles and policy for one session.
pub struct SessionParts {
    pub engine: Box<dyn SpeechEngine>,
    pub elements: [Box<dyn PlaybackElement>; 2],
    pub catalog: ClipCatalog,
    pub resolver: IntentResolver,
    pub config: SessionConfig,
}

pub struct SessionController {
    snapshot: SessionSnapshot,
    capture: SpeechCapture,
    watchdog: SilenceWatchdog,
    media: MediaSynchronizer,
    resolver: IntentResolver,
    inbox: mpsc::UnboundedSender<SessionInput>,
    published: watch::Sender<SessionSnapshot>,
    next_ticket: u64,
    classifying: Option<u64>,
}

fn forward<T, F>(inbox: &mpsc::UnboundedSender<SessionInput>, wrap: F) -> Callback<T>
where
    T: 'static,
    F: Fn(T) -> SessionInput + Send + Sync + 'static,
{
    let inbox = inbox.clone();
    Arc::new(move |value| {
        // The loop may already be gone during shutdown.
        let _ = inbox.send(wrap(value));
    })
}

impl SessionController {
    /// Builds the controller and requests the idle clip. Must be called
    /// inside a tokio runtime.
    pub fn new(
        parts: SessionParts,
    ) -> (Self, mpsc::UnboundedReceiver<SessionInput>, SessionHandle) {
        let SessionParts {
            engine,
            elements,
            catalog,
            resolver,
            config,
        } = parts;
        let (inbox, rx) = mpsc::unbounded_channel();

        let capture = SpeechCapture::new(engine, &config, forward(&inbox, SessionInput::Capture));
        let watchdog = SilenceWatchdog::new(
            config.silence_timeout,
            config.silence_repeat_threshold,
            forward(&inbox, SessionInput::Watchdog),
        );
        let media = MediaSynchronizer::new(
            elements,
            catalog,
            config.ready_timeout,
            forward(&inbox, SessionInput::Media),
        );

        let snapshot = SessionSnapshot {
            speech_supported: capture.is_supported(),
            ..SessionSnapshot::default()
        };
        let (published, watcher) = watch::channel(snapshot.clone());
        let handle = SessionHandle {
            inbox: inbox.clone(),
            snapshot: watcher,
        };

        let mut controller = Self {
            snapshot,
            capture,
            watchdog,
            media,
            resolver,
            inbox,
            published,
            next_ticket: 0,
            classifying: None,
        };
        controller.show_current();
        controller.publish();
        (controller, rx, handle)
    }

    /// Builds a controller and runs it on its own task.
    pub fn spawn(parts: SessionParts) -> (SessionHandle, JoinHandle<()>) {
        let (controller, rx, handle) = Self::new(parts);
        let task = tokio::spawn(controller.run(rx));
        (handle, task)
    }

    /// Folds inputs until [`SessionInput::Shutdown`] arrives.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionInput>) {
        info!("Session loop started");
        while let Some(input) = rx.recv().await {
            if self.handle(input).is_break() {
                break;
            }
        }
        info!("Session loop stopped");
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.phase
    }

    pub fn handle(&mut self, input: SessionInput) -> ControlFlow<()> {
        match input {
            SessionInput::Start => self.dispatch(ConversationEvent::StartRequested),
            SessionInput::Stop => self.dispatch(ConversationEvent::StopRequested),
            SessionInput::SubmitText(text) => self.submit_text(text),
            SessionInput::RetryPermission => self.retry_permission(),
            SessionInput::DismissError => self.snapshot.error_message = None,
            SessionInput::SimulateClipEnded => self.dispatch(ConversationEvent::ClipPlaybackEnded),
            SessionInput::Shutdown => {
                self.capture.disarm();
                self.watchdog.stop();
                self.classifying = None;
                return ControlFlow::Break(());
            }
            SessionInput::Capture(signal) => {
                if let Some(outcome) = self.capture.on_signal(signal) {
                    self.on_capture(outcome);
                }
            }
            SessionInput::Watchdog(signal) => {
                if let Some(repeated) = self.watchdog.acknowledge(signal) {
                    info!(repeated, "Silence elapsed");
                    self.dispatch(ConversationEvent::SilenceElapsed);
                }
            }
            SessionInput::Media(signal) => {
                if let Some(outcome) = self.media.on_signal(signal) {
                    self.on_media(outcome);
                }
            }
            SessionInput::Classified {
                ticket,
                text,
                classification,
            } => self.on_classified(ticket, text, classification),
        }
        self.publish();
        ControlFlow::Continue(())
    }

    fn publish(&self) {
        let snapshot = &self.snapshot;
        self.published.send_if_modified(|current| {
            if current == snapshot {
                return false;
            }
            *current = snapshot.clone();
            true
        });
    }

    fn dispatch(&mut self, event: ConversationEvent) {
        let phase = self.snapshot.phase;
        match transition_checked(phase, &event) {
            Some(result) => self.apply(result),
            None => debug!(%phase, ?event, "Event has no effect"),
        }
    }

    fn apply(&mut self, result: TransitionResult) {
        let previous = self.snapshot.phase;
        self.snapshot.phase = result.phase;
        if let Some(clip) = result.clip {
            self.snapshot.current_clip = clip;
        }
        if let Some(looping) = result.looping {
            self.snapshot.is_looping = looping;
        }
        if previous != result.phase {
            info!(from = %previous, to = %result.phase, clip = %self.snapshot.current_clip, "Phase changed");
        }

        if !self.mic_open() && self.classifying.take().is_some() {
            debug!("Dropping in-flight classification");
        }
        self.sync_capture();
        self.show_current();
    }

    /// Whether speech should currently be accepted.
    fn mic_open(&self) -> bool {
        match self.snapshot.phase {
            Phase::Listening => true,
            Phase::Responding => self.snapshot.current_clip == ClipId::Prompt,
            _ => false,
        }
    }

    fn can_hear(&self) -> bool {
        self.snapshot.speech_supported && !self.snapshot.permission_denied
    }

    fn sync_capture(&mut self) {
        self.watchdog.stop();
        if self.snapshot.phase == Phase::Responding && self.mic_open() {
            if self.classifying.is_none() {
                let outcome = self.capture.arm(CaptureMode::Prompt);
                self.on_capture_opt(outcome);
            }
            return;
        }

        // Listening capture is armed once the listening clip is live.
        self.capture.disarm();
        if self.classifying.is_none() {
            self.snapshot.transcript.clear();
        }
    }

    fn show_current(&mut self) {
        let clip = self.snapshot.current_clip;
        match self.media.display(clip, self.snapshot.is_looping) {
            Ok(DisplayOutcome::Resumed) => self.on_clip_live(clip),
            Ok(DisplayOutcome::Started) | Ok(DisplayOutcome::Dropped) => {}
            Err(e) => self.surface_media_error(clip, &e),
        }
    }

    fn on_clip_live(&mut self, clip: ClipId) {
        if self.snapshot.phase != Phase::Listening || clip != ClipId::Listening {
            return;
        }
        if self.classifying.is_some() {
            return;
        }
        let outcome = self.capture.arm(CaptureMode::Listening);
        if self.can_hear() {
            self.watchdog.start();
        }
        self.on_capture_opt(outcome);
    }

    fn on_media(&mut self, outcome: MediaOutcome) {
        match outcome {
            MediaOutcome::Live(clip) if clip != self.snapshot.current_clip => {
                debug!(%clip, wanted = %self.snapshot.current_clip, "Stale clip went live, re-syncing");
                self.show_current();
            }
            MediaOutcome::Live(clip) => self.on_clip_live(clip),
            MediaOutcome::Ended(clip) => {
                if clip == self.snapshot.current_clip {
                    self.dispatch(ConversationEvent::ClipPlaybackEnded);
                } else {
                    debug!(%clip, "Ignoring end of a clip that is no longer current");
                }
            }
            MediaOutcome::Failed { clip, error } => {
                self.surface_media_error(clip, &error);
                if clip != self.snapshot.current_clip {
                    self.show_current();
                } else if !self.snapshot.is_looping {
                    self.dispatch(ConversationEvent::ClipPlaybackEnded);
                } else {
                    self.on_clip_live(clip);
                }
            }
        }
    }

    fn surface_media_error(&mut self, clip: ClipId, error: &MediaError) {
        let locator = self.media.catalog().locator(clip);
        error!(%clip, "{}", error);
        self.snapshot.error_message =
            Some(format!("Missing or failed to load video: {locator} ({error})"));
    }

    fn on_capture_opt(&mut self, outcome: Option<CaptureOutcome>) {
        if let Some(outcome) = outcome {
            self.on_capture(outcome);
        }
    }

    fn on_capture(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Activity { transcript } => {
                self.snapshot.transcript = transcript;
                self.watchdog.reset();
            }
            CaptureOutcome::Utterance {
                text,
                during_prompt,
            } => {
                debug!(during_prompt, "Classifying utterance");
                self.watchdog.stop();
                self.classify(text);
            }
            CaptureOutcome::PermissionDenied { message } => {
                error!("{}", message);
                self.watchdog.stop();
                self.snapshot.permission_denied = true;
                self.snapshot.error_message = Some(message);
                self.dispatch(ConversationEvent::MicPermissionDenied);
            }
            CaptureOutcome::Silence { reason } => {
                info!(?reason, "Capture degraded to silence");
                self.dispatch(ConversationEvent::SilenceElapsed);
            }
            CaptureOutcome::Failed { message } => {
                warn!("{}", message);
                self.dispatch(ConversationEvent::SpeechFailed);
            }
            CaptureOutcome::Unsupported => {
                if self.snapshot.speech_supported {
                    warn!("Speech recognition unsupported");
                }
                self.watchdog.stop();
                self.snapshot.speech_supported = false;
                self.snapshot.error_message = Some(UNSUPPORTED_MESSAGE.to_string());
            }
        }
    }

    fn submit_text(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if !self.mic_open() {
            debug!(phase = %self.snapshot.phase, "Ignoring typed text, not listening");
            return;
        }
        if self.classifying.is_some() {
            debug!("Ignoring typed text, an utterance is being classified");
            return;
        }
        self.capture.disarm();
        self.watchdog.stop();
        self.classify(text);
    }

    fn classify(&mut self, text: String) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.classifying = Some(ticket);
        self.snapshot.transcript = text.clone();

        let resolver = self.resolver.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let classification = resolver.resolve(&text).await;
            let _ = inbox.send(SessionInput::Classified {
                ticket,
                text,
                classification,
            });
        });
    }

    fn on_classified(&mut self, ticket: u64, text: String, classification: Classification) {
        if self.classifying != Some(ticket) {
            debug!(ticket, "Dropping stale classification");
            return;
        }
        self.classifying = None;

        let category = classification.category;
        info!(
            %category,
            source = ?classification.source,
            about = category.description(),
            "Utterance classified"
        );
        self.snapshot.last_category = Some(category);
        self.snapshot.last_summary = classification.summary;
        self.snapshot.last_keyword_match = classification.matched_keyword;

        let event = match self.snapshot.phase {
            Phase::Listening => ConversationEvent::SpeechResolved {
                text,
                category: Some(category),
            },
            Phase::Responding => ConversationEvent::SpeechResolvedDuringPrompt {
                text,
                category: Some(category),
            },
            phase => {
                debug!(%phase, "Classification arrived outside a listening phase");
                return;
            }
        };
        self.dispatch(event);
    }

    fn retry_permission(&mut self) {
        self.snapshot.permission_denied = false;
        self.snapshot.error_message = None;
        let outcome = self.capture.retry_permission();
        let listening_live = self.snapshot.phase == Phase::Listening
            && self.media.displayed_clip() == Some(ClipId::Listening)
            && !self.media.is_switching();
        if listening_live && self.classifying.is_none() {
            self.on_clip_live(ClipId::Listening);
        }
        self.on_capture_opt(outcome);
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("snapshot", &self.snapshot)
            .field("capture", &self.capture)
            .field("media", &self.media)
            .field("classifying", &self.classifying)
            .finish()
    }
}

/// Cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<SessionInput>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn send(&self, input: SessionInput) -> Result<(), SessionClosed> {
        self.inbox.send(input).map_err(|_| SessionClosed)
    }

    pub fn start(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::Start)
    }

    pub fn stop(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::Stop)
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionInput::SubmitText(text.into()))
    }

    pub fn retry_permission(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::RetryPermission)
    }

    pub fn dismiss_error(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::DismissError)
    }

    pub fn simulate_clip_ended(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::SimulateClipEnded)
    }

    pub fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(SessionInput::Shutdown)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}
