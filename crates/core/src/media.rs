//! Dual-buffer clip playback.
//!
//! Two playback elements alternate: one is visible, the other is loaded with
//! the next clip and only revealed once it reported ready and started
//! playing. The previously visible element is then paused and rewound.

use crate::Callback;
use crate::clip::{ClipCatalog, ClipId};
use crate::error::MediaError;
use crate::timer::Timer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::Primary => Slot::Secondary,
            Slot::Secondary => Slot::Primary,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Secondary => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSignal {
    /// Enough data is buffered to start playing.
    Ready,
    Error(String),
    /// A non-looping clip reached its end.
    Ended,
}

pub type ElementSink = Callback<ElementSignal>;

/// A platform video element.
pub trait PlaybackElement: Send {
    /// Starts loading `locator`. Readiness and failures are reported through
    /// `sink`, which replaces the sink of any previous load.
    fn load(&mut self, locator: &str, looping: bool, sink: ElementSink);

    fn play(&mut self) -> Result<(), MediaError>;

    fn pause(&mut self);

    fn rewind(&mut self);

    fn is_paused(&self) -> bool;

    fn set_visible(&mut self, visible: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSignal {
    Element {
        slot: Slot,
        seq: u64,
        signal: ElementSignal,
    },
    ReadyTimeout {
        generation: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    /// The clip was already on screen.
    Resumed,
    /// A switch to the clip began; expect `Live` or `Failed`.
    Started,
    /// Another switch is in flight.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Live(ClipId),
    Ended(ClipId),
    Failed { clip: ClipId, error: MediaError },
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    slot: Slot,
    clip: ClipId,
    looping: bool,
}

pub struct MediaSynchronizer {
    elements: [Box<dyn PlaybackElement>; 2],
    seq: [u64; 2],
    catalog: ClipCatalog,
    callback: Callback<MediaSignal>,
    visible: Slot,
    shown: Option<(ClipId, bool)>,
    pending: Option<Pending>,
    ready_timer: Timer,
    ready_timeout: Duration,
}

impl MediaSynchronizer {
    pub fn new(
        mut elements: [Box<dyn PlaybackElement>; 2],
        catalog: ClipCatalog,
        ready_timeout: Duration,
        callback: Callback<MediaSignal>,
    ) -> Self {
        for element in elements.iter_mut() {
            element.set_visible(false);
        }
        Self {
            elements,
            seq: [0; 2],
            catalog,
            callback,
            visible: Slot::Primary,
            shown: None,
            pending: None,
            ready_timer: Timer::default(),
            ready_timeout,
        }
    }

    pub fn visible_slot(&self) -> Slot {
        self.visible
    }

    pub fn displayed_clip(&self) -> Option<ClipId> {
        self.shown.map(|(clip, _)| clip)
    }

    pub fn is_switching(&self) -> bool {
        self.pending.is_some()
    }

    pub fn catalog(&self) -> &ClipCatalog {
        &self.catalog
    }

    pub fn display(&mut self, clip: ClipId, looping: bool) -> Result<DisplayOutcome, MediaError> {
        if let Some(pending) = self.pending {
            debug!(requested = %clip, in_flight = %pending.clip, "Clip switch in flight, dropping request");
            return Ok(DisplayOutcome::Dropped);
        }

        if self.shown == Some((clip, looping)) {
            let element = &mut self.elements[self.visible.index()];
            if element.is_paused() {
                element.play()?;
            }
            return Ok(DisplayOutcome::Resumed);
        }

        let slot = self.visible.other();
        let seq = self.bump(slot);
        let locator = self.catalog.locator(clip);
        debug!(%clip, %locator, ?slot, "Loading clip into hidden buffer");

        let callback = self.callback.clone();
        let sink: ElementSink = Arc::new(move |signal| {
            callback(MediaSignal::Element { slot, seq, signal });
        });

        self.pending = Some(Pending {
            slot,
            clip,
            looping,
        });
        self.ready_timer
            .schedule(self.ready_timeout, &self.callback, |generation| {
                MediaSignal::ReadyTimeout { generation }
            });
        self.elements[slot.index()].load(&locator, looping, sink);
        Ok(DisplayOutcome::Started)
    }

    pub fn on_signal(&mut self, signal: MediaSignal) -> Option<MediaOutcome> {
        match signal {
            MediaSignal::ReadyTimeout { generation } => {
                if !self.ready_timer.acknowledge(generation) {
                    return None;
                }
                let pending = self.pending.take()?;
                self.bump(pending.slot);
                warn!(clip = %pending.clip, "Clip never became ready");
                Some(MediaOutcome::Failed {
                    clip: pending.clip,
                    error: MediaError::NotReady(self.ready_timeout),
                })
            }
            MediaSignal::Element { slot, seq, signal } => {
                if seq != self.seq[slot.index()] {
                    debug!(?slot, seq, ?signal, "Dropping signal from a superseded load");
                    return None;
                }
                self.on_element(slot, signal)
            }
        }
    }

    fn on_element(&mut self, slot: Slot, signal: ElementSignal) -> Option<MediaOutcome> {
        let pending = self.pending.filter(|p| p.slot == slot);

        match (signal, pending) {
            (ElementSignal::Ready, Some(pending)) => {
                self.pending = None;
                self.ready_timer.cancel();
                Some(self.reveal(pending))
            }
            (ElementSignal::Error(message), Some(pending)) => {
                self.pending = None;
                self.ready_timer.cancel();
                self.bump(slot);
                Some(MediaOutcome::Failed {
                    clip: pending.clip,
                    error: MediaError::Load(message),
                })
            }
            (ElementSignal::Error(message), None) if slot == self.visible => {
                let (clip, _) = self.shown?;
                Some(MediaOutcome::Failed {
                    clip,
                    error: MediaError::Playback(message),
                })
            }
            (ElementSignal::Ended, None) if slot == self.visible => match self.shown {
                Some((clip, false)) => Some(MediaOutcome::Ended(clip)),
                _ => None,
            },
            _ => None,
        }
    }

    fn reveal(&mut self, pending: Pending) -> MediaOutcome {
        let next = pending.slot;
        if let Err(error) = self.elements[next.index()].play() {
            self.bump(next);
            return MediaOutcome::Failed {
                clip: pending.clip,
                error,
            };
        }

        let previous = self.visible;
        self.elements[next.index()].set_visible(true);
        self.elements[previous.index()].set_visible(false);
        self.elements[previous.index()].pause();
        self.elements[previous.index()].rewind();
        self.bump(previous);

        self.visible = next;
        self.shown = Some((pending.clip, pending.looping));
        info!(clip = %pending.clip, looping = pending.looping, "Clip live");
        MediaOutcome::Live(pending.clip)
    }

    /// Starts a new load sequence on `slot`, invalidating its queued signals.
    fn bump(&mut self, slot: Slot) -> u64 {
        let seq = &mut self.seq[slot.index()];
        *seq = seq.wrapping_add(1);
        *seq
    }
}

impl std::fmt::Debug for MediaSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSynchronizer")
            .field("visible", &self.visible)
            .field("shown", &self.shown)
            .field("switching", &self.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeElement;
    use tokio::sync::mpsc;

    struct Rig {
        sync: MediaSynchronizer,
        elements: [FakeElement; 2],
        rx: mpsc::UnboundedReceiver<MediaSignal>,
    }

    impl Rig {
        fn new(auto_ready: bool) -> Self {
            let elements = [FakeElement::new(auto_ready), FakeElement::new(auto_ready)];
            let (tx, rx) = mpsc::unbounded_channel();
            let callback: Callback<MediaSignal> = Arc::new(move |signal| {
                let _ = tx.send(signal);
            });
            let sync = MediaSynchronizer::new(
                [Box::new(elements[0].clone()), Box::new(elements[1].clone())],
                ClipCatalog::new("/clips"),
                Duration::from_secs(10),
                callback,
            );
            Self { sync, elements, rx }
        }

        fn element(&self, slot: Slot) -> &FakeElement {
            &self.elements[slot.index()]
        }

        fn pump(&mut self) -> Vec<MediaOutcome> {
            let mut outcomes = Vec::new();
            while let Ok(signal) = self.rx.try_recv() {
                outcomes.extend(self.sync.on_signal(signal));
            }
            outcomes
        }

        fn show(&mut self, clip: ClipId, looping: bool) -> Vec<MediaOutcome> {
            assert_eq!(
                self.sync.display(clip, looping),
                Ok(DisplayOutcome::Started)
            );
            self.pump()
        }
    }

    #[tokio::test]
    async fn switch_reveals_only_after_ready() {
        let mut rig = Rig::new(false);
        assert_eq!(
            rig.sync.display(ClipId::Idle, true),
            Ok(DisplayOutcome::Started)
        );

        let hidden = rig.sync.visible_slot().other();
        assert_eq!(rig.element(hidden).probe().loads, vec![("/clips/idle.mp4".to_string(), true)]);
        assert!(rig.pump().is_empty());
        assert!(!rig.element(hidden).probe().visible);

        rig.element(hidden).emit(ElementSignal::Ready);
        assert_eq!(rig.pump(), vec![MediaOutcome::Live(ClipId::Idle)]);
        assert_eq!(rig.sync.visible_slot(), hidden);
        assert!(rig.element(hidden).probe().visible);
        assert!(!rig.element(hidden.other()).probe().visible);
        assert_eq!(rig.element(hidden.other()).probe().rewinds, 1);

        for element in &rig.elements {
            assert_eq!(element.probe().revealed_unready, 0);
        }
    }

    #[tokio::test]
    async fn load_error_keeps_the_visible_buffer() {
        let mut rig = Rig::new(true);
        assert_eq!(rig.show(ClipId::Listening, true), vec![MediaOutcome::Live(ClipId::Listening)]);
        let visible = rig.sync.visible_slot();

        rig.element(visible.other()).probe().auto_ready = false;
        rig.sync.display(ClipId::Weather, false).unwrap();
        rig.element(visible.other())
            .emit(ElementSignal::Error("404".to_string()));

        assert_eq!(
            rig.pump(),
            vec![MediaOutcome::Failed {
                clip: ClipId::Weather,
                error: MediaError::Load("404".to_string())
            }]
        );
        assert_eq!(rig.sync.visible_slot(), visible);
        assert_eq!(rig.sync.displayed_clip(), Some(ClipId::Listening));
        assert!(rig.element(visible).probe().visible);
        assert!(!rig.element(visible.other()).probe().visible);
        assert!(!rig.sync.is_switching());
    }

    #[tokio::test]
    async fn concurrent_requests_are_dropped() {
        let mut rig = Rig::new(false);
        rig.sync.display(ClipId::Greeting, false).unwrap();
        assert_eq!(
            rig.sync.display(ClipId::Goodbye, false),
            Ok(DisplayOutcome::Dropped)
        );

        let hidden = rig.sync.visible_slot().other();
        rig.element(hidden).emit(ElementSignal::Ready);
        assert_eq!(rig.pump(), vec![MediaOutcome::Live(ClipId::Greeting)]);
        assert_eq!(rig.element(hidden).probe().loads.len(), 1);
        assert!(rig.element(hidden.other()).probe().loads.is_empty());
    }

    #[tokio::test]
    async fn redisplay_resumes_a_paused_clip() {
        let mut rig = Rig::new(true);
        rig.show(ClipId::Idle, true);
        let visible = rig.sync.visible_slot();

        rig.element(visible).probe().paused = true;
        assert_eq!(rig.sync.display(ClipId::Idle, true), Ok(DisplayOutcome::Resumed));
        assert!(!rig.element(visible).probe().paused);
        assert_eq!(rig.element(visible).probe().loads.len(), 1);
    }

    #[tokio::test]
    async fn only_non_looping_clips_end() {
        let mut rig = Rig::new(true);
        rig.show(ClipId::Listening, true);
        rig.element(rig.sync.visible_slot()).emit(ElementSignal::Ended);
        assert!(rig.pump().is_empty());

        rig.show(ClipId::Weather, false);
        rig.element(rig.sync.visible_slot()).emit(ElementSignal::Ended);
        assert_eq!(rig.pump(), vec![MediaOutcome::Ended(ClipId::Weather)]);
    }

    #[tokio::test]
    async fn signals_from_the_hidden_buffer_are_ignored() {
        let mut rig = Rig::new(true);
        rig.show(ClipId::Greeting, false);
        let first = rig.sync.visible_slot();
        rig.show(ClipId::Listening, true);

        // The greeting element was hidden and rewound; its end is stale.
        rig.element(first).emit(ElementSignal::Ended);
        assert!(rig.pump().is_empty());
    }

    #[tokio::test]
    async fn visible_playback_errors_are_surfaced() {
        let mut rig = Rig::new(true);
        rig.show(ClipId::Idle, true);
        rig.element(rig.sync.visible_slot())
            .emit(ElementSignal::Error("decode".to_string()));
        assert_eq!(
            rig.pump(),
            vec![MediaOutcome::Failed {
                clip: ClipId::Idle,
                error: MediaError::Playback("decode".to_string())
            }]
        );
        assert_eq!(rig.sync.displayed_clip(), Some(ClipId::Idle));
    }

    #[tokio::test]
    async fn play_rejection_fails_the_switch() {
        let mut rig = Rig::new(true);
        rig.show(ClipId::Idle, true);
        let visible = rig.sync.visible_slot();

        rig.element(visible.other()).probe().fail_play =
            Some(MediaError::Playback("autoplay blocked".to_string()));
        let outcomes = rig.show(ClipId::Greeting, false);
        assert!(matches!(
            outcomes.as_slice(),
            [MediaOutcome::Failed { clip: ClipId::Greeting, .. }]
        ));
        assert_eq!(rig.sync.visible_slot(), visible);
    }

    #[tokio::test(start_paused = true)]
    async fn unready_clip_times_out() {
        let mut rig = Rig::new(false);
        rig.sync.display(ClipId::Prompt, false).unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(
            rig.pump(),
            vec![MediaOutcome::Failed {
                clip: ClipId::Prompt,
                error: MediaError::NotReady(Duration::from_secs(10))
            }]
        );
        assert!(!rig.sync.is_switching());

        // A late ready from the abandoned load changes nothing.
        let hidden = rig.sync.visible_slot().other();
        rig.element(hidden).emit(ElementSignal::Ready);
        assert!(rig.pump().is_empty());
        assert_eq!(rig.sync.displayed_clip(), None);
    }
}
