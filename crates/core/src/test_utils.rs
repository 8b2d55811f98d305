//! Hand-written fakes for the platform traits.

use crate::error::{EngineError, MediaError};
use crate::media::{ElementSignal, ElementSink, PlaybackElement};
use crate::speech::{EngineSignal, EngineSink, SpeechEngine};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
pub struct EngineProbe {
    pub starts: usize,
    pub stops: usize,
    pub aborts: usize,
    pub running: bool,
    pub double_starts: usize,
    pub sink: Option<EngineSink>,
    pub fail_start: Option<EngineError>,
    pub unsupported: bool,
    pub lang: String,
}

/// Records every call and lets the test push signals through the sink of
/// the latest run.
#[derive(Clone, Default)]
pub struct FakeEngine {
    probe: Arc<Mutex<EngineProbe>>,
}

impl FakeEngine {
    pub fn probe(&self) -> MutexGuard<'_, EngineProbe> {
        self.probe.lock().unwrap()
    }

    pub fn emit(&self, signal: EngineSignal) {
        let sink = {
            let mut probe = self.probe();
            if signal == EngineSignal::End {
                probe.running = false;
            }
            probe.sink.clone()
        };
        if let Some(sink) = sink {
            sink(signal);
        }
    }
}

impl SpeechEngine for FakeEngine {
    fn is_supported(&self) -> bool {
        !self.probe().unsupported
    }

    fn set_lang(&mut self, lang: &str) {
        self.probe().lang = lang.to_string();
    }

    fn start(&mut self, sink: EngineSink) -> Result<(), EngineError> {
        let mut probe = self.probe();
        if let Some(error) = probe.fail_start.clone() {
            return Err(error);
        }
        if probe.running {
            probe.double_starts += 1;
        }
        probe.starts += 1;
        probe.running = true;
        probe.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut probe = self.probe();
        probe.stops += 1;
        probe.running = false;
    }

    fn abort(&mut self) {
        let mut probe = self.probe();
        probe.aborts += 1;
        probe.running = false;
    }
}

#[derive(Default)]
pub struct ElementProbe {
    pub loads: Vec<(String, bool)>,
    pub sink: Option<ElementSink>,
    pub auto_ready: bool,
    pub ready: bool,
    pub visible: bool,
    pub paused: bool,
    pub plays: usize,
    pub rewinds: usize,
    pub revealed_unready: usize,
    pub fail_play: Option<MediaError>,
}

#[derive(Clone, Default)]
pub struct FakeElement {
    probe: Arc<Mutex<ElementProbe>>,
}

impl FakeElement {
    /// With `auto_ready` every load reports ready immediately.
    pub fn new(auto_ready: bool) -> Self {
        let element = Self::default();
        {
            let mut probe = element.probe();
            probe.auto_ready = auto_ready;
            probe.paused = true;
        }
        element
    }

    pub fn probe(&self) -> MutexGuard<'_, ElementProbe> {
        self.probe.lock().unwrap()
    }

    pub fn emit(&self, signal: ElementSignal) {
        let sink = {
            let mut probe = self.probe();
            if signal == ElementSignal::Ready {
                probe.ready = true;
            }
            probe.sink.clone()
        };
        if let Some(sink) = sink {
            sink(signal);
        }
    }
}

impl PlaybackElement for FakeElement {
    fn load(&mut self, locator: &str, looping: bool, sink: ElementSink) {
        let auto_ready = {
            let mut probe = self.probe();
            probe.loads.push((locator.to_string(), looping));
            probe.sink = Some(sink);
            probe.ready = false;
            probe.paused = true;
            probe.auto_ready
        };
        if auto_ready {
            self.emit(ElementSignal::Ready);
        }
    }

    fn play(&mut self) -> Result<(), MediaError> {
        let mut probe = self.probe();
        if let Some(error) = probe.fail_play.clone() {
            return Err(error);
        }
        probe.plays += 1;
        probe.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.probe().paused = true;
    }

    fn rewind(&mut self) {
        self.probe().rewinds += 1;
    }

    fn is_paused(&self) -> bool {
        self.probe().paused
    }

    fn set_visible(&mut self, visible: bool) {
        let mut probe = self.probe();
        if visible && !probe.ready {
            probe.revealed_unready += 1;
        }
        probe.visible = visible;
    }
}
