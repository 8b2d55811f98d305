//! Simulated video elements for running without a screen.
//!
//! Loading takes a short fixed delay, and a non-looping clip "plays" for a
//! fixed length before it reports its end.

use avatar_core::error::MediaError;
use avatar_core::media::{ElementSignal, ElementSink, PlaybackElement};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub load_delay: Duration,
    pub clip_length: Duration,
    /// Treat locators as file paths and fail loads of missing files.
    pub verify_files: bool,
}

impl Default for StageTiming {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(200),
            clip_length: Duration::from_secs(3),
            verify_files: false,
        }
    }
}

pub struct SimulatedElement {
    name: &'static str,
    timing: StageTiming,
    locator: String,
    looping: bool,
    paused: bool,
    sink: Option<ElementSink>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedElement {
    pub fn new(name: &'static str, timing: StageTiming) -> Self {
        Self {
            name,
            timing,
            locator: String::new(),
            looping: false,
            paused: true,
            sink: None,
            task: None,
        }
    }

    fn after(&mut self, delay: Duration, signal: ElementSignal) {
        self.cancel();
        let Some(sink) = self.sink.clone() else {
            return;
        };
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink(signal);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl PlaybackElement for SimulatedElement {
    fn load(&mut self, locator: &str, looping: bool, sink: ElementSink) {
        self.locator = locator.to_string();
        self.looping = looping;
        self.paused = true;
        self.sink = Some(sink);

        if self.timing.verify_files && !Path::new(locator).is_file() {
            self.after(Duration::ZERO, ElementSignal::Error("file not found".to_string()));
            return;
        }
        debug!(element = self.name, %locator, "Loading");
        self.after(self.timing.load_delay, ElementSignal::Ready);
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if self.sink.is_none() {
            return Err(MediaError::Playback("nothing loaded".to_string()));
        }
        self.paused = false;
        if self.looping {
            self.cancel();
        } else {
            self.after(self.timing.clip_length, ElementSignal::Ended);
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        self.cancel();
    }

    fn rewind(&mut self) {}

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_visible(&mut self, visible: bool) {
        if visible {
            info!(element = self.name, locator = %self.locator, looping = self.looping, "On screen");
        }
    }
}

impl Drop for SimulatedElement {
    fn drop(&mut self) {
        self.cancel();
    }
}
