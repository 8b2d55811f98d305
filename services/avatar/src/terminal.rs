//! A speech engine fed by lines typed on stdin.

use avatar_core::error::EngineError;
use avatar_core::speech::{EngineSignal, EngineSink, SpeechEngine};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Shared between the engine and the stdin reader. Holds the sink of the
/// running recognition, if any.
#[derive(Clone, Default)]
pub struct TypedSpeech {
    sink: Arc<Mutex<Option<EngineSink>>>,
}

impl TypedSpeech {
    fn slot(&self) -> MutexGuard<'_, Option<EngineSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_listening(&self) -> bool {
        self.slot().is_some()
    }

    /// Delivers `line` as a final segment. Returns `false` when no
    /// recognition is running.
    pub fn deliver(&self, line: &str) -> bool {
        let sink = self.slot().clone();
        match sink {
            Some(sink) => {
                sink(EngineSignal::Final(line.to_string()));
                true
            }
            None => false,
        }
    }
}

pub struct TerminalEngine {
    speech: TypedSpeech,
    lang: String,
}

impl TerminalEngine {
    pub fn new(speech: TypedSpeech) -> Self {
        Self {
            speech,
            lang: String::new(),
        }
    }
}

impl SpeechEngine for TerminalEngine {
    fn set_lang(&mut self, lang: &str) {
        self.lang = lang.to_string();
    }

    fn start(&mut self, sink: EngineSink) -> Result<(), EngineError> {
        let mut slot = self.speech.slot();
        if slot.is_some() {
            return Err(EngineError::Start("recognition already started".to_string()));
        }
        debug!(lang = %self.lang, "Terminal microphone open");
        *slot = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let sink = self.speech.slot().take();
        if let Some(sink) = sink {
            debug!("Terminal microphone closed");
            sink(EngineSignal::End);
        }
    }

    fn abort(&mut self) {
        if self.speech.slot().take().is_some() {
            debug!("Terminal microphone aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (EngineSink, Arc<Mutex<Vec<EngineSignal>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: EngineSink = Arc::new(move |signal| {
            sink_seen.lock().unwrap().push(signal);
        });
        (sink, seen)
    }

    #[test]
    fn lines_are_heard_only_while_started() {
        let speech = TypedSpeech::default();
        let mut engine = TerminalEngine::new(speech.clone());
        let (sink, seen) = recorder();

        assert!(!speech.deliver("too early"));
        engine.start(sink).unwrap();
        assert!(speech.is_listening());
        assert!(speech.deliver("hello"));

        engine.stop();
        assert!(!speech.deliver("too late"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EngineSignal::Final("hello".to_string()), EngineSignal::End]
        );
    }

    #[test]
    fn second_start_is_refused() {
        let speech = TypedSpeech::default();
        let mut engine = TerminalEngine::new(speech);
        let (sink, _) = recorder();
        engine.start(sink.clone()).unwrap();
        assert!(engine.start(sink.clone()).is_err());

        engine.abort();
        assert!(engine.start(sink).is_ok());
    }
}
