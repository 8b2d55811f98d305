use crate::clip::ClipId;
use crate::error::ClassifyError;
use crate::keywords;
use crate::remote::{MAX_REMOTE_TEXT_CHARS, RemoteClassifier};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Local,
    Remote,
}

/// Outcome of resolving one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: ClipId,
    /// One-sentence summary, only ever provided by the remote classifier.
    pub summary: Option<String>,
    /// Phrase that decided a local match.
    pub matched_keyword: Option<String>,
    pub source: ClassificationSource,
}

impl Classification {
    fn local(category: ClipId, matched_keyword: Option<&str>) -> Self {
        Self {
            category,
            summary: None,
            matched_keyword: matched_keyword.map(str::to_string),
            source: ClassificationSource::Local,
        }
    }

    pub fn is_goodbye(&self) -> bool {
        self.category == ClipId::Goodbye
    }
}

/// Lowercase, trim and strip trailing punctuation.
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .trim_end()
        .to_string()
}

fn first_match<'a>(normalized: &str, phrases: &[&'a str]) -> Option<&'a str> {
    phrases
        .iter()
        .copied()
        .find(|phrase| normalized.contains(phrase))
}

/// Keyword classification. Deterministic and infallible.
pub fn classify_local(raw: &str) -> Classification {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Classification::local(ClipId::Fallback, None);
    }

    for (category, phrases) in keywords::PRIORITY {
        if let Some(phrase) = first_match(&normalized, phrases) {
            return Classification::local(category, Some(phrase));
        }
    }

    let phrase = first_match(&normalized, keywords::FALLBACK);
    Classification::local(ClipId::Fallback, phrase)
}

/// Resolves utterances, preferring the remote classifier when one is
/// configured and falling back to [`classify_local`] on any failure.
#[derive(Clone)]
pub struct IntentResolver {
    remote: Option<Arc<dyn RemoteClassifier>>,
    timeout: Duration,
}

impl IntentResolver {
    pub fn local() -> Self {
        Self {
            remote: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn with_remote(remote: Arc<dyn RemoteClassifier>, timeout: Duration) -> Self {
        Self {
            remote: Some(remote),
            timeout,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn resolve(&self, raw: &str) -> Classification {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return classify_local(raw);
        }

        let Some(remote) = &self.remote else {
            return classify_local(raw);
        };

        if normalized.chars().count() > MAX_REMOTE_TEXT_CHARS {
            warn!(
                chars = normalized.chars().count(),
                "Utterance too long for the remote classifier, matching locally"
            );
            return classify_local(raw);
        }

        let outcome = match tokio::time::timeout(self.timeout, remote.classify(&normalized)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifyError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(verdict) => {
                info!(category = %verdict.category, "Remote classifier resolved utterance");
                Classification {
                    category: verdict.category,
                    summary: verdict.summary,
                    matched_keyword: None,
                    source: ClassificationSource::Remote,
                }
            }
            Err(e) => {
                warn!("Remote classification failed, using keywords: {}", e);
                let local = classify_local(raw);
                debug!(category = %local.category, "Local fallback classification");
                local
            }
        }
    }
}

impl std::fmt::Debug for IntentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentResolver")
            .field("remote", &self.remote.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{HttpClassifier, MockRemoteClassifier, RemoteVerdict};

    #[test]
    fn normalizes_case_whitespace_and_trailing_punctuation() {
        assert_eq!(normalize("  Hello There?!  "), "hello there");
        assert_eq!(normalize("What's up..."), "what's up");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn empty_text_is_fallback() {
        for text in ["", "   ", "\n\t", "?!"] {
            assert_eq!(classify_local(text).category, ClipId::Fallback, "{text:?}");
        }
    }

    #[test]
    fn job_application_is_the_easter_egg() {
        let result = classify_local("I'd like to apply for the job");
        assert_eq!(result.category, ClipId::EasterEgg);
        assert_eq!(result.source, ClassificationSource::Local);
    }

    #[test]
    fn weather_question_is_weather() {
        assert_eq!(
            classify_local("What's the weather like tomorrow?").category,
            ClipId::Weather
        );
    }

    #[test]
    fn goodbye_outranks_every_other_table() {
        let result = classify_local("Goodbye, I got the job!");
        assert_eq!(result.category, ClipId::Goodbye);
        assert_eq!(result.matched_keyword.as_deref(), Some("goodbye"));

        assert_eq!(
            classify_local("see you later, it's raining").category,
            ClipId::Goodbye
        );
    }

    #[test]
    fn greetings_and_small_talk() {
        assert_eq!(classify_local("Hello!").category, ClipId::Greeting);
        assert_eq!(classify_local("How are you").category, ClipId::General);
    }

    #[test]
    fn unmatched_text_falls_back() {
        let result = classify_local("purple elephants");
        assert_eq!(result.category, ClipId::Fallback);
        assert_eq!(result.matched_keyword, None);

        let result = classify_local("I don't know");
        assert_eq!(result.category, ClipId::Fallback);
        assert_eq!(result.matched_keyword.as_deref(), Some("i don't know"));
    }

    #[tokio::test]
    async fn remote_verdict_is_used_on_success() {
        let mut mock = MockRemoteClassifier::new();
        mock.expect_classify().times(1).returning(|_| {
            Ok(RemoteVerdict {
                category: ClipId::Weather,
                summary: Some("The user asks about rain.".to_string()),
            })
        });

        let resolver = IntentResolver::with_remote(Arc::new(mock), Duration::from_secs(8));
        let result = resolver.resolve("Will it pour?").await;

        assert_eq!(result.category, ClipId::Weather);
        assert_eq!(result.summary.as_deref(), Some("The user asks about rain."));
        assert_eq!(result.source, ClassificationSource::Remote);
    }

    #[tokio::test]
    async fn remote_failure_matches_local_result() {
        let inputs = [
            "I'd like to apply for the job",
            "What's the weather like tomorrow?",
            "bye now",
            "hello there",
            "purple elephants",
        ];

        for input in inputs {
            let mut mock = MockRemoteClassifier::new();
            mock.expect_classify()
                .times(1)
                .returning(|_| Err(ClassifyError::Status(503)));
            let resolver = IntentResolver::with_remote(Arc::new(mock), Duration::from_secs(8));

            assert_eq!(resolver.resolve(input).await, classify_local(input), "{input}");
        }
    }

    #[tokio::test]
    async fn empty_and_oversized_text_never_reach_the_remote() {
        let mut mock = MockRemoteClassifier::new();
        mock.expect_classify().times(0);
        let resolver = IntentResolver::with_remote(Arc::new(mock), Duration::from_secs(8));

        assert_eq!(resolver.resolve("   ").await.category, ClipId::Fallback);

        let long = format!("weather {}", "a".repeat(MAX_REMOTE_TEXT_CHARS));
        let result = resolver.resolve(&long).await;
        assert_eq!(result.category, ClipId::Weather);
        assert_eq!(result.source, ClassificationSource::Local);
    }

    #[tokio::test]
    async fn resolver_without_remote_is_local() {
        let resolver = IntentResolver::local();
        assert!(!resolver.has_remote());
        assert_eq!(
            resolver.resolve("take care").await,
            classify_local("take care")
        );
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl RemoteClassifier for Stalled {
        async fn classify(&self, _text: &str) -> Result<RemoteVerdict, ClassifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_remote_times_out_to_local() {
        let resolver = IntentResolver::with_remote(Arc::new(Stalled), Duration::from_secs(8));
        let started = tokio::time::Instant::now();

        let input = "is it going to snow";
        assert_eq!(resolver.resolve(input).await, classify_local(input));
        assert!(started.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_local() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client =
            HttpClassifier::new(format!("http://127.0.0.1:{port}/classify"), Duration::from_secs(8))
                .unwrap();
        let resolver = IntentResolver::with_remote(Arc::new(client), Duration::from_secs(8));

        for input in ["I want to work here", "hey", "purple elephants"] {
            assert_eq!(resolver.resolve(input).await, classify_local(input), "{input}");
        }
    }
}
