/// Scripted content model
///
/// Replays a fixed list of fragments, optionally failing. Used by the test
/// suites and by `MODEL_PROVIDER=scripted` for running without credentials.
///
/// The invocation counter lets callers assert that the model was (or was
/// not) reached.

use super::{ContentModel, FragmentStream, ModelError, ModelResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a scripted invocation ends
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ending {
    Success,
    /// Fail before producing anything
    FailImmediately(String),
    /// Emit all fragments, then fail
    FailAfterFragments(String),
}

#[derive(Debug)]
pub struct ScriptedModel {
    fragments: Vec<String>,
    ending: Ending,
    delay: Option<Duration>,
    invocations: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ending: Ending::Success,
            delay: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// A model whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            ending: Ending::FailImmediately(message.into()),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Streams `fragments`, then fails with `message`
    pub fn failing_after<I, S>(fragments: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ending: Ending::FailAfterFragments(message.into()),
            ..Self::new(fragments)
        }
    }

    /// Canned piece for offline runs
    pub fn demo() -> Self {
        Self::new([
            "# The Oracle Speaks\n\n",
            "The oracle is running without a model backend, ",
            "so every consultation returns this same reply.\n\n",
            "[[WIKISEARCH: Pythia]]\n\n",
            "Set `MODEL_PROVIDER=gemini` and `GEMINI_API_KEY` for real answers.\n",
        ])
    }

    /// Sleeps `delay` before the buffered reply and before each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of generate/generate_stream calls so far
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _instruction: &str) -> ModelResult<String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.ending {
            Ending::Success => Ok(self.fragments.concat()),
            Ending::FailImmediately(msg) | Ending::FailAfterFragments(msg) => {
                Err(ModelError::Unavailable(msg.clone()))
            }
        }
    }

    async fn generate_stream(&self, _instruction: &str) -> ModelResult<FragmentStream> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let mut items: Vec<ModelResult<String>> = match &self.ending {
            Ending::FailImmediately(msg) => return Err(ModelError::Unavailable(msg.clone())),
            _ => self.fragments.iter().cloned().map(Ok).collect(),
        };
        if let Ending::FailAfterFragments(msg) = &self.ending {
            items.push(Err(ModelError::Unavailable(msg.clone())));
        }

        let delay = self.delay;
        Ok(stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_concatenates() {
        let model = ScriptedModel::new(["He", "llo"]);
        assert_eq!(model.generate("x").await.unwrap(), "Hello");
        assert_eq!(model.invocations(), 1);
    }

    #[tokio::test]
    async fn test_stream_preserves_order() {
        let model = ScriptedModel::new(["a", "b", "c"]);
        let fragments: Vec<String> = model
            .generate_stream("x")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_variants() {
        let model = ScriptedModel::failing("down");
        assert!(model.generate("x").await.is_err());
        assert!(model.generate_stream("x").await.is_err());
        assert_eq!(model.invocations(), 2);

        let model = ScriptedModel::failing_after(["partial"], "cut off");
        let items: Vec<_> = model.generate_stream("x").await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        assert!(matches!(items[1], Err(ModelError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_demo_has_title_and_tag() {
        let text = ScriptedModel::demo().generate("x").await.unwrap();
        assert!(text.starts_with("# The Oracle Speaks"));
        assert!(text.contains("[[WIKISEARCH: Pythia]]"));
    }
}
