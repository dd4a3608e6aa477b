/// Content-model backends
///
/// A content model turns one instruction into Markdown, either in a single
/// response or as an ordered stream of text fragments.
///
/// # Backends
///
/// - [`GeminiModel`]: Google Generative Language REST API
/// - [`ScriptedModel`]: fixed fragments, for tests and offline demos
///
/// # Example
///
/// ```no_run
/// use oracle_generator::model::{ContentModel, ScriptedModel};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let model = ScriptedModel::new(["# Title\n", "Body"]);
///
/// let mut fragments = model.generate_stream("write something").await?;
/// while let Some(fragment) = fragments.next().await {
///     print!("{}", fragment?);
/// }
/// # Ok(())
/// # }
/// ```

pub mod gemini;
pub mod model_trait;
pub mod scripted;

pub use gemini::{GeminiConfig, GeminiModel};
pub use model_trait::{ContentModel, FragmentStream, ModelError, ModelResult};
pub use scripted::ScriptedModel;
