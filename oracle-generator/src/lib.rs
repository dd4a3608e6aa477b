//! # Oracle Generator
//!
//! The content-generation pipeline: model backends, image-tag resolution,
//! Markdown rendering and sanitization, and the pipeline that ties them to
//! the quota and the artifact store.
//!
//! ## Modules
//!
//! - `model`: content-model trait with Gemini and scripted backends
//! - `images`: image lookup for `[[WIKISEARCH: name]]` tags
//! - `tags`: tag resolution
//! - `render`: Markdown to sanitized HTML, titles, slugs
//! - `prompt`: the instruction template
//! - `sink`: buffered and streaming output sinks
//! - `pipeline`: admission and the generation run
//! - `timeout`: model-call timeout policy
//!
//! ## Example
//!
//! ```no_run
//! use oracle_generator::model::{ContentModel, ScriptedModel};
//!
//! # async fn example() {
//! let model = ScriptedModel::demo();
//! println!("Model: {}", model.name());
//! # }
//! ```

pub mod images;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod sink;
pub mod tags;
pub mod timeout;

pub use pipeline::{GeneratedArtifact, GenerationError, GenerationPipeline, Reservation};
pub use sink::{BufferedSink, ChannelSink, OutputSink, StreamRecord};
