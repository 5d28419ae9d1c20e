//! # senti
//!
//! Sentiment classification through an external inference library, with a
//! cache-first model acquisition strategy and timed predictions.
//!
//! senti does not run models itself. It decides *where* a model comes from,
//! keeps the loaded model for the rest of the session, and times each
//! prediction:
//!
//! - **Resolver**: cache first with a single remote fallback, or strictly
//!   local model files
//! - **Invoker**: input validation, monotonic timing, error capture
//! - **Session**: one memoized model per task, overlapping requests rejected
//!
//! ## Quick Start
//!
//! ```no_run
//! use senti::{Action, Config, HubPipelineFactory, Session};
//! use senti::render::{render_outcome, render_status};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let factory = Arc::new(HubPipelineFactory::from_config(&config)?);
//! let session = Session::new(factory, &config);
//!
//! let outcome = session.run(Action::CachedSentiment, "I love this.").await;
//! for event in &outcome.events {
//!     println!("{}", render_status(*event));
//! }
//! println!("{}", render_outcome(&outcome));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `hub` - model downloads and the TEI-compatible inference server client
//! - `cli` - the `senti` command-line interface
//! - `full` - all features enabled

pub mod config; // Configuration management with TOML persistence
pub mod error;
pub mod invoker; // Timed prediction
pub mod pipeline; // Inference library boundary
pub mod render; // Text output
pub mod resolver; // Model source resolution
pub mod session; // Per-task model slots

pub use config::{
    Config, HubConfig, ModelsConfig, PathsConfig, ServedModel, ServerConfig, SessionConfig,
};
pub use error::{Result, SentiError};
pub use invoker::{invoke, Prediction};
pub use pipeline::{
    ConstructOptions, HubPipelineFactory, ModelHandle, ModelStore, Pipeline, PipelineFactory,
    SourceKind, Task,
};
pub use resolver::{
    Resolution, ResolutionPlan, ResolutionRequest, Resolver, SourcePreference, StatusEvent,
};
pub use session::{Action, Outcome, Session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
