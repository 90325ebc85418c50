//! Rheo: an agent orchestration engine.
//!
//! A [`session::Session`] drives turns against a streaming
//! [`provider::ModelBackend`], hands proposed tool calls to the
//! [`scheduler::ToolCallScheduler`] (validation, risk-gated confirmation,
//! bounded concurrent execution), folds their results back into the
//! [`history::HistoryManager`] in request order, and asks the
//! [`next_speaker::NextSpeakerOracle`] whether to keep going.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use rheo::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(backend: Arc<dyn ModelBackend>) -> rheo::error::Result<()> {
//! let config = RheoConfig::load()?;
//! let mut session = Session::new(config, backend, ToolRegistry::new());
//! let events = session.send_message("How many users signed up today?", CancellationToken::new());
//! futures::pin_mut!(events);
//! while let Some(event) = events.next().await {
//!     if let SessionEvent::Content { text } = event {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod next_speaker;
pub mod prelude;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod tools;
pub mod turn;
pub mod types;
pub mod util;
