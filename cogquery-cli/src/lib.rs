//! Command-line front end for a parent/child retrieval index.
//!
//! The `cogquery` binary loads plain-text files, ingests them into a
//! [`ParentChildRetriever`](cogquery_rag::ParentChildRetriever), persists the
//! index between runs and answers queries with whole documents. All state for
//! one invocation lives in an [`AppContext`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod loader;

pub use cli::{Cli, Command, Preference};
pub use commands::{describe_error, dispatch, run};
pub use config::{AppConfig, EmbedderConfig};
pub use context::AppContext;
pub use loader::{LoadReport, load_paths};
