//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cogquery_rag::{DEFAULT_CONTEXT_LIMIT, SummaryStrategy};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "cogquery")]
#[command(about = "Ingest documents and find the ones that answer a question", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the saved index
    #[arg(long, global = true, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add files or directories to the index
    Ingest {
        /// Files, or directories read one level deep
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Fragment window size in characters
        #[arg(long)]
        fragment_size: Option<usize>,

        /// Characters shared by consecutive fragments
        #[arg(long)]
        fragment_overlap: Option<usize>,
    },

    /// Find the documents that best match a question
    Query {
        text: String,

        /// Number of fragments searched
        #[arg(long)]
        top_k: Option<usize>,

        /// Also print the fragment hits behind the answer
        #[arg(long)]
        explain: bool,
    },

    /// Show index counters and stored document ids
    Stats,

    /// Re-split every stored document and rebuild the fragment index
    Rebuild,

    /// Retrieve documents for a question and report how they would be summarized
    PlanSummary {
        text: String,

        /// Model context size in tokens
        #[arg(long, default_value_t = DEFAULT_CONTEXT_LIMIT)]
        context_limit: usize,

        /// Preferred strategy; `stuff` still falls back when the input is too large
        #[arg(long, value_enum)]
        prefer: Option<Preference>,

        /// Number of fragments searched
        #[arg(long)]
        top_k: Option<usize>,
    },
}

/// Summary strategy names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preference {
    Stuff,
    MapReduce,
    Refine,
}

impl From<Preference> for SummaryStrategy {
    fn from(preference: Preference) -> Self {
        match preference {
            Preference::Stuff => SummaryStrategy::Stuff,
            Preference::MapReduce => SummaryStrategy::MapReduce,
            Preference::Refine => SummaryStrategy::Refine,
        }
    }
}

impl Cli {
    /// Resolve the configuration: file, then environment, then these flags.
    pub fn app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        self.apply_flags(&mut config);
        Ok(config)
    }

    /// Apply flag overrides to an already loaded configuration.
    pub fn apply_flags(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.index_dir {
            config.index_dir = dir.clone();
        }
        match &self.command {
            Command::Ingest { fragment_size, fragment_overlap, .. } => {
                if let Some(size) = fragment_size {
                    config.retriever.fragment_size = *size;
                }
                if let Some(overlap) = fragment_overlap {
                    config.retriever.fragment_overlap = *overlap;
                }
            }
            Command::Query { top_k: Some(top_k), .. }
            | Command::PlanSummary { top_k: Some(top_k), .. } => {
                config.retriever.top_k_fragments = *top_k;
            }
            _ => {}
        }
    }
}
