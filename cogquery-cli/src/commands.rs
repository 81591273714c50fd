//! Command handlers.
//!
//! Each handler restores the saved index first, then works on the
//! retriever owned by the [`AppContext`]. Output meant for the user goes to
//! `out`; diagnostics go through `tracing`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use cogquery_rag::{
    Document, RagError, RestoreOutcome, SummaryStrategy, estimate_document_tokens,
    select_strategy,
};
use tracing::info;

use crate::cli::{Cli, Command};
use crate::context::AppContext;
use crate::loader::{PATH_KEY, SUPPORTED_EXTENSIONS, load_paths};

/// Resolve configuration, build the context and dispatch `cli.command`.
pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = cli.app_config()?;
    let ctx = AppContext::new(config)?;
    dispatch(&ctx, cli.command, out).await
}

/// Run one command against an existing context.
pub async fn dispatch(
    ctx: &AppContext,
    command: Command,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Ingest { paths, .. } => ingest(ctx, &paths, out).await,
        Command::Query { text, explain, .. } => query(ctx, &text, explain, out).await,
        Command::Stats => stats(ctx, out).await,
        Command::Rebuild => rebuild(ctx, out).await,
        Command::PlanSummary { text, context_limit, prefer, .. } => {
            plan_summary(ctx, &text, context_limit, prefer.map(Into::into), out).await
        }
    }
}

pub async fn ingest(
    ctx: &AppContext,
    paths: &[PathBuf],
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match ctx.restore().await? {
        RestoreOutcome::Restored { documents, .. } => info!(documents, "adding to existing index"),
        RestoreOutcome::NotFound => info!("creating a new index"),
    }

    let report = load_paths(paths);
    if report.documents.is_empty() {
        bail!(
            "no readable documents found (supported extensions: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }

    let settings = &ctx.config().retriever;
    let result = ctx
        .retriever()
        .ingest(&report.documents, settings.fragment_size, settings.fragment_overlap)
        .await
        .context("ingest failed, the saved index was not changed")?;
    ctx.save().await.context("failed to save the index")?;

    writeln!(
        out,
        "Ingested {} documents ({} fragments) into {}",
        result.documents,
        result.fragments,
        ctx.config().index_dir.display()
    )?;
    if !report.skipped.is_empty() {
        writeln!(out, "Skipped {} unsupported files", report.skipped.len())?;
    }
    for (path, reason) in &report.failed {
        writeln!(out, "Could not read {}: {reason}", path.display())?;
    }
    Ok(())
}

pub async fn query(
    ctx: &AppContext,
    text: &str,
    explain: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !restored(ctx, out).await? {
        return Ok(());
    }

    let documents = ctx.retriever().retrieve(text).await?;
    if documents.is_empty() {
        writeln!(out, "No matching documents.")?;
    }
    for (rank, document) in documents.iter().enumerate() {
        writeln!(out, "{}. {} ({})", rank + 1, document.id, location(document))?;
    }

    if explain {
        let top_k = ctx.config().retriever.top_k_fragments;
        let hits = ctx.retriever().retrieve_hits(text, top_k).await?;
        writeln!(out)?;
        writeln!(out, "Fragment hits:")?;
        for hit in hits {
            writeln!(out, "  {:.4}  {}  {}", hit.distance, hit.parent_id, hit.fragment_id)?;
        }
    }
    Ok(())
}

pub async fn stats(ctx: &AppContext, out: &mut dyn Write) -> anyhow::Result<()> {
    if !restored(ctx, out).await? {
        return Ok(());
    }

    let stats = ctx.retriever().stats().await;
    writeln!(out, "Documents:        {}", stats.documents)?;
    writeln!(out, "Fragments:        {}", stats.fragments)?;
    writeln!(out, "Orphan fragments: {}", stats.orphan_fragments)?;
    writeln!(out, "Dimensions:       {} ({})", stats.dimensions, ctx.embedder().name())?;
    for id in ctx.retriever().document_ids().await {
        writeln!(out, "  {id}")?;
    }
    Ok(())
}

pub async fn rebuild(ctx: &AppContext, out: &mut dyn Write) -> anyhow::Result<()> {
    if let RestoreOutcome::NotFound = ctx.restore().await? {
        let path = ctx.persistence().documents_path().display().to_string();
        bail!("no index found at {path}, nothing to rebuild");
    }

    let result = ctx
        .retriever()
        .rebuild_index()
        .await
        .context("rebuild failed, the saved index was not changed")?;
    ctx.save().await.context("failed to save the index")?;
    writeln!(out, "Rebuilt index: {} documents, {} fragments", result.documents, result.fragments)?;
    Ok(())
}

pub async fn plan_summary(
    ctx: &AppContext,
    text: &str,
    context_limit: usize,
    preference: Option<SummaryStrategy>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !restored(ctx, out).await? {
        return Ok(());
    }

    let documents = ctx.retriever().retrieve(text).await?;
    if documents.is_empty() {
        writeln!(out, "No matching documents, nothing to summarize.")?;
        return Ok(());
    }

    let plan = select_strategy(estimate_document_tokens(&documents), context_limit, preference);
    let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    writeln!(out, "Documents:        {}", ids.join(", "))?;
    writeln!(out, "Estimated tokens: {}", plan.estimated_tokens)?;
    writeln!(out, "Safe limit:       {} of {context_limit}", plan.safe_limit)?;
    writeln!(out, "Strategy:         {}", plan.strategy)?;
    Ok(())
}

/// Restore the saved index, telling the user to ingest when there is none.
async fn restored(ctx: &AppContext, out: &mut dyn Write) -> anyhow::Result<bool> {
    match ctx.restore().await? {
        RestoreOutcome::Restored { .. } => Ok(true),
        RestoreOutcome::NotFound => {
            writeln!(
                out,
                "No index found at {}. Run `cogquery ingest <paths>` first.",
                ctx.persistence().documents_path().display()
            )?;
            Ok(false)
        }
    }
}

fn location(document: &Document) -> &str {
    document
        .metadata
        .get(PATH_KEY)
        .map(String::as_str)
        .or_else(|| document.source())
        .unwrap_or(document.id.as_str())
}

/// Render a top-level error for the terminal.
///
/// An unreadable or incompatible saved index gets an explicit instruction to
/// delete it and ingest again, since no command can use it as is.
pub fn describe_error(err: &anyhow::Error) -> String {
    let rag = err.chain().find_map(|cause| cause.downcast_ref::<RagError>());
    match rag {
        Some(RagError::PersistenceCorrupt { path, message }) => format!(
            "error: the saved index is corrupt ({}: {message})\n\
             Delete the index files and re-ingest your documents with `cogquery ingest <paths>`.",
            path.display()
        ),
        Some(e @ RagError::IncompatibleIndex { .. }) => format!(
            "error: {e}\n\
             The index was built with a different embedder. Delete the index files and re-ingest \
             your documents with `cogquery ingest <paths>`."
        ),
        _ => format!("error: {err:#}"),
    }
}
