//! CLI command bodies. Each prints to stdout; progress and logs go to stderr.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::app::AppContext;
use crate::config::Config;
use crate::models::Document;
use crate::progress::ProgressMode;

/// Create the database and schema. Safe to run repeatedly.
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::run_migrations(&pool).await?;
    std::fs::create_dir_all(&config.index.dir)?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

/// One sync run in the foreground.
pub async fn run_sync(ctx: &AppContext, progress: ProgressMode) -> Result<()> {
    let reporter = progress.reporter();
    let report = ctx.sync.run_inline(reporter.as_ref()).await?;

    println!("sync complete");
    println!("  listed:    {}", report.listed);
    println!("  created:   {}", report.created);
    println!("  updated:   {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    println!("  embedded:  {}", report.embedded);
    println!(
        "  index:     {}",
        if report.index_rebuilt {
            format!("rebuilt ({} vectors)", ctx.index.len().await)
        } else {
            "unchanged".to_string()
        }
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    Semantic,
    Lexical,
}

pub async fn run_search(
    ctx: &AppContext,
    query: &str,
    mode: SearchMode,
    limit: Option<usize>,
) -> Result<()> {
    let retrieval = &ctx.config.retrieval;
    let results = match mode {
        SearchMode::Semantic => {
            let k = limit.unwrap_or(retrieval.default_k).min(retrieval.max_k);
            ctx.query.semantic_search(query, k).await?
        }
        SearchMode::Lexical => {
            if query.trim().is_empty() {
                bail!("query must not be empty");
            }
            let limit = limit
                .map(|l| l as i64)
                .unwrap_or(retrieval.lexical_limit);
            ctx.query.lexical_search(query, limit).await?
        }
    };

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, doc) in results.iter().enumerate() {
        println!("{}. {}", i + 1, doc.title);
        println!("    id: {}", doc.id);
        println!("    modified: {}", format_time(doc.remote_modified_at));
        if !doc.tags.is_empty() {
            println!("    tags: {}", doc.tags.join(", "));
        }
        println!("    {}", snippet(&doc.content, 160));
        println!();
    }
    Ok(())
}

pub async fn run_get(ctx: &AppContext, id: &str) -> Result<()> {
    let Some(doc) = ctx.store.get_document(id).await? else {
        bail!("document not found: {}", id);
    };
    print_document(&doc);
    Ok(())
}

pub async fn run_list(ctx: &AppContext, skip: i64, limit: i64) -> Result<()> {
    let docs = ctx.store.list_documents(skip, limit).await?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<40} {:<24} {}", "ID", "MODIFIED", "TITLE");
    println!("{}", "-".repeat(90));
    for doc in &docs {
        println!(
            "{:<40} {:<24} {}",
            doc.id,
            format_time(doc.remote_modified_at),
            doc.title
        );
    }
    Ok(())
}

pub async fn run_stats(ctx: &AppContext) -> Result<()> {
    let stats = ctx.store.stats().await?;
    let status = ctx.sync.status();

    println!("Vault Index - Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", ctx.config.db.path.display());
    println!("  Documents:   {}", stats.documents);
    println!("  Words:       {}", stats.words);
    println!("  Tags:        {}", stats.tags);
    println!(
        "  Embedded:    {} / {}",
        stats.embeddings, stats.documents
    );
    println!("  Indexed:     {}", ctx.index.len().await);
    println!("  Last change: {}", format_time(stats.last_remote_modified));
    println!("  Model:       {}", ctx.provider.model_name());
    println!("  Sync phase:  {:?}", status.phase);
    Ok(())
}

fn print_document(doc: &Document) {
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    if let Some(ref url) = doc.source_url {
        println!("source_url:   {}", url);
    }
    println!("created_at:   {}", doc.created_at.to_rfc3339());
    println!("modified_at:  {}", doc.modified_at.to_rfc3339());
    println!("remote_time:  {}", format_time(doc.remote_modified_at));
    println!("tags:         {}", doc.tags.join(", "));
    println!();
    println!("--- Content ---");
    println!("{}", doc.content);
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First `max_chars` characters of `text` on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut)
}
