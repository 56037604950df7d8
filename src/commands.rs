//! CLI command implementations for the `lore` binary.
//!
//! Each `run_*` function prints human-readable output to stdout (or JSON
//! with `--json`); logs go to stderr through `tracing`.

use std::path::Path;

use anyhow::{Context, Result};
use lore_index_core::index::QueryOptions;
use lore_index_core::models::{Pack, Source};
use uuid::Uuid;

use crate::config::Config;
use crate::error::IndexError;
use crate::index::{IngestReport, KnowledgeIndex};

/// `lore add <pack.json>`: index (or re-index) a pack described in JSON.
pub async fn run_add(index: &KnowledgeIndex, pack_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(pack_path)
        .with_context(|| format!("Failed to read pack file: {}", pack_path.display()))?;
    let pack: Pack = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse pack file: {}", pack_path.display()))?;
    add_and_report(index, &pack).await
}

/// `lore note <profile> <content>`: index a single note as its own pack.
pub async fn run_note(
    index: &KnowledgeIndex,
    profile: &str,
    title: Option<String>,
    content: &str,
) -> Result<()> {
    let id = format!("note-{}", Uuid::new_v4());
    let title = title.unwrap_or_else(|| "Quick note".to_string());
    let pack = Pack::new(&id, &title, profile).with_source(Source::note(&id, &title, content));
    add_and_report(index, &pack).await
}

async fn add_and_report(index: &KnowledgeIndex, pack: &Pack) -> Result<()> {
    match index.add_pack(pack).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(IndexError::NothingIngested { pack_id, failures }) => {
            println!("add {}", pack_id);
            for f in &failures {
                println!("  failed: {} ({}) {}", f.source_id, f.reason, f.detail);
            }
            anyhow::bail!("no source in pack '{}' could be ingested", pack_id)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &IngestReport) {
    println!("add {}", report.pack_id);
    println!("  sources indexed: {}", report.sources_indexed);
    println!("  chunks indexed: {}", report.chunks_indexed);
    for f in &report.failures {
        println!("  failed: {} ({}) {}", f.source_id, f.reason, f.detail);
    }
    println!("ok");
}

/// `lore remove <pack_id>`.
pub async fn run_remove(index: &KnowledgeIndex, pack_id: &str) -> Result<()> {
    if index.remove_pack(pack_id).await? {
        println!("removed {}", pack_id);
    } else {
        println!("pack not found: {}", pack_id);
    }
    Ok(())
}

/// `lore enable|disable <pack_id>`.
pub async fn run_set_enabled(index: &KnowledgeIndex, pack_id: &str, enabled: bool) -> Result<()> {
    let verb = if enabled { "enabled" } else { "disabled" };
    if index.set_pack_enabled(pack_id, enabled).await? {
        println!("{} {}", verb, pack_id);
    } else {
        println!("pack not found: {}", pack_id);
    }
    Ok(())
}

/// `lore query <profile> <question>`.
pub fn run_query(
    index: &KnowledgeIndex,
    config: &Config,
    profile: &str,
    question: &str,
    top_k: Option<usize>,
    min_score: Option<f32>,
    json: bool,
) -> Result<()> {
    let options = QueryOptions {
        top_k: top_k.unwrap_or(config.retrieval.top_k),
        min_score: min_score.unwrap_or(config.retrieval.min_score),
    };
    let results = index.query_with(profile, question, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}",
            i + 1,
            result.score,
            result.pack_id,
            result.source_id
        );
        println!("    excerpt: \"{}\"", excerpt(&result.text, 240));
        println!();
    }
    Ok(())
}

/// `lore packs`.
pub fn run_packs(index: &KnowledgeIndex, json: bool) -> Result<()> {
    let packs = index.packs();
    if json {
        println!("{}", serde_json::to_string_pretty(&packs)?);
        return Ok(());
    }
    if packs.is_empty() {
        println!("No packs indexed.");
        return Ok(());
    }
    println!(
        "{:<28} {:<16} {:>7} {:>8}   {}",
        "PACK", "PROFILE", "CHUNKS", "ENABLED", "INDEXED"
    );
    for p in &packs {
        println!(
            "{:<28} {:<16} {:>7} {:>8}   {}",
            p.id,
            p.game_profile_id,
            p.chunk_count,
            if p.enabled { "yes" } else { "no" },
            p.indexed_at.format("%Y-%m-%d %H:%M")
        );
        if !p.failed_sources.is_empty() {
            println!("    failed sources: {}", p.failed_sources.join(", "));
        }
    }
    Ok(())
}

/// `lore stats`.
pub fn run_stats(index: &KnowledgeIndex) -> Result<()> {
    let stats = index.stats();
    println!("Lore Index Stats");
    println!("================");
    println!();
    println!("  Snapshot:    {}", index.snapshot_path().display());
    println!("  Packs:       {}", stats.packs);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Vocabulary:  {}", stats.vocabulary);
    if !stats.profiles.is_empty() {
        println!();
        println!("  By profile:");
        println!("  {:<28} {:>8}", "PROFILE", "CHUNKS");
        println!("  {}", "-".repeat(37));
        for (profile, count) in &stats.profiles {
            println!("  {:<28} {:>8}", profile, count);
        }
    }
    println!();
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
