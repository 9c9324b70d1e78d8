use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use tracing::{info, warn};

use crate::assistant::{Answer, Assistant, Session};
use crate::config::Config;
use crate::corpus::Document;
use crate::database::KnowledgeBase;
use crate::embeddings::OpenAiEmbedder;
use crate::indexer::{EmbeddingReport, IndexingStats, Indexer, build_knowledge_base, plan};

fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).context("Failed to load configuration")
}

/// Segment and embed the corpus, writing the intermediate embeddings file
#[inline]
pub fn embed_corpus(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let embedder =
        OpenAiEmbedder::from_config(&config).context("Failed to initialize embedding client")?;

    let report = Indexer::new(&config, &embedder)
        .embed_corpus()
        .context("Failed to embed corpus")?;

    print_report(&report);
    println!(
        "Embeddings written to {}",
        style(config.embeddings_path().display()).cyan()
    );
    Ok(())
}

/// Build the vector index and metadata file from the embeddings file
#[inline]
pub fn build_index(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let knowledge_base =
        build_knowledge_base(&config).context("Failed to build knowledge base")?;

    println!(
        "{}",
        style(format!(
            "✓ Indexed {} vectors of dimension {}",
            knowledge_base.len(),
            knowledge_base.dimension()
        ))
        .green()
    );
    println!("  Index: {}", style(config.index_path().display()).cyan());
    println!(
        "  Metadata: {}",
        style(config.metadata_path().display()).cyan()
    );
    Ok(())
}

/// Run the whole offline pipeline, or only report what it would do
#[inline]
pub fn index_corpus(config_dir: &Path, dry_run: bool) -> Result<()> {
    let config = load_config(config_dir)?;

    if dry_run {
        let document =
            Document::load(&config.corpus_path()).context("Failed to load corpus")?;
        let stats = plan(&document, config.segmenting.max_segment_length);
        println!("{}", style("Dry run, nothing was embedded").bold().yellow());
        print_stats(&stats);
        return Ok(());
    }

    let embedder =
        OpenAiEmbedder::from_config(&config).context("Failed to initialize embedding client")?;
    let (report, knowledge_base) = Indexer::new(&config, &embedder)
        .run()
        .context("Indexing failed")?;

    print_report(&report);
    println!(
        "{}",
        style(format!(
            "✓ Knowledge base ready with {} entries",
            knowledge_base.len()
        ))
        .green()
    );
    Ok(())
}

/// Show which pipeline files exist and what the knowledge base holds
#[inline]
pub fn show_status(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;

    println!("{}", style("📊 Pipeline Status").bold().cyan());
    println!();

    let files = [
        ("Corpus", config.corpus_path()),
        ("Embeddings", config.embeddings_path()),
        ("Index", config.index_path()),
        ("Metadata", config.metadata_path()),
    ];
    for (label, path) in &files {
        let marker = if path.exists() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {} {}: {}", marker, label, path.display());
    }
    println!();

    match KnowledgeBase::open(&config) {
        Ok(knowledge_base) => {
            println!(
                "Knowledge base: {} entries, dimension {}",
                style(knowledge_base.len()).cyan(),
                style(knowledge_base.dimension()).cyan()
            );

            let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
            for record in knowledge_base.metadata().records() {
                *by_kind.entry(record.kind.as_str()).or_default() += 1;
            }
            for (kind, count) in by_kind {
                println!("  {}: {}", kind, count);
            }
        }
        Err(e) => {
            warn!("Knowledge base unavailable: {}", e);
            println!("{} {}", style("Knowledge base not available:").yellow(), e);
            println!("Run 'chapter-rag index' to build it.");
        }
    }

    Ok(())
}

/// Answer a single question
#[inline]
pub fn ask(config_dir: &Path, question: &str, show_sources: bool) -> Result<()> {
    let assistant = open_assistant(config_dir)?;
    let mut session = Session::new();

    let answer = assistant.answer(&mut session, question)?;
    print_answer(&answer, show_sources);
    Ok(())
}

/// Interactive question loop; `/history` lists asked questions, `/quit` exits
#[inline]
pub fn chat(config_dir: &Path, show_sources: bool) -> Result<()> {
    let assistant = open_assistant(config_dir)?;
    let mut session = Session::new();

    println!("{}", style("💬 Ask a question (/history, /quit)").bold().cyan());

    loop {
        let Ok(line) = Input::<String>::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()
        else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                if session.is_empty() {
                    println!("No questions asked yet.");
                }
                for (number, question) in session.questions().enumerate() {
                    println!("{}. {}", number + 1, question);
                }
            }
            question => match assistant.answer(&mut session, question) {
                Ok(answer) => print_answer(&answer, show_sources),
                Err(e) => println!("{} {}", style("✗").red(), e),
            },
        }
    }

    info!("Chat session ended after {} questions", session.len());
    Ok(())
}

fn open_assistant(config_dir: &Path) -> Result<Assistant> {
    let config = load_config(config_dir)?;
    Assistant::from_config(&config).context("Failed to load knowledge base")
}

fn print_answer(answer: &Answer, show_sources: bool) {
    if let Some(notice) = &answer.notice {
        println!("{} {}", style("⚠").yellow(), notice);
    }
    println!("{}", answer.render());

    if show_sources && !answer.sources.is_empty() {
        println!();
        println!("{}", style("Sources:").bold().yellow());
        for source in &answer.sources {
            println!(
                "  {} ({}) {}%",
                source.record.title,
                source.record.kind,
                style(source.relevance).cyan()
            );
        }
    }
}

fn print_report(report: &EmbeddingReport) {
    print_stats(&report.stats());
    for failure in &report.failures {
        println!(
            "  {} {} segment {}: {}",
            style("✗").red(),
            failure.source_id,
            failure.segment_index,
            failure.message
        );
    }
}

fn print_stats(stats: &IndexingStats) {
    println!("  Chapters: {}", stats.chapters);
    println!("  Subsections: {}", stats.subsections);
    println!("  Segments: {}", stats.segments);
    println!("  Embeddings: {}", stats.embeddings);
    if stats.failures > 0 {
        println!("  Failures: {}", style(stats.failures).red());
    }
}
