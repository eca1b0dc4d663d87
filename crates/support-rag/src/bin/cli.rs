//! Support chatbot command line
//!
//! Run with: cargo run -p support-rag -- <build|chat|ask|stats|evaluate>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use support_rag::evaluation::{run_evaluation, EvalCase};
use support_rag::generation::QueryKind;
use support_rag::providers::{build_embedder, build_llm};
use support_rag::{IndexBuilder, QueryOutcome, RagConfig, RagPipeline, VectorIndex};

#[derive(Parser, Debug)]
#[command(
    name = "support-rag",
    version,
    about = "Customer-support chatbot over a plain-text knowledge base"
)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, short, env = "SUPPORT_RAG_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk and embed the knowledge base, then persist the index
    Build,
    /// Interactive chat session
    Chat {
        /// Answer every question independently
        #[arg(long)]
        no_history: bool,
    },
    /// Answer one question and exit
    Ask {
        question: String,
        /// Print retrieved sections with their relevance scores
        #[arg(long)]
        scores: bool,
        /// Prompt template: general, troubleshooting, product or policy
        #[arg(long, default_value = "general")]
        kind: QueryKind,
    },
    /// Show index statistics
    Stats,
    /// Run the keyword evaluation and write a JSON report
    Evaluate {
        /// JSON file with evaluation cases (built-in set when omitted)
        #[arg(long)]
        cases: Option<PathBuf>,
        /// Report path (defaults to paths.eval_report)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "support_rag=debug" } else { "support_rag=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);

    match cli.command {
        Command::Build => build(config).await,
        Command::Chat { no_history } => chat(&config, !no_history).await,
        Command::Ask { question, scores, kind } => ask(&config, &question, scores, kind).await,
        Command::Stats => stats(&config),
        Command::Evaluate { cases, output } => evaluate(&config, cases, output).await,
    }
}

async fn build(config: RagConfig) -> Result<()> {
    let embedder = build_embedder(&config)?;
    if !embedder.health_check().await.unwrap_or(false) {
        tracing::warn!("Embedding provider {} is not reachable", embedder.name());
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks")?
            .progress_chars("=> "),
    );
    let progress = bar.clone();

    let builder = IndexBuilder::new(config, embedder).with_progress(Box::new(move |done, total| {
        progress.set_length(total as u64);
        progress.set_position(done as u64);
    }));
    let result = builder.run().await;
    bar.finish_and_clear();

    let (_, report) = result.context("index build failed")?;
    println!("{}", style("Index build complete").green().bold());
    println!("  Chunks:      {}", report.chunks);
    println!("  Vectors:     {}", report.stats.total_vectors);
    println!("  Dimension:   {}", report.stats.dimension);
    if report.zero_vectors > 0 {
        println!(
            "  {}",
            style(format!("{} chunks fell back to zero vectors", report.zero_vectors)).yellow()
        );
    }
    println!("  Elapsed:     {:.1?}", report.elapsed);
    println!("\nYou can now start the chatbot with: support-rag chat");
    Ok(())
}

/// Load the persisted index and construct providers
fn load_pipeline(config: &RagConfig) -> Result<RagPipeline> {
    let index = load_index(config)?;
    let embedder = build_embedder(config)?;
    let llm = build_llm(config)?;
    Ok(RagPipeline::new(config, Arc::new(index), embedder, llm))
}

fn load_index(config: &RagConfig) -> Result<VectorIndex> {
    let mut index = VectorIndex::from_config(config);
    if !index.load().context("failed to load vector index")? {
        bail!(
            "no index found in {}; run `support-rag build` first",
            config.paths.index_dir.display()
        );
    }
    Ok(index)
}

async fn chat(config: &RagConfig, use_history: bool) -> Result<()> {
    let pipeline = load_pipeline(config)?;

    println!("{}", style(&config.app_name).cyan().bold());
    println!("Ask a question. Commands: 'stats', 'clear', 'quit' or 'exit'.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(format!("{} ", style("You:").green().bold()).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "clear" => {
                pipeline.clear_history();
                println!("{}\n", style("Conversation history cleared.").dim());
            }
            "stats" => {
                let stats = pipeline.stats();
                println!("  Vectors:       {}", stats.index.total_vectors);
                println!("  Dimension:     {}", stats.index.dimension);
                println!("  Chunks:        {}", stats.index.total_chunks);
                println!("  History:       {} messages\n", stats.conversation_length);
            }
            _ => {
                print!("{} ", style("Assistant:").cyan().bold());
                pipeline
                    .stream_response(input, use_history, |token| {
                        print!("{}", token);
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!("\n");
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn ask(config: &RagConfig, question: &str, scores: bool, kind: QueryKind) -> Result<()> {
    let pipeline = load_pipeline(config)?;
    let outcome = pipeline.ask(question, kind).await;
    print_answer(&outcome, scores);
    if let Some(error) = outcome.error {
        bail!("query failed: {}", error);
    }
    Ok(())
}

fn print_answer(outcome: &QueryOutcome, show_scores: bool) {
    println!("{} {}\n", style("Assistant:").cyan().bold(), outcome.response);

    if show_scores {
        for (chunk, score) in outcome.chunks.iter().zip(&outcome.scores) {
            println!("  {:.3}  {}", score, style(&chunk.section).dim());
        }
        println!();
    }
}

fn stats(config: &RagConfig) -> Result<()> {
    let index = load_index(config)?;
    let stats = index.stats();
    println!("{}", style("Index statistics").bold());
    println!("  Location:    {}", index.index_dir().display());
    println!("  Vectors:     {}", stats.total_vectors);
    println!("  Dimension:   {}", stats.dimension);
    println!("  Chunks:      {}", stats.total_chunks);
    Ok(())
}

async fn evaluate(config: &RagConfig, cases: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let cases = match cases {
        Some(path) => EvalCase::load(&path)
            .with_context(|| format!("failed to read evaluation cases from {}", path.display()))?,
        None => EvalCase::default_set(),
    };
    let pipeline = load_pipeline(config)?;
    let total = cases.len();

    let report = run_evaluation(&pipeline, &cases, |i, result| {
        println!("\nTest {}/{}: {}", i + 1, total, result.question);
        println!("  Category:        {}", result.category);
        println!("  Keyword score:   {:.0}%", result.evaluation.keyword_score * 100.0);
        if !result.evaluation.missing_keywords.is_empty() {
            println!("  Missing:         {}", result.evaluation.missing_keywords.join(", "));
        }
        println!("  Chunks:          {}", result.num_chunks);
        println!("  Latency:         {} ms", result.latency_ms);
    })
    .await;

    let summary = &report.summary;
    println!("\n{}", style("Evaluation summary").bold());
    println!("  Questions:             {}", summary.total_questions);
    println!("  Average keyword score: {:.0}%", summary.average_keyword_score * 100.0);
    println!("  Success rate (>50%):   {:.0}%", summary.success_rate * 100.0);
    println!("  Average latency:       {:.0} ms", summary.average_latency_ms);
    for (category, score) in &summary.category_scores {
        println!("    {:<16} {:.0}%", category, score * 100.0);
    }

    let path = output.unwrap_or_else(|| config.paths.eval_report.clone());
    report.write(&path)?;
    println!("\nResults saved to {}", path.display());
    Ok(())
}
