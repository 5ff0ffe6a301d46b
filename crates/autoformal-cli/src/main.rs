//! Autoformal CLI
//!
//! The `autoformal` command formalizes batches of solved programs into Lean 4.
//!
//! ## Commands
//!
//! - `run`: formalize a JSONL file of work items
//! - `status`: summarize the records in an output directory
//! - `render`: print the Lean file for one stored record

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use autoformal_backends::{ChatGenerationClient, LeanCompiler};
use autoformal_core::telemetry::{init_tracing, level_for_verbosity};
use autoformal_core::{
    render_lean_file, BatchDriver, BatchSummary, FormalizationPipeline, ItemResult, ItemStatus,
    PipelineConfig, ResultStore, WorkItem,
};
use clap::{ArgAction, Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "autoformal")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler-guided autoformalization of solved programs into Lean 4", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Formalize every work item in a JSONL file
    Run {
        /// Pipeline configuration (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Work items, one JSON object per line
        #[arg(short, long)]
        items: PathBuf,

        /// Process only the first N items
        #[arg(long)]
        limit: Option<usize>,

        /// Maximum items in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip items that already have a resolved record
        #[arg(long)]
        resume: bool,
    },

    /// Summarize the records in an output directory
    Status {
        /// Output directory
        #[arg(short, long, default_value = "output/formalized")]
        dir: PathBuf,
    },

    /// Print the Lean file for a stored record
    Render {
        /// Path to the record's JSON file
        #[arg(short, long)]
        record: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Run {
            config,
            items,
            limit,
            concurrency,
            output,
            resume,
        } => {
            let config = load_config(config.as_deref(), limit, concurrency, output)?;
            cmd_run(&config, &items, resume).await
        }
        Commands::Status { dir } => cmd_status(&dir, cli.json),
        Commands::Render { record } => cmd_render(&record),
    }
}

/// Load the configuration file (or defaults) and apply flag overrides.
fn load_config(
    path: Option<&Path>,
    limit: Option<usize>,
    concurrency: Option<usize>,
    output: Option<PathBuf>,
) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => PipelineConfig::default(),
    };
    if limit.is_some() {
        config.batch.limit = limit;
    }
    if let Some(concurrency) = concurrency {
        config.batch.concurrency = concurrency;
    }
    if let Some(output) = output {
        config.output.dir = output;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Read work items from a JSONL file, skipping blank lines.
fn read_items(path: &Path) -> Result<Vec<WorkItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read work items from {:?}", path))?;
    let mut items = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: WorkItem = serde_json::from_str(line)
            .with_context(|| format!("Invalid work item on line {} of {:?}", index + 1, path))?;
        items.push(item);
    }
    Ok(items)
}

/// Persists records on the blocking pool as results arrive.
struct RecordWriter {
    store: ResultStore,
    pending: JoinSet<bool>,
}

impl RecordWriter {
    fn new(store: ResultStore) -> Self {
        Self {
            store,
            pending: JoinSet::new(),
        }
    }

    fn submit(&mut self, result: &ItemResult) {
        let store = self.store.clone();
        let result = result.clone();
        self.pending.spawn_blocking(move || match store.write(&result) {
            Ok(_) => true,
            Err(err) => {
                warn!(item_id = %result.item_id, error = %err, "failed to write record");
                false
            }
        });
    }

    /// Wait for every submitted write; returns how many succeeded.
    async fn finish(mut self) -> usize {
        let mut written = 0;
        while let Some(joined) = self.pending.join_next().await {
            match joined {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => warn!(error = %err, "record writer task failed"),
            }
        }
        written
    }
}

fn pending_items(items: Vec<WorkItem>, resolved: &BTreeSet<String>) -> Vec<WorkItem> {
    items
        .into_iter()
        .filter(|item| !resolved.contains(&item.id))
        .collect()
}

async fn cmd_run(config: &PipelineConfig, items_path: &Path, resume: bool) -> Result<()> {
    let batch_id = Uuid::new_v4();
    let store = ResultStore::new(&config.output.dir);

    let mut items = read_items(items_path)?;
    let submitted = items.len();
    if resume {
        let resolved = store
            .resolved_ids()
            .context("Failed to read existing records")?;
        items = pending_items(items, &resolved);
        info!(
            %batch_id,
            skipped = submitted - items.len(),
            "resuming: skipping resolved items"
        );
    }

    let oracle = LeanCompiler::new(config.compiler.clone())
        .context("Failed to configure Lean compiler")?;
    let generator = ChatGenerationClient::new().context("Failed to build HTTP client")?;
    let pipeline = FormalizationPipeline::new(config, Arc::new(oracle), Arc::new(generator));
    let driver = BatchDriver::new(Arc::new(pipeline), config.batch.clone());

    info!(
        %batch_id,
        items = items.len(),
        concurrency = config.batch.concurrency,
        output = %config.output.dir.display(),
        "batch starting"
    );

    let mut writer = RecordWriter::new(store.clone());
    let results = driver
        .run_batch_with(items, |result| writer.submit(result))
        .await;
    let written = writer.finish().await;
    if written < results.len() {
        warn!(
            %batch_id,
            written,
            results = results.len(),
            "some records were not written"
        );
    }

    let run_summary = BatchSummary::from_results(&results);
    println!("Batch {batch_id}");
    println!("{run_summary}");

    let all = store.load_all().context("Failed to read records")?;
    let path = store
        .write_summary(&BatchSummary::from_results(&all))
        .context("Failed to write summary")?;
    println!("\nRecords: {}", store.dir().display());
    println!("Summary: {}", path.display());

    Ok(())
}

fn cmd_status(dir: &Path, json: bool) -> Result<()> {
    let store = ResultStore::new(dir);
    let results = store
        .load_all()
        .with_context(|| format!("Failed to read records in {:?}", dir))?;
    let summary = BatchSummary::from_results(&results);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{summary}");
    let unresolved: Vec<&ItemResult> = results
        .iter()
        .filter(|r| r.status != ItemStatus::Success)
        .collect();
    if !unresolved.is_empty() {
        println!("\n{:<24} {:<16} {:>6} {:>6} {:>6}", "ITEM", "STATUS", "REFINE", "JUDGE", "SCORE");
        for result in unresolved {
            println!(
                "{:<24} {:<16} {:>6} {:>6} {:>6}",
                truncate(&result.item_id, 24),
                result.status.as_str(),
                result.counts.refine + result.counts.judge_refine,
                result.counts.judge,
                result
                    .judge_score
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
            );
        }
    }
    Ok(())
}

fn cmd_render(record: &Path) -> Result<()> {
    let result = ResultStore::load_path(record)
        .with_context(|| format!("Failed to load record {:?}", record))?;
    let (Some(signature), Some(artifact)) = (&result.signature, &result.artifact) else {
        bail!("Record {} has no artifact to render", result.item_id);
    };
    print!("{}", render_lean_file(signature, artifact));
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
