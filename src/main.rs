use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use repospace::audit::find_duplicate_card_ids;
use repospace::config::{DefaultOrdering, WorkspaceConfig};
use repospace::deck_manager;
use repospace::metadata::Metadata;
use repospace::queue::{build_queue, BuildQueueInput, Selection};
use repospace::scanner::{scan, ScanOptions};
use repospace::scheduler::{schedule_review, Grade};
use repospace::snapshot::{build_deck_tree, snapshot_workspace, SnapshotOptions};

#[derive(Parser)]
#[command(name = "repospace", about = "File-backed spaced-repetition workspace engine")]
struct Cli {
    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,

    /// Path to an explicit TOML config file. Falls back to the per-OS confy location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recursively list discovered deck files under a workspace root.
    Scan {
        root: PathBuf,
        #[arg(long)]
        include_hidden: bool,
        #[arg(long = "ignore")]
        extra_ignore_patterns: Vec<String>,
    },
    /// Print the per-deck summary tree for a workspace, as JSON.
    Snapshot {
        root: PathBuf,
        #[arg(long)]
        include_hidden: bool,
        #[arg(long = "ignore")]
        extra_ignore_patterns: Vec<String>,
        /// RFC 3339 timestamp to evaluate dueness as of. Defaults to now.
        #[arg(long = "as-of")]
        as_of: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Build and print an ordered review queue over a selection, as JSON.
    Queue {
        root: PathBuf,
        /// One of `all`, `folder:<path>`, `deck:<path>`.
        #[arg(long)]
        selection: Selection,
        /// Named ordering strategy. Defaults to the configured default.
        #[arg(long, value_enum)]
        order: Option<CliOrdering>,
        /// Seed for the shuffle RNG, for deterministic scripting.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        include_hidden: bool,
        #[arg(long = "ignore")]
        extra_ignore_patterns: Vec<String>,
    },
    /// Print a single deck's parsed items and cards, as JSON.
    Show { deck_path: PathBuf },
    /// Grade a card and write the result back to its deck file.
    Grade { deck_path: PathBuf, card_id: String, grade: Grade },
    /// Report card ids that appear in more than one location across the workspace.
    AuditDuplicates {
        root: PathBuf,
        #[arg(long)]
        include_hidden: bool,
        #[arg(long = "ignore")]
        extra_ignore_patterns: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOrdering {
    NewFirstByDueDate,
    DueFirstByDueDate,
    NewFirstShuffled,
    NewFirstFileOrder,
    Shuffled,
}

impl From<CliOrdering> for DefaultOrdering {
    fn from(value: CliOrdering) -> Self {
        match value {
            CliOrdering::NewFirstByDueDate => DefaultOrdering::NewFirstByDueDate,
            CliOrdering::DueFirstByDueDate => DefaultOrdering::DueFirstByDueDate,
            CliOrdering::NewFirstShuffled => DefaultOrdering::NewFirstShuffled,
            CliOrdering::NewFirstFileOrder => DefaultOrdering::NewFirstFileOrder,
            CliOrdering::Shuffled => DefaultOrdering::Shuffled,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(cli.verbosity.into()).init();

    match cli.command {
        Commands::Scan { root, include_hidden, extra_ignore_patterns } => {
            let options = ScanOptions { include_hidden, extra_ignore_patterns };
            let entries = scan(&root, &options).with_context(|| format!("scanning {}", root.display()))?;
            for entry in entries {
                println!("{}", entry.relative_path);
            }
        }
        Commands::Snapshot { root, include_hidden, extra_ignore_patterns, as_of } => {
            let config = load_config(cli.config.as_deref())?;
            let options = snapshot_options_from_config(&config, include_hidden, extra_ignore_patterns, as_of);
            let snapshot = snapshot_workspace(&root, &options)
                .with_context(|| format!("snapshotting {}", root.display()))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Queue { root, selection, order, seed, include_hidden, extra_ignore_patterns } => {
            let config = load_config(cli.config.as_deref())?;
            let snapshot_options =
                snapshot_options_from_config(&config, include_hidden, extra_ignore_patterns, None);
            let snapshot = snapshot_workspace(&root, &snapshot_options)
                .with_context(|| format!("scanning {}", root.display()))?;
            let tree = build_deck_tree(snapshot.decks);
            let deck_paths = repospace::queue::collect_deck_paths_from_selection(&selection, &tree);

            let rng = seed.map(SmallRng::seed_from_u64).unwrap_or_else(SmallRng::from_os_rng);
            let strategy = match order {
                Some(named) => config.default_ordering_strategy_for(named.into(), rng),
                None => config.default_ordering_strategy(rng),
            };

            let mut input = BuildQueueInput::new(deck_paths, root, chrono::Utc::now(), &strategy);
            input.step_tables = config.scheduler.step_tables();
            let queue = build_queue(input);
            println!("{}", serde_json::to_string_pretty(&queue)?);
        }
        Commands::Show { deck_path } => {
            let parsed = deck_manager::read_deck(&deck_path)
                .with_context(|| format!("reading {}", deck_path.display()))?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Commands::Grade { deck_path, card_id, grade } => {
            let parsed = deck_manager::read_deck(&deck_path)
                .with_context(|| format!("reading {}", deck_path.display()))?;
            let card = find_card(&parsed, &card_id)
                .ok_or_else(|| anyhow!("card `{}` not found in {}", card_id, deck_path.display()))?;

            let result = schedule_review(card, grade, chrono::Utc::now())
                .with_context(|| format!("grading card `{}`", card_id))?;
            deck_manager::update_card_metadata(&deck_path, &card_id, result.updated_card.clone())
                .with_context(|| format!("writing graded card `{}` back to {}", card_id, deck_path.display()))?;
            println!("{}", serde_json::to_string_pretty(&result.scheduler_log)?);
        }
        Commands::AuditDuplicates { root, include_hidden, extra_ignore_patterns } => {
            let options = ScanOptions { include_hidden, extra_ignore_patterns };
            let duplicates = find_duplicate_card_ids(&root, &options)
                .with_context(|| format!("auditing {}", root.display()))?;
            println!("{}", serde_json::to_string_pretty(&duplicates)?);
        }
    }

    Ok(())
}

fn find_card<'a>(parsed: &'a repospace::file_codec::ParsedFile, card_id: &str) -> Option<&'a Metadata> {
    parsed.items.iter().flat_map(|item| item.cards.iter()).find(|c| c.id == card_id)
}

fn load_config(explicit_path: Option<&std::path::Path>) -> Result<WorkspaceConfig> {
    WorkspaceConfig::load(explicit_path).map_err(|e| anyhow!("loading configuration: {}", e))
}

fn snapshot_options_from_config(
    config: &WorkspaceConfig,
    include_hidden: bool,
    extra_ignore_patterns: Vec<String>,
    as_of: Option<chrono::DateTime<chrono::Utc>>,
) -> SnapshotOptions {
    let mut extra_ignore_patterns = extra_ignore_patterns;
    extra_ignore_patterns.extend(config.workspace.default_extra_ignore_patterns.iter().cloned());
    SnapshotOptions {
        include_hidden,
        extra_ignore_patterns,
        as_of,
        concurrency: config.workspace.snapshot_concurrency,
        learning_step_minutes: config.scheduler.learning_step_minutes.clone(),
        relearning_step_minutes: config.scheduler.relearning_step_minutes.clone(),
    }
}
