//! CLI entry point for the codevec vector store.
//!
//! Administers collections in the configured index directory: create and
//! inspect them, load points from JSON lines, search, page through points and
//! force ANN rebuilds.

use anyhow::{Context, Result, anyhow, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codevec::display::{collection_info_table, health_table, search_results_table};
use codevec::{
    EmbeddingProvider, FilesystemVectorStore, Filter, ScrollRequest, SearchHit, SearchParams,
    Settings, VectorPoint, WriteMode,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Filesystem vector store for semantic code search
#[derive(Parser)]
#[command(
    name = "codevec",
    version = env!("CARGO_PKG_VERSION"),
    about = "Filesystem vector store for semantic code search",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up .codevec directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// List collections
    Collections,

    /// Create a collection
    Create {
        name: String,
        /// Embedding dimensionality
        #[arg(long)]
        size: usize,
    },

    /// Remove a collection and all its points
    Delete { name: String },

    /// Show collection statistics
    Info { name: String },

    /// Count points in a collection
    Count { name: String },

    /// List source files with indexed chunks
    Files { name: String },

    /// Load points from a JSON-lines file (one point per line)
    Upsert {
        name: String,
        file: PathBuf,
        /// Update the ANN index per batch instead of once at the end
        #[arg(long)]
        watch: bool,
        /// Points per upsert call
        #[arg(long, default_value_t = 256)]
        batch: usize,
    },

    /// Delete points by id
    DeletePoints {
        name: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch one point by id
    Get { name: String, id: String },

    /// Rebuild the ANN index from the point files
    Rebuild { name: String },

    /// Report whether the ANN index needs a rebuild
    Stale { name: String },

    /// Page through points
    Scroll {
        name: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Offset returned by the previous page
        #[arg(long)]
        offset: Option<String>,
        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,
        /// Include vectors in the output
        #[arg(long)]
        with_vector: bool,
    },

    /// Search a collection
    Search {
        name: String,
        /// Query text (requires the `fastembed` feature)
        query: Option<String>,
        /// JSON file holding the query vector as an array of numbers
        #[arg(long, conflicts_with = "query")]
        vector_file: Option<PathBuf>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,
        /// Query-time accuracy knob
        #[arg(long)]
        ef: Option<usize>,
    },

    /// Check that the index directory is usable
    Health,
}

fn main() {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Init { .. }) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let settings = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };
    codevec::logging::init(&settings.logging, settings.debug);

    if let Err(e) = run(cli, settings) {
        eprintln!("Error: {e:#}");
        if let Some(store_error) = e.downcast_ref::<codevec::StoreError>() {
            for suggestion in store_error.recovery_suggestions() {
                eprintln!("  - {suggestion}");
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        command => {
            let store = FilesystemVectorStore::open(&settings)?;
            run_store_command(&store, command, cli.json)
        }
    }
}

fn run_store_command(store: &FilesystemVectorStore, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Collections => {
            let names = store.list_collections()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No collections in {}", store.base_path().display());
            } else {
                names.iter().for_each(|name| println!("{name}"));
            }
        }
        Commands::Create { name, size } => {
            if store.create_collection(&name, size)? {
                println!("Created collection '{name}' ({size} dimensions)");
            } else {
                println!("Collection '{name}' already exists");
            }
        }
        Commands::Delete { name } => {
            if store.delete_collection(&name)? {
                println!("Deleted collection '{name}'");
            } else {
                println!("Collection '{name}' does not exist");
            }
        }
        Commands::Info { name } => {
            let info = store.collection_info(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", collection_info_table(&info));
            }
        }
        Commands::Count { name } => println!("{}", store.count_points(&name)?),
        Commands::Files { name } => {
            let files = store.get_all_indexed_files(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                files.iter().for_each(|file| println!("{file}"));
            }
        }
        Commands::Upsert {
            name,
            file,
            watch,
            batch,
        } => upsert_from_file(store, &name, &file, watch, batch.max(1))?,
        Commands::DeletePoints { name, ids } => {
            let mode = WriteMode::Watch;
            let removed = store.delete_points(&name, &ids, mode)?;
            println!("Deleted {removed} of {} points", ids.len());
        }
        Commands::Get { name, id } => match store.get_point(&name, &id)? {
            Some(point) => println!("{}", serde_json::to_string_pretty(&point)?),
            None => bail!("point '{id}' not found in '{name}'"),
        },
        Commands::Rebuild { name } => {
            let started = Instant::now();
            let count = store.rebuild_index(&name)?;
            println!(
                "Rebuilt ANN index of '{name}' with {count} vectors in {:.2?}",
                started.elapsed()
            );
        }
        Commands::Stale { name } => {
            let stale = store.is_index_stale(&name)?;
            println!("{}", if stale { "stale" } else { "fresh" });
        }
        Commands::Scroll {
            name,
            limit,
            offset,
            filter,
            with_vector,
        } => {
            let request = ScrollRequest {
                limit,
                offset,
                with_payload: true,
                with_vector,
                filter: filter.as_deref().map(Filter::from_json_str).transpose()?,
            };
            let page = store.scroll_points(&name, &request)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Search {
            name,
            query,
            vector_file,
            limit,
            threshold,
            filter,
            ef,
        } => {
            let params = SearchParams {
                limit: limit.unwrap_or(store.settings().search.default_limit),
                score_threshold: threshold,
                filter: filter.as_deref().map(Filter::from_json_str).transpose()?,
                ef,
                ..SearchParams::default()
            };
            let hits = match (query, vector_file) {
                (_, Some(path)) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let vector: Vec<f32> = serde_json::from_str(&text)
                        .with_context(|| format!("{} is not a JSON number array", path.display()))?;
                    store.search_by_vector(&name, &vector, &params)?
                }
                (Some(query), None) => {
                    let provider = embedding_provider(store)?;
                    store.search(&name, &query, provider.as_ref(), &params)?
                }
                (None, None) => bail!("provide a query or --vector-file"),
            };
            print_hits(&hits, json)?;
        }
        Commands::Health => {
            let report = store.health_check();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", health_table(&report));
            }
            if !report.is_healthy() {
                bail!("index directory is not usable");
            }
        }
        Commands::Init { .. } | Commands::Config => unreachable!("handled before opening the store"),
    }
    Ok(())
}

fn print_hits(hits: &[SearchHit], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
    } else if hits.is_empty() {
        println!("No results");
    } else {
        println!("{}", search_results_table(hits));
    }
    Ok(())
}

fn upsert_from_file(
    store: &FilesystemVectorStore,
    name: &str,
    file: &Path,
    watch: bool,
    batch: usize,
) -> Result<()> {
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    let mode = if watch {
        WriteMode::Watch
    } else {
        WriteMode::Batch
    };

    if mode == WriteMode::Batch {
        store.begin_indexing(name)?;
    }
    let started = Instant::now();
    let mut pending = Vec::with_capacity(batch);
    let mut total = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let point: VectorPoint = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid point", file.display(), number + 1))?;
        pending.push(point);
        if pending.len() == batch {
            total += store
                .upsert_points(name, std::mem::take(&mut pending), mode)?
                .upserted;
        }
    }
    if !pending.is_empty() {
        total += store.upsert_points(name, pending, mode)?.upserted;
    }

    if mode == WriteMode::Batch {
        let summary = store.end_indexing(name, false)?;
        println!(
            "Upserted {total} points into '{name}' in {:.2?}: {} vectors across {} files ({:?})",
            started.elapsed(),
            summary.vectors,
            summary.unique_files,
            summary.ann_update
        );
    } else {
        println!("Upserted {total} points into '{name}' in {:.2?}", started.elapsed());
    }
    Ok(())
}

#[cfg(feature = "fastembed")]
fn embedding_provider(store: &FilesystemVectorStore) -> Result<Box<dyn EmbeddingProvider>> {
    let cache_dir = store.base_path().join("models");
    Ok(Box::new(codevec::embedding::FastEmbedProvider::new(
        cache_dir,
    )?))
}

#[cfg(not(feature = "fastembed"))]
fn embedding_provider(_store: &FilesystemVectorStore) -> Result<Box<dyn EmbeddingProvider>> {
    bail!("text queries need the `fastembed` feature; use --vector-file instead")
}
