//! srcfacts CLI - index file-unit trees, watch them, query the graph

use clap::{Parser, Subcommand};
use srcfacts::config::RepoConfig;
use srcfacts::pipeline;
use srcfacts::repository::FactRepository;
use srcfacts::scope::model::ScopeKindTag;
use srcfacts::watcher::DirectoryScanner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "srcfacts")]
#[command(version)]
#[command(about = "Incremental program-fact repository over syntactic source markup")]
#[command(long_about = r#"
srcfacts ingests per-file syntactic XML (srcML-style file units for C,
C++, Java, and C#), merges them into one global scope graph, and answers
queries over it:

  srcfacts index --path ./units --snapshot facts.bin
  srcfacts scope --snapshot facts.bin --file src/a.cpp --line 42
  srcfacts calls --snapshot facts.bin --file src/a.cpp --line 42
  srcfacts resolve --snapshot facts.bin --file src/a.cpp --line 42 --name foo
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every file unit under a directory and build the graph
    Index {
        /// Directory holding *.xml file units
        #[arg(short, long)]
        path: PathBuf,

        /// Snapshot file to write when done
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Parser worker count (default: hardware parallelism)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Keep the graph in sync with a directory of file units
    Watch {
        /// Directory holding *.xml file units
        #[arg(short, long)]
        path: PathBuf,

        /// Scan period in seconds
        #[arg(short, long)]
        interval: Option<f64>,

        /// Snapshot file to load on start and save after each sweep
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Innermost scope containing a location
    Scope {
        #[arg(short, long)]
        snapshot: PathBuf,

        /// File path as recorded in the graph
        #[arg(short, long)]
        file: String,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long, default_value = "1")]
        col: u32,

        /// Query by XPath into the file unit instead of line/column
        #[arg(long)]
        xpath: Option<String>,

        /// Restrict to the nearest enclosing scope of one kind
        /// (namespace, type, method, property, block)
        #[arg(short, long)]
        kind: Option<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Method calls containing a location, nearest first
    Calls {
        #[arg(short, long)]
        snapshot: PathBuf,

        #[arg(short, long)]
        file: String,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long, default_value = "1")]
        col: u32,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Resolve a name as seen from a location
    Resolve {
        #[arg(short, long)]
        snapshot: PathBuf,

        #[arg(short, long)]
        file: String,

        #[arg(short, long)]
        line: u32,

        #[arg(short, long, default_value = "1")]
        col: u32,

        #[arg(short, long)]
        name: String,
    },

    /// Show statistics about the graph
    Stats {
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Index { path, snapshot, jobs } => {
            let config = RepoConfig::default();
            let jobs = jobs.unwrap_or(config.parallelism);
            let repo = FactRepository::new(config);

            tracing::info!("indexing file units under {}", path.display());
            let units = pipeline::collect_units(&path)?;
            let stats = pipeline::bulk_ingest(&repo, units, jobs);

            println!("{}", stats);
            println!("{}", repo.stats());

            if let Some(snapshot) = snapshot {
                save_atomic(&repo, &snapshot)?;
                println!("snapshot written to {}", snapshot.display());
            }
        }

        Commands::Watch { path, interval, snapshot } => {
            let mut config = RepoConfig::default();
            if let Some(secs) = interval {
                config.scan_interval_secs = secs;
            }
            let interval = Duration::from_secs_f64(config.scan_interval_secs);
            let snapshot_existed = snapshot.as_ref().map_or(false, |p| p.exists());
            config.snapshot_path = snapshot.clone();

            let units = pipeline::collect_units(&path)?;
            // seed the scan baseline only when the graph was built from
            // these exact units; a loaded snapshot may be stale vs. disk
            let baseline: HashMap<String, String> = if snapshot_existed {
                HashMap::new()
            } else {
                units
                    .iter()
                    .map(|u| {
                        (
                            u.path.clone(),
                            blake3::hash(u.xml.as_bytes()).to_hex().to_string(),
                        )
                    })
                    .collect()
            };

            let repo = Arc::new(FactRepository::new(config));
            let stats = repo.initialize(units)?;
            tracing::info!("initialized: {}", stats);

            let _scanner =
                DirectoryScanner::start(Arc::clone(&repo), path.clone(), interval, baseline);
            println!("watching {} (every {:.0?})", path.display(), interval);

            loop {
                std::thread::sleep(interval);
                if let Some(snapshot) = &snapshot {
                    if let Err(e) = save_atomic(&repo, snapshot) {
                        tracing::error!(error = %e, "periodic snapshot save failed");
                    }
                }
            }
        }

        Commands::Scope { snapshot, file, line, col, xpath, kind, format } => {
            let repo = load_repo(&snapshot)?;
            let summary = match (&xpath, &kind) {
                (Some(xpath), _) => repo.find_scope_by_xpath(&file, xpath)?,
                (None, Some(kind)) => {
                    repo.find_enclosing_at(parse_kind(kind)?, &file, line, col)?
                }
                (None, None) => repo.find_scope_at(&file, line, col)?,
            };
            match summary {
                Some(summary) if format == "json" => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Some(summary) => {
                    println!(
                        "{:?} {} (depth {})",
                        summary.kind,
                        summary.qualified_name.as_deref().unwrap_or("<unnamed>"),
                        summary.depth
                    );
                    if let Some(loc) = &summary.location {
                        println!("  at {}", loc);
                    }
                }
                None => println!("no scope contains that location"),
            }
        }

        Commands::Calls { snapshot, file, line, col, format } => {
            let repo = load_repo(&snapshot)?;
            let calls = repo.find_method_calls_at(&file, line, col)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&calls)?);
            } else if calls.is_empty() {
                println!("no method calls contain that location");
            } else {
                for call in calls {
                    match &call.target {
                        Some(target) => println!("{}.{} at {}", target, call.name, call.location),
                        None => println!("{} at {}", call.name, call.location),
                    }
                }
            }
        }

        Commands::Resolve { snapshot, file, line, col, name } => {
            let repo = load_repo(&snapshot)?;
            let candidates = repo.resolve_at(&file, line, col, &name)?;
            if candidates.is_empty() {
                println!("'{}' does not resolve from that location", name);
            } else {
                for candidate in candidates {
                    println!("{}", candidate);
                }
            }
        }

        Commands::Stats { snapshot } => {
            let repo = load_repo(&snapshot)?;
            println!("{}", repo.stats());
        }
    }

    Ok(())
}

fn load_repo(snapshot: &Path) -> anyhow::Result<FactRepository> {
    let repo = FactRepository::new(RepoConfig::default());
    repo.load(snapshot)?;
    Ok(repo)
}

/// Snapshot writers are not crash-atomic; the caller provides atomicity
/// with a temp file and rename.
fn save_atomic(repo: &FactRepository, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("bin.tmp");
    repo.save(&tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn parse_kind(kind: &str) -> anyhow::Result<ScopeKindTag> {
    match kind.to_lowercase().as_str() {
        "program" => Ok(ScopeKindTag::Program),
        "namespace" | "ns" => Ok(ScopeKindTag::Namespace),
        "type" | "class" | "struct" => Ok(ScopeKindTag::Type),
        "method" | "function" => Ok(ScopeKindTag::Method),
        "property" => Ok(ScopeKindTag::Property),
        "block" => Ok(ScopeKindTag::Block),
        _ => anyhow::bail!("unknown scope kind '{}'", kind),
    }
}
