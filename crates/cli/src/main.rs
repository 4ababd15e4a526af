//! cairn CLI — index and query a codecairn semantic index from the
//! terminal, with no server process involved.

use clap::{Parser, Subcommand};
use codecairn_core::chunk::ChunkKind;
use codecairn_core::tool_surface::SearchMode;
use codecairn_core::ToolSurface;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cairn", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// (Re)build the semantic index
    Index {
        /// Ignore existing state and rebuild from scratch
        #[arg(long)]
        force: bool,
    },
    /// Search the index
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        top_k: usize,
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: CliSearchMode,
        #[arg(long, default_value = "0.5")]
        bm25_weight: f64,
    },
    /// Fuzzy-match a symbol name
    FuzzyFind {
        symbol: String,
        #[arg(long)]
        symbol_type: Option<String>,
    },
    /// Show all chunks for one file
    FileContext {
        filepath: String,
        #[arg(long)]
        include_related: bool,
    },
    /// Report whether the index is stale
    Stale,
    /// Show index statistics
    Status,
    /// Show the active configuration
    Config,
    /// List indexed files with chunk counts
    Files,
}

#[derive(Clone, clap::ValueEnum)]
enum CliSearchMode {
    Hybrid,
    Vector,
    Bm25,
    Fuzzy,
}

impl From<CliSearchMode> for SearchMode {
    fn from(mode: CliSearchMode) -> Self {
        match mode {
            CliSearchMode::Hybrid => SearchMode::Hybrid,
            CliSearchMode::Vector => SearchMode::Vector,
            CliSearchMode::Bm25 => SearchMode::Bm25,
            CliSearchMode::Fuzzy => SearchMode::Fuzzy,
        }
    }
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
}

fn parse_kind(s: &str) -> Option<ChunkKind> {
    match s {
        "function" => Some(ChunkKind::Function),
        "class" => Some(ChunkKind::Class),
        "method" => Some(ChunkKind::Method),
        "module" => Some(ChunkKind::Module),
        _ => None,
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap());
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codecairn=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let root = resolve_root(cli.root);
    let surface = ToolSurface::open(&root)?;

    match cli.command {
        Command::Index { force } => match surface.index(force) {
            Ok(outcome) => {
                if cli.json {
                    print_json(&outcome);
                } else {
                    println!("{}", outcome.message);
                }
            }
            Err(e) => fail(&e, cli.json),
        },
        Command::Search { query, top_k, mode, bm25_weight } => {
            match surface.search(&query, top_k, mode.into(), bm25_weight) {
                Ok(outcome) => {
                    if cli.json {
                        print_json(&outcome);
                    } else {
                        if let Some(warning) = &outcome.stale_warning {
                            eprintln!("warning: {warning}");
                        }
                        for r in &outcome.results.results {
                            println!("{:<50} {:>6.3}  {}:{}-{}", r.name, r.score, r.filepath, r.start_line, r.end_line);
                        }
                        eprintln!("\n{} result(s) ({})", outcome.results.results.len(), outcome.results.search_type);
                    }
                }
                Err(e) => fail(&e, cli.json),
            }
        }
        Command::FuzzyFind { symbol, symbol_type } => {
            let kind = symbol_type.as_deref().and_then(parse_kind);
            match surface.fuzzy_find(&symbol, kind) {
                Ok(results) => {
                    if cli.json {
                        print_json(&results);
                    } else {
                        for r in &results.results {
                            println!("{:<40} {:>6.3}  {}:{}", r.name, r.score, r.filepath, r.start_line);
                        }
                    }
                }
                Err(e) => fail(&e, cli.json),
            }
        }
        Command::FileContext { filepath, include_related } => {
            match surface.get_file_context(&filepath, include_related) {
                Ok(context) => {
                    if cli.json {
                        print_json(&context);
                    } else {
                        for chunk in &context.chunks {
                            println!("{:>5}-{:<5} {:<10} {}", chunk.start_line, chunk.end_line, chunk.name, chunk.text.lines().next().unwrap_or(""));
                        }
                        if !context.related_files.is_empty() {
                            println!("\nrelated: {}", context.related_files.join(", "));
                        }
                    }
                }
                Err(e) => fail(&e, cli.json),
            }
        }
        Command::Stale => match surface.get_stale_status() {
            Ok(status) => {
                if cli.json {
                    print_json(&status);
                } else {
                    println!("{}", status.message);
                    for f in &status.stale_files {
                        println!("  {f}");
                    }
                }
            }
            Err(e) => fail(&e, cli.json),
        },
        Command::Status => match surface.status() {
            Ok(status) => {
                if cli.json {
                    print_json(&status);
                } else {
                    println!("files:  {}", status.total_files);
                    println!("chunks: {}", status.total_chunks);
                }
            }
            Err(e) => fail(&e, cli.json),
        },
        Command::Config => match surface.config() {
            Ok(config) => print_json(&config),
            Err(e) => fail(&e, cli.json),
        },
        Command::Files => match surface.files() {
            Ok(files) => {
                if cli.json {
                    print_json(&files);
                } else {
                    for f in &files {
                        println!("{:<50} {:>4} chunks  [{}]", f.filepath, f.chunk_count, f.kinds.join(", "));
                    }
                }
            }
            Err(e) => fail(&e, cli.json),
        },
    }

    Ok(())
}

fn fail(err: &codecairn_core::ToolError, json: bool) -> ! {
    if json {
        print_json(err);
    } else {
        eprintln!("error ({}): {}", err.kind, err.message);
    }
    std::process::exit(1);
}
