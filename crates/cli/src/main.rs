//! RepoMapper CLI — generates a ranked, token-budgeted repository map
//! from the terminal.
//!
//! Calls `repomapper-core` directly with no server overhead, mirroring
//! the teacher's direct-library-call CLI shape (`codescope-cli::main`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use repomapper_core::cache::TagCache;
use repomapper_core::pipeline::{get_repo_map, RepoMapOptions};
use repomapper_core::tokenizer::create_tokenizer;
use repomapper_core::PipelineConfig;

/// RepoMapper — ranked, token-budgeted repository maps for LLM context.
#[derive(Parser)]
#[command(name = "repomapper", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and print a repository map
    Map {
        /// Specific files to consider as map candidates. If empty, the
        /// whole tree under --root is walked (gitignore-aware).
        paths: Vec<PathBuf>,

        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Files already in the consumer's context: contribute
        /// structure but are suppressed from the rendered map.
        #[arg(long = "chat")]
        chat_files: Vec<PathBuf>,

        /// Relative path or bare filename hints that boost personalization.
        #[arg(long = "mention-file")]
        mentioned_fnames: Vec<String>,

        /// Identifiers whose defining edges get a weight boost.
        #[arg(long = "mention-ident")]
        mentioned_idents: Vec<String>,

        /// Bypass the on-disk tag cache for this run.
        #[arg(long)]
        force_refresh: bool,

        /// Token budget for the rendered map.
        #[arg(long, default_value = "4096")]
        max_map_tokens: i64,

        /// Hard ceiling; map tokens can never exceed this.
        #[arg(long)]
        max_context_window: Option<i64>,

        /// Token-counter backend (opaque to the core; "bytes-estimate" or "cl100k_base").
        #[arg(long, default_value = "bytes-estimate")]
        model: String,

        /// Drop zero-rank definitions before budget fitting.
        #[arg(long)]
        exclude_unranked: bool,

        /// Print the extraction/ranking report to stderr.
        #[arg(long, short)]
        verbose: bool,
    },
    /// Tag cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete the on-disk tag cache directory for this root
    Clear {
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().expect("could not determine current directory"))
}

/// Walk `root` for candidate files, gitignore-aware, skipping the
/// config's noise directories. Mirrors `scan::walk_files_parallel`'s
/// use of `ignore::WalkBuilder`.
fn walk_repo(root: &Path, config: &PipelineConfig) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let walker = ignore::WalkBuilder::new(root).hidden(false).git_ignore(true).build();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.components().any(|c| {
            c.as_os_str().to_str().map(|s| config.should_skip_dir(s)).unwrap_or(false)
        }) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else { continue };
        out.push((path.to_string_lossy().to_string(), rel.to_string_lossy().to_string()));
    }
    out
}

fn explicit_files(root: &Path, paths: &[PathBuf]) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|p| {
            let abs = if p.is_absolute() { p.clone() } else { root.join(p) };
            let rel = abs.strip_prefix(root).unwrap_or(p).to_string_lossy().to_string();
            Some((abs.to_string_lossy().to_string(), rel))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_files_resolves_relative_paths_against_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "").unwrap();
        let files = explicit_files(dir.path(), &[PathBuf::from("a.py")]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "a.py");
        assert!(PathBuf::from(&files[0].0).is_absolute());
    }

    #[test]
    fn walk_repo_skips_configured_noise_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target").join("generated.rs"), "").unwrap();
        std::fs::write(dir.path().join("lib.rs"), "").unwrap();
        let config = PipelineConfig::new(dir.path());
        let files = walk_repo(dir.path(), &config);
        assert!(files.iter().any(|(_, rel)| rel == "lib.rs"));
        assert!(!files.iter().any(|(_, rel)| rel.contains("generated.rs")));
    }

    #[test]
    fn resolve_root_defaults_to_current_dir() {
        let resolved = resolve_root(None);
        assert!(resolved.is_absolute());
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("repomapper=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Map {
            paths,
            root,
            chat_files,
            mentioned_fnames,
            mentioned_idents,
            force_refresh,
            max_map_tokens,
            max_context_window,
            model,
            exclude_unranked,
            verbose,
        } => {
            let root = resolve_root(root);
            let config = PipelineConfig::load(&root);
            let cache = TagCache::new(config.cache_dir());

            let other_files = if paths.is_empty() {
                walk_repo(&root, &config)
            } else {
                explicit_files(&root, &paths)
            };
            let chat_files = explicit_files(&root, &chat_files);

            let opts = RepoMapOptions {
                chat_files,
                other_files,
                mentioned_fnames: mentioned_fnames.into_iter().collect::<HashSet<_>>(),
                mentioned_idents: mentioned_idents.into_iter().collect::<HashSet<_>>(),
                force_refresh,
                max_map_tokens,
                max_context_window,
                exclude_unranked,
                token_counter: create_tokenizer(&model),
            };

            let (map, report) = get_repo_map(&cache, &opts);

            if verbose {
                if cli.json {
                    eprintln!("{}", serde_json::to_string_pretty(&report).unwrap());
                } else {
                    eprintln!(
                        "files considered: {}  defs: {}  refs: {}  excluded: {}  rank_fallback: {}",
                        report.total_files_considered,
                        report.definition_matches,
                        report.reference_matches,
                        report.excluded.len(),
                        report.rank_fallback,
                    );
                    for (path, reason) in &report.excluded {
                        eprintln!("  excluded {path}: {reason}");
                    }
                }
            }

            match map {
                Some(text) if cli.json => {
                    println!("{}", serde_json::json!({ "map": text }));
                }
                Some(text) => println!("{text}"),
                None if cli.json => println!("{}", serde_json::json!({ "map": null })),
                None => {}
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear { root } => {
                let root = resolve_root(root);
                let config = PipelineConfig::load(&root);
                let dir = config.cache_dir();
                match std::fs::remove_dir_all(&dir) {
                    Ok(()) => eprintln!("removed {}", dir.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        eprintln!("no cache at {}", dir.display());
                    }
                    Err(e) => {
                        eprintln!("could not remove {}: {e}", dir.display());
                        std::process::exit(1);
                    }
                }
            }
        },
    }
}
