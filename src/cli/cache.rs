use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use task_cache::fs::{cache_file_path, check_tool_version, read_cache_file};
use task_cache::{sanitize_cache_id, CacheFile, CacheRecord};
use tracing::info;

use crate::config::TaplineConfig;

#[derive(Args, Clone, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// Print the prompt groups of a cache file
    Inspect {
        /// Cache id, as passed to the driver
        cache_id: String,

        /// Print the raw file instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Delete a cache file
    Clear {
        /// Cache id, as passed to the driver
        cache_id: String,
    },

    /// Check a cache file for an unsupported version and malformed records
    Lint {
        /// Path to a `.cache.json` file
        path: PathBuf,
    },
}

pub async fn cmd_cache(args: CacheArgs, config: &TaplineConfig) -> Result<()> {
    match args.action {
        CacheAction::Inspect { cache_id, json } => {
            let path = resolve(config, &cache_id)?;
            let file = read_cache_file(&path)
                .with_context(|| format!("Failed to read cache file {}", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&file)?);
            } else {
                print!("{}", render(&file, &path));
            }
        }
        CacheAction::Clear { cache_id } => {
            let path = resolve(config, &cache_id)?;
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            info!(path = %path.display(), "cache file deleted");
            println!("Deleted {}", path.display());
        }
        CacheAction::Lint { path } => {
            let issues = lint(&path)?;
            if !issues.is_empty() {
                for issue in &issues {
                    println!("{}: {issue}", path.display());
                }
                bail!("{} problem(s) found in {}", issues.len(), path.display());
            }
            println!("{}: ok", path.display());
        }
    }
    Ok(())
}

/// Path of an existing cache file for `cache_id`.
fn resolve(config: &TaplineConfig, cache_id: &str) -> Result<PathBuf> {
    let id = sanitize_cache_id(cache_id);
    if id.is_empty() {
        bail!("Cache id must not be empty");
    }
    let path = cache_file_path(&config.cache.cache_dir(), &id);
    if !path.exists() {
        bail!("No cache file for '{cache_id}' at {}", path.display());
    }
    Ok(path)
}

/// Version and structure problems of the file at `path`.
pub fn lint(path: &Path) -> Result<Vec<String>> {
    let file = read_cache_file(path)
        .with_context(|| format!("Failed to read cache file {}", path.display()))?;
    let mut issues = Vec::new();
    if let Err(err) = check_tool_version(&file.tool_version) {
        issues.push(err.to_string());
    }
    issues.extend(file.lint());
    Ok(issues)
}

pub fn render(file: &CacheFile, path: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cache {} ({})", file.cache_id, path.display());
    let _ = writeln!(out, "  tool version: {}", file.tool_version);
    if !file.package_name.is_empty() {
        let _ = writeln!(
            out,
            "  package: {}@{}",
            file.package_name, file.package_version
        );
    }
    let _ = writeln!(
        out,
        "  {} group(s), {} record(s)",
        file.prompt_groups.len(),
        file.record_count()
    );
    for (index, group) in file.prompt_groups.iter().enumerate() {
        let _ = writeln!(out, "[{index}] {:?}", group.prompt);
        for record in &group.records {
            match record {
                CacheRecord::Locate { xpaths, .. } => {
                    let _ = writeln!(out, "    locate  {}", xpaths.join(" | "));
                }
                CacheRecord::Plan {
                    page_context,
                    response,
                    ..
                }
                | CacheRecord::UiTarsPlan {
                    page_context,
                    response,
                    ..
                } => {
                    let rounds = response
                        .get("rounds")
                        .and_then(|rounds| rounds.as_array())
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    let actions: usize = rounds
                        .iter()
                        .filter_map(|round| round.as_array())
                        .map(Vec::len)
                        .sum();
                    let _ = writeln!(
                        out,
                        "    {:<7} {} action(s) in {} round(s) at {}x{}",
                        record.kind().as_str(),
                        actions,
                        rounds.len(),
                        page_context.size.width,
                        page_context.size.height
                    );
                }
            }
        }
    }
    out
}
