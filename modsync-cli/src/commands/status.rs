//! `modsync status`: modules and sync points in the local registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use modsync_sync::local_registry::ModuleRecord;
use modsync_sync::{LocalRegistry, Visibility};

/// Arguments for `modsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Local registry directory [default: ~/.modsync/registry].
    #[arg(long)]
    pub registry_dir: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let registry_dir = match self.registry_dir {
            Some(dir) => dir,
            None => crate::default_registry_dir()?,
        };
        let registry = LocalRegistry::new(&registry_dir);
        let records = registry
            .list()
            .with_context(|| format!("failed to read registry at {}", registry_dir.display()))?;

        if self.json {
            print_json(&records)?;
            return Ok(());
        }
        print_table(&records);
        Ok(())
    }
}

#[derive(Serialize)]
struct ModuleStatusJson {
    module: String,
    visibility: String,
    default_branch: String,
    sync_points: Vec<SyncPointJson>,
    commits: usize,
}

#[derive(Serialize)]
struct SyncPointJson {
    branch: String,
    git_commit_hash: String,
    commit_name: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "module")]
    module: String,
    #[tabled(rename = "visibility")]
    visibility: String,
    #[tabled(rename = "default branch")]
    default_branch: String,
    #[tabled(rename = "sync points")]
    sync_points: String,
    #[tabled(rename = "commits")]
    commits: usize,
}

fn sync_points(record: &ModuleRecord) -> Vec<SyncPointJson> {
    record
        .sync_points
        .iter()
        .map(|(branch, hash)| SyncPointJson {
            branch: branch.clone(),
            git_commit_hash: hash.to_string(),
            commit_name: record.commits.get(hash).map(|c| c.commit_name.clone()),
        })
        .collect()
}

fn print_json(records: &[ModuleRecord]) -> Result<()> {
    let payload: Vec<ModuleStatusJson> = records
        .iter()
        .map(|record| ModuleStatusJson {
            module: record.identity.to_string(),
            visibility: record.visibility.to_string(),
            default_branch: record.default_branch.clone(),
            sync_points: sync_points(record),
            commits: record.commits.len(),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(records: &[ModuleRecord]) {
    println!(
        "modsync v{} | {} modules",
        env!("CARGO_PKG_VERSION"),
        records.len()
    );
    if records.is_empty() {
        println!("No modules in the registry. Run `modsync sync --create` first.");
        return;
    }

    let rows: Vec<StatusTableRow> = records
        .iter()
        .map(|record| {
            let points: Vec<String> = record
                .sync_points
                .iter()
                .map(|(branch, hash)| format!("{branch}@{}", hash.short()))
                .collect();
            StatusTableRow {
                module: record.identity.to_string().bold().to_string(),
                visibility: visibility_label(record.visibility),
                default_branch: record.default_branch.clone(),
                sync_points: if points.is_empty() {
                    "never synced".bright_black().to_string()
                } else {
                    points.join(", ")
                },
                commits: record.commits.len(),
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn visibility_label(visibility: Visibility) -> String {
    let label = visibility.to_string();
    match visibility {
        Visibility::Public => label.green().to_string(),
        Visibility::Private => label.yellow().to_string(),
    }
}
