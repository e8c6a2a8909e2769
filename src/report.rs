use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

use crate::archive::ArchiveSummary;
use crate::filter::extension_of;
use crate::publish::{CommitKind, PublishReport};
use crate::scanner::Manifest;

/// Grouping key for files without an extension.
pub const NO_EXTENSION: &str = "[no extension]";

/// Summary of one scan, grouped by file extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Files per extension, in sorted order.
    pub by_extension: BTreeMap<String, usize>,
    /// Entries the scan could not read.
    #[serde(default)]
    pub skipped: usize,
}

impl ScanStatistics {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut by_extension = BTreeMap::new();
        let mut total_bytes = 0u64;

        for file in manifest.files() {
            let ext = extension_of(file).unwrap_or(NO_EXTENSION);
            *by_extension.entry(ext.to_string()).or_insert(0) += 1;
            total_bytes += fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        }

        ScanStatistics {
            total_files: manifest.len(),
            total_bytes,
            by_extension,
            skipped: manifest.skipped().len(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize statistics")
    }
}

/// Print the statistics block.
pub fn print_statistics(stats: &ScanStatistics) {
    println!();
    println!("{}", "Workshop Statistics".bold().cyan());
    println!("{}", "=".repeat(20).cyan());
    println!(
        "  {}: {}",
        "Total files collected".cyan(),
        stats.total_files.to_string().bold()
    );
    println!("  {}: {}", "Total size".cyan(), format_bytes(stats.total_bytes));
    if stats.skipped > 0 {
        println!(
            "  {}: {}",
            "Unreadable entries".yellow(),
            stats.skipped.to_string().yellow()
        );
    }

    if stats.by_extension.is_empty() {
        return;
    }

    println!();
    println!("{}", "Files by type:".bold());
    for (ext, count) in &stats.by_extension {
        println!("  {ext}: {count}");
    }
}

pub fn print_archive_summary(summary: &ArchiveSummary) {
    println!();
    println!(
        "{} Archive created with {} files ({})",
        "✓".green(),
        summary.copied.len().to_string().bold(),
        format_bytes(summary.bytes_copied)
    );
    println!("  {}: {}", "Location".cyan(), summary.destination.display());

    for skipped in &summary.skipped {
        println!(
            "  {} Could not copy {}: {}",
            "⚠".yellow(),
            skipped.path.display(),
            skipped.reason.dimmed()
        );
    }
}

pub fn print_publish_report(report: &PublishReport, repository_url: &str) {
    println!();
    if report.commit_kind == CommitKind::Empty {
        println!(
            "  {} No changes since the last publish, created an empty commit",
            "Note:".yellow()
        );
    }

    match &report.pushed_branch {
        Some(branch) => {
            println!(
                "{} Pushed branch '{}' to {}",
                "✓".green(),
                branch.bold(),
                repository_url
            );
        }
        None => {
            println!(
                "{} Push failed, the commit is kept in {}",
                "⚠".yellow(),
                report.working_copy.display()
            );
            if let Some(output) = &report.push_output {
                println!("  {}", output.dimmed());
            }
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
