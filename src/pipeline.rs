//! One archive run: scan, report, archive, publish.

use std::path::PathBuf;

use crate::archive::{archive, ArchiveSummary};
use crate::error::Result;
use crate::filter::ExtensionSet;
use crate::publish::{PublishReport, PublishTarget, Publisher};
use crate::report::ScanStatistics;
use crate::scanner::{Manifest, Scanner};
use crate::vcs::{Credentials, VersionControlClient};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    pub output: PathBuf,
    pub extensions: ExtensionSet,
    /// Scan and report only.
    pub stats_only: bool,
    pub publish: Option<PublishTarget>,
    /// Parent directory for clone workspaces; system temp dir when `None`.
    pub workspace_root: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        RunOptions {
            root: root.into(),
            output: output.into(),
            extensions: ExtensionSet::new(),
            stats_only: false,
            publish: None,
            workspace_root: None,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub manifest: Manifest,
    pub statistics: ScanStatistics,
    pub archive: Option<ArchiveSummary>,
    pub publish: Option<PublishReport>,
}

/// Run the pipeline.
///
/// The scan root is checked before anything else. When publishing, the
/// identity is read from `client`'s global configuration before the archive
/// is written, so missing credentials leave the destination untouched.
pub fn run(options: &RunOptions, client: &dyn VersionControlClient) -> Result<RunOutcome> {
    let scanner = Scanner::new(&options.root)?.exclude_dir(&options.output);

    let credentials = match (&options.publish, options.stats_only) {
        (Some(_), false) => Some(Credentials::from_global_config(client)?),
        _ => None,
    };

    let manifest = scanner.scan(&options.extensions);
    let statistics = ScanStatistics::from_manifest(&manifest);

    if options.stats_only {
        return Ok(RunOutcome {
            manifest,
            statistics,
            archive: None,
            publish: None,
        });
    }

    let summary = archive(&manifest, &options.output, &options.root)?;

    let publish = match (&options.publish, &credentials) {
        (Some(target), Some(credentials)) => {
            let mut publisher = Publisher::new(client);
            if let Some(dir) = &options.workspace_root {
                publisher = publisher.with_workspace_root(dir);
            }
            Some(publisher.publish(&summary.destination, target, credentials)?)
        }
        _ => None,
    };

    Ok(RunOutcome {
        manifest,
        statistics,
        archive: Some(summary),
        publish,
    })
}
