use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use workshop_archive::config::{self, ArchiveConfig, ConfigManager, ConfigUpdate, DEFAULT_OUTPUT};
use workshop_archive::filter::ExtensionSet;
use workshop_archive::logger;
use workshop_archive::pipeline::{self, RunOptions};
use workshop_archive::publish::PublishTarget;
use workshop_archive::report;
use workshop_archive::vcs::GitCli;
use workshop_archive::VerbosityLevel;

#[derive(Parser)]
#[command(name = "workshop-archive")]
#[command(about = "Collect workshop sources and documents into an archive, optionally publishing it to git", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Config file to use instead of the default location
    #[arg(long = "config-file", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Show debug output, including every git command
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Root directory to scan
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Output archive directory [default: ./workshop-archive]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File extensions to include, comma-separated (e.g. .cpp,.h,.md)
    #[arg(short, long)]
    ext: Option<String>,

    /// Display statistics only (no archive creation)
    #[arg(short, long)]
    stats: bool,

    /// Print statistics as JSON (with --stats)
    #[arg(long, requires = "stats")]
    json: bool,

    /// Repository URL to publish the archive to
    #[arg(long, visible_alias = "github")]
    publish: Option<String>,

    /// Folder inside the repository to place the archive in
    #[arg(long)]
    folder: Option<String>,

    /// Branch to commit to and push
    #[arg(long)]
    branch: Option<String>,

    /// Skip the banner
    #[arg(long)]
    no_banner: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update the stored defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Default extensions (comma-separated, empty for all files)
        #[arg(long)]
        set_extensions: Option<String>,

        /// Default archive directory
        #[arg(long)]
        set_output: Option<PathBuf>,

        /// Default repository URL (empty to disable publishing)
        #[arg(long)]
        set_repository: Option<String>,

        /// Default folder inside the repository
        #[arg(long)]
        set_folder: Option<String>,

        /// Default branch
        #[arg(long)]
        set_branch: Option<String>,

        /// Upper bound on each git command, in seconds
        #[arg(long)]
        set_timeout: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let verbosity = if cli.verbose {
        VerbosityLevel::Verbose
    } else if cli.quiet {
        VerbosityLevel::Quiet
    } else {
        VerbosityLevel::Normal
    };
    logger::init_logger(verbosity);

    match dispatch(cli, verbosity) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger::log_to_file(&format!("Run failed: {e:#}"));
            eprintln!("\n{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, verbosity: VerbosityLevel) -> Result<()> {
    let config_path = match cli.config_file {
        Some(path) => path,
        None => ConfigManager::config_file_path()?,
    };

    match cli.command {
        Some(Commands::Config {
            show,
            set_extensions,
            set_output,
            set_repository,
            set_folder,
            set_branch,
            set_timeout,
        }) => {
            let update = ConfigUpdate {
                extensions: set_extensions,
                output: set_output,
                repository_url: set_repository,
                folder: set_folder,
                branch: set_branch,
                command_timeout_secs: set_timeout,
            };
            let has_update = update.extensions.is_some()
                || update.output.is_some()
                || update.repository_url.is_some()
                || update.folder.is_some()
                || update.branch.is_some()
                || update.command_timeout_secs.is_some();

            if has_update {
                config::update_config(&config_path, update)?;
            }
            if show || !has_update {
                config::show_config(&config_path)?;
            }
            Ok(())
        }
        None => run_archive(cli.run, &config_path, verbosity),
    }
}

fn run_archive(args: RunArgs, config_path: &std::path::Path, verbosity: VerbosityLevel) -> Result<()> {
    let file_config = ArchiveConfig::load_from(config_path)?;
    let _ = logger::rotate_log_if_needed();

    let extensions = match &args.ext {
        Some(list) => ExtensionSet::parse(list),
        None => file_config.extensions.clone(),
    };
    let output = args
        .output
        .clone()
        .or_else(|| file_config.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let publish = match &args.publish {
        Some(url) => Some(PublishTarget::new(url.clone())),
        None => file_config.publish_target(),
    }
    .map(|mut target| {
        if args.folder.is_some() {
            target.folder = args.folder.clone();
        }
        if args.branch.is_some() {
            target.branch = args.branch.clone();
        }
        target
    });

    if publish.is_none() && (args.folder.is_some() || args.branch.is_some()) {
        anyhow::bail!(workshop_archive::ArchiveError::Config(
            "--folder and --branch need a repository (--publish or the config file)".to_string()
        ));
    }

    let json = args.json;
    let chatty = verbosity != VerbosityLevel::Quiet && !json;

    if chatty {
        if !args.no_banner {
            print_banner();
        }
        println!("{}", "Configuration:".bold());
        println!("  {}: {}", "Root path".cyan(), args.root.display());
        println!("  {}: {}", "Output path".cyan(), output.display());
        println!("  {}: {}", "Extensions".cyan(), extensions);
        if let Some(target) = &publish {
            println!("  {}: {}", "Repository".cyan(), target.repository_url);
        }
    }

    let options = RunOptions {
        root: args.root.clone(),
        output,
        extensions,
        stats_only: args.stats,
        publish,
        workspace_root: None,
    };

    let git = GitCli::new().with_timeout(Duration::from_secs(file_config.command_timeout_secs));
    let outcome = pipeline::run(&options, &git).context("Archive run failed")?;

    if json {
        println!("{}", outcome.statistics.to_json()?);
        return Ok(());
    }

    if chatty {
        report::print_statistics(&outcome.statistics);
    }

    if let Some(summary) = &outcome.archive {
        logger::log_to_file(&format!(
            "Archived {} files from {} to {}",
            summary.copied.len(),
            options.root.display(),
            summary.destination.display()
        ));
        if chatty {
            report::print_archive_summary(summary);
        }
    }

    if let (Some(published), Some(target)) = (&outcome.publish, &options.publish) {
        logger::log_to_file(&format!(
            "Published to {} (branch: {})",
            target.repository_url,
            published.pushed_branch.as_deref().unwrap_or("push failed")
        ));
        if chatty {
            report::print_publish_report(published, &target.repository_url);
        }
    }

    if chatty {
        println!("\n{}", "Done!".green().bold());
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
+--------------------------------------------------+
|                                                  |
|          Workshop Archive                        |
|          Collect, archive, publish               |
|                                                  |
+--------------------------------------------------+
"#
        .magenta()
    );
}
