use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::ExtensionSet;
use crate::publish::PublishTarget;

const APP_DIR: &str = "workshop-archive";

/// Default archive destination when neither the CLI nor the config file sets one.
pub const DEFAULT_OUTPUT: &str = "./workshop-archive";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/workshop-archive or ~/.config/workshop-archive
    /// - macOS: ~/Library/Application Support/workshop-archive
    /// - Windows: %APPDATA%\workshop-archive
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
                Ok(PathBuf::from(xdg_config).join(APP_DIR))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join(APP_DIR))
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            if let Some(config) = dirs::config_dir() {
                Ok(config.join(APP_DIR))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(format!(".{APP_DIR}")))
            }
        }
    }

    /// Get the config file path (config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("workshop-archive.log"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }
}

fn default_command_timeout_secs() -> u64 {
    120
}

/// Publishing defaults stored in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Persistent defaults for archive runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Extension allow-list used when `--ext` is not given
    #[serde(default)]
    pub extensions: ExtensionSet,

    /// Archive destination used when `--output` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Upper bound on each git command, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub publish: PublishSettings,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            extensions: ExtensionSet::new(),
            output: None,
            command_timeout_secs: default_command_timeout_secs(),
            publish: PublishSettings::default(),
        }
    }
}

impl ArchiveConfig {
    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ArchiveConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.command_timeout_secs == 0 {
            anyhow::bail!(crate::error::ArchiveError::Config(
                "command_timeout_secs must be greater than zero".to_string()
            ));
        }

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Configured publish target, if a repository URL is set.
    pub fn publish_target(&self) -> Option<PublishTarget> {
        let url = self.publish.repository_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(PublishTarget {
            repository_url: url.to_string(),
            folder: self.publish.folder.clone(),
            branch: self.publish.branch.clone(),
        })
    }
}

/// Field updates for `config --set-*`
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub extensions: Option<String>,
    pub output: Option<PathBuf>,
    pub repository_url: Option<String>,
    pub folder: Option<String>,
    pub branch: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

/// Apply `update` to the config at `path` and save it. Empty strings clear a field.
pub fn update_config(path: &Path, update: ConfigUpdate) -> Result<ArchiveConfig> {
    let mut config = ArchiveConfig::load_from(path)?;

    if let Some(extensions) = update.extensions {
        config.extensions = ExtensionSet::parse(&extensions);
        println!("{}", format!("Set extensions: {}", config.extensions).green());
    }

    if let Some(output) = update.output {
        config.output = (!output.as_os_str().is_empty()).then_some(output);
        println!("{}", format!("Set output: {:?}", config.output).green());
    }

    if let Some(url) = update.repository_url {
        config.publish.repository_url = none_if_blank(url);
        println!(
            "{}",
            format!("Set repository: {:?}", config.publish.repository_url).green()
        );
    }

    if let Some(folder) = update.folder {
        config.publish.folder = none_if_blank(folder);
        println!("{}", format!("Set folder: {:?}", config.publish.folder).green());
    }

    if let Some(branch) = update.branch {
        config.publish.branch = none_if_blank(branch);
        println!("{}", format!("Set branch: {:?}", config.publish.branch).green());
    }

    if let Some(secs) = update.command_timeout_secs {
        if secs == 0 {
            anyhow::bail!(crate::error::ArchiveError::Config(
                "command timeout must be greater than zero".to_string()
            ));
        }
        config.command_timeout_secs = secs;
        println!("{}", format!("Set command timeout: {secs}s").green());
    }

    config.save_to(path)?;
    println!("{}", "Configuration saved successfully!".green().bold());

    Ok(config)
}

fn none_if_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Show the configuration stored at `path`
pub fn show_config(path: &Path) -> Result<()> {
    let config = ArchiveConfig::load_from(path)?;

    println!("{}", "Current Configuration:".bold());
    println!("  {}: {}", "Config file".cyan(), path.display());
    println!("  {}: {}", "Extensions".cyan(), config.extensions);
    println!(
        "  {}: {}",
        "Output".cyan(),
        config
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("{DEFAULT_OUTPUT} (default)"))
    );
    println!(
        "  {}: {}",
        "Repository".cyan(),
        config
            .publish
            .repository_url
            .as_deref()
            .unwrap_or("Not set (archive only)")
    );
    println!(
        "  {}: {}",
        "Folder".cyan(),
        config.publish.folder.as_deref().unwrap_or("None (repository root)")
    );
    println!(
        "  {}: {}",
        "Branch".cyan(),
        config.publish.branch.as_deref().unwrap_or("main, then master")
    );
    println!(
        "  {}: {}s",
        "Command timeout".cyan(),
        config.command_timeout_secs
    );

    Ok(())
}
