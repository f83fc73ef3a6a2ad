//! Configuration for Stockgate
//!
//! Everything lives under `~/.stockgate/` (or `$STOCKGATE_HOME`). An
//! optional `config.toml` there overrides the defaults; command-line flags
//! and `STOCKGATE_*` variables override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stockgate_mediation::orchestrator::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use stockgate_mediation::ModelConfig;

pub use stockgate_logging::{logs_dir, stockgate_home};

/// Path of the optional config file: `<home>/config.toml`
pub fn config_path() -> PathBuf {
    stockgate_home().join("config.toml")
}

fn default_database() -> PathBuf {
    stockgate_home().join("stockgate.sqlite3")
}

fn default_tool_log() -> PathBuf {
    logs_dir().join("tool_calls.ndjson")
}

/// Expand a leading `~/` the way a shell would.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub base_url: String,
    pub model: String,
    /// Prefer `STOCKGATE_API_KEY` over writing the key here.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Who the CLI acts as. Authentication is out of scope; these values are
/// trusted as given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    pub user: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StockgateConfig {
    pub database: PathBuf,
    pub tool_log: PathBuf,
    pub history_limit: usize,
    pub model: ModelSection,
    pub identity: IdentitySection,
}

impl Default for StockgateConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            tool_log: default_tool_log(),
            history_limit: 20,
            model: ModelSection::default(),
            identity: IdentitySection::default(),
        }
    }
}

impl StockgateConfig {
    /// Defaults, overlaid with `config.toml` when it exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file {}. Fix or delete it to use defaults.",
                path.display()
            )
        })?;
        config.database = expand_home(&config.database);
        config.tool_log = expand_home(&config.tool_log);
        Ok(config)
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            base_url: self.model.base_url.clone(),
            model: self.model.model.clone(),
            api_key: self.model.api_key.clone(),
            timeout: Duration::from_secs(self.model.timeout_secs.max(1)),
        }
    }
}

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Show resolved settings in JSON format
    #[arg(long)]
    pub json: bool,
}

fn exists_label(path: &Path) -> &'static str {
    if path.exists() {
        "exists"
    } else {
        "not found"
    }
}

/// Run the config command - shows resolved settings
pub fn run(args: ConfigArgs, config: &StockgateConfig) -> Result<()> {
    let home = stockgate_home();
    let file = config_path();
    let logs = logs_dir();

    if args.json {
        let value = serde_json::json!({
            "home": home.to_string_lossy(),
            "config_file": {
                "path": file.to_string_lossy(),
                "exists": file.exists(),
            },
            "database": {
                "path": config.database.to_string_lossy(),
                "exists": config.database.exists(),
            },
            "logs": logs.to_string_lossy(),
            "tool_log": config.tool_log.to_string_lossy(),
            "model": {
                "base_url": config.model.base_url,
                "model": config.model.model,
                "api_key_set": config.model.api_key.is_some(),
                "timeout_secs": config.model.timeout_secs,
            },
            "identity": config.identity,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("STOCKGATE CONFIGURATION");
        println!("=======================");
        println!();
        println!("Home:      {}", home.display());
        println!("Config:    {} ({})", file.display(), exists_label(&file));
        println!("Database:  {} ({})", config.database.display(), exists_label(&config.database));
        println!("Logs:      {}", logs.display());
        println!("Tool log:  {}", config.tool_log.display());
        println!();
        println!("Model:     {} at {}", config.model.model, config.model.base_url);
        println!(
            "API key:   {}",
            if config.model.api_key.is_some() { "set" } else { "not set" }
        );
        println!();
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        println!("User:      {}", show(&config.identity.user));
        println!("Company:   {}", show(&config.identity.company));
        println!("Role:      {}", show(&config.identity.role));
        println!("Branch:    {}", show(&config.identity.branch));
    }

    Ok(())
}
