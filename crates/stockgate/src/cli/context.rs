//! Per-invocation session: resolved config, the open database and the
//! identity every command acts as.

use crate::cli::config::StockgateConfig;
use crate::cli::error::HelpfulError;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use stockgate_db::{BranchId, CompanyId, UserId};
use stockgate_mediation::{
    ActionLedger, BomService, ChatModel, ConfirmationService, DbStore, ExecutorRegistry,
    OpenAiChatModel, Orchestrator, OrchestratorConfig, RequestContext, Role, ToolCallLog,
};
use tracing::{debug, warn};

/// Flags shared by every subcommand. Each one overrides `config.toml`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GlobalOpts {
    /// SQLite database file
    #[arg(long, global = true, env = "STOCKGATE_DB")]
    pub db: Option<PathBuf>,

    /// OpenAI-compatible base URL
    #[arg(long, global = true, env = "STOCKGATE_MODEL_URL")]
    pub model_url: Option<String>,

    /// Model name
    #[arg(long, global = true, env = "STOCKGATE_MODEL")]
    pub model: Option<String>,

    /// API key for the model endpoint
    #[arg(long, global = true, env = "STOCKGATE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Act as this user
    #[arg(long, global = true, env = "STOCKGATE_USER")]
    pub user: Option<String>,

    /// Act within this company
    #[arg(long, global = true, env = "STOCKGATE_COMPANY")]
    pub company: Option<String>,

    /// owner, admin, manager, technician or viewer
    #[arg(long, global = true, env = "STOCKGATE_ROLE")]
    pub role: Option<String>,

    /// Restrict catalog views to one branch
    #[arg(long, global = true, env = "STOCKGATE_BRANCH")]
    pub branch: Option<String>,
}

impl GlobalOpts {
    /// Overlay flags onto the file config.
    pub fn apply(&self, config: &mut StockgateConfig) {
        if let Some(db) = &self.db {
            config.database = db.clone();
        }
        if let Some(url) = &self.model_url {
            config.model.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if self.api_key.is_some() {
            config.model.api_key = self.api_key.clone();
        }
        let identity = &mut config.identity;
        for (flag, slot) in [
            (&self.user, &mut identity.user),
            (&self.company, &mut identity.company),
            (&self.role, &mut identity.role),
            (&self.branch, &mut identity.branch),
        ] {
            if flag.is_some() {
                *slot = flag.clone();
            }
        }
    }
}

/// Build the caller identity from the resolved config.
pub fn request_context(config: &StockgateConfig) -> Result<RequestContext> {
    let identity = &config.identity;
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let user = non_empty(&identity.user).ok_or_else(|| HelpfulError::missing_identity("user"))?;
    let company =
        non_empty(&identity.company).ok_or_else(|| HelpfulError::missing_identity("company"))?;
    let role_raw =
        non_empty(&identity.role).ok_or_else(|| HelpfulError::missing_identity("role"))?;
    let role = Role::parse(&role_raw).ok_or_else(|| HelpfulError::unknown_role(&role_raw))?;

    let mut ctx = RequestContext::new(UserId::from_string(user), CompanyId::from_string(company), role);
    if let Some(branch) = non_empty(&identity.branch) {
        ctx = ctx.with_branch(BranchId::from_string(branch));
    }
    Ok(ctx)
}

/// Everything a command needs, opened once per invocation.
pub struct App {
    pub config: StockgateConfig,
    pub store: Arc<DbStore>,
    pub ledger: ActionLedger,
}

impl App {
    pub async fn open(config: StockgateConfig) -> Result<Self> {
        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = DbStore::open(&config.database)
            .await
            .map_err(crate::cli::error::mediation)
            .with_context(|| format!("Failed to open database {}", config.database.display()))?;
        debug!(path = %config.database.display(), "Database opened");

        let store = Arc::new(store);
        let ledger = ActionLedger::new(store.clone());
        Ok(Self {
            config,
            store,
            ledger,
        })
    }

    pub fn request_context(&self) -> Result<RequestContext> {
        request_context(&self.config)
    }

    pub fn confirmations(&self) -> ConfirmationService {
        ConfirmationService::new(
            self.ledger.clone(),
            ExecutorRegistry::with_inventory(self.store.clone()),
        )
    }

    pub fn bom(&self) -> BomService {
        BomService::new(self.store.clone(), self.store.clone(), self.ledger.proposer())
    }

    pub fn model(&self) -> Result<Arc<dyn ChatModel>> {
        let config = self.config.model_config();
        if config.api_key.is_none() && config.base_url.starts_with("https://api.openai.com") {
            return Err(HelpfulError::missing_api_key().into());
        }
        let model = OpenAiChatModel::new(config).map_err(crate::cli::error::mediation)?;
        Ok(Arc::new(model))
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let orchestrator = Orchestrator::new(
            self.model()?,
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.ledger.proposer(),
        )
        .with_config(OrchestratorConfig {
            history_limit: self.config.history_limit,
            ..OrchestratorConfig::default()
        });

        match ToolCallLog::new(&self.config.tool_log) {
            Ok(log) => Ok(orchestrator.with_tool_log(Arc::new(log))),
            Err(e) => {
                warn!(path = %self.config.tool_log.display(), "Tool-call log disabled: {}", e);
                Ok(orchestrator)
            }
        }
    }
}
