//! Shared fixtures for the mediation integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stockgate_db::{CatalogEntry, CompanyId, NewCatalogEntry, StockDb, UserId};
use stockgate_mediation::orchestrator::{ChatMessage, ModelReply, ToolCall};
use stockgate_mediation::{
    ActionLedger, ChatModel, ConfirmationService, DbStore, ExecutorRegistry, MediationError,
    Orchestrator, RequestContext, Result, Role, ToolDefinition,
};
use tempfile::TempDir;

pub const COMPANY: &str = "acme-electric";

pub struct Fixture {
    pub _temp: TempDir,
    pub store: Arc<DbStore>,
    pub ledger: ActionLedger,
}

impl Fixture {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DbStore::open(temp.path().join("stockgate.sqlite3")).await.unwrap());
        let ledger = ActionLedger::new(store.clone());
        Self {
            _temp: temp,
            store,
            ledger,
        }
    }

    pub fn db(&self) -> &StockDb {
        self.store.db()
    }

    pub fn confirmations(&self) -> ConfirmationService {
        ConfirmationService::new(
            self.ledger.clone(),
            ExecutorRegistry::with_inventory(self.store.clone()),
        )
    }

    pub fn orchestrator(&self, model: Arc<ScriptedModel>) -> Orchestrator {
        Orchestrator::new(
            model,
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.ledger.proposer(),
        )
    }

    /// Electrical-contractor catalog used across the scenarios.
    pub async fn seed_catalog(&self) -> Vec<CatalogEntry> {
        let entries = [
            ("12/2 MC Cable", "Wire", "ft", Some("MC-122"), 500.0, Some(200.0)),
            ("20A Breaker", "Breakers", "ea", Some("BR-20"), 12.0, Some(10.0)),
            ("30A Breaker", "Breakers", "ea", Some("BR-30"), 3.0, Some(6.0)),
            ("200A Main Panel", "Panels", "ea", None, 2.0, None),
        ];
        let new: Vec<NewCatalogEntry> = entries
            .iter()
            .map(|(name, category, unit, sku, qty, par)| NewCatalogEntry {
                name: name.to_string(),
                category: category.to_string(),
                unit: unit.to_string(),
                sku: sku.map(str::to_string),
                branch_id: None,
                quantity_on_hand: *qty,
                par_level: *par,
            })
            .collect();

        self.db().catalog_import(&company(), &new).await.unwrap();
        self.db().catalog_snapshot(&company(), None).await.unwrap()
    }

    pub async fn item_id(&self, name: &str) -> stockgate_db::CatalogItemId {
        self.db()
            .catalog_snapshot(&company(), None)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.id)
            .unwrap()
    }
}

pub fn company() -> CompanyId {
    CompanyId::from_string(COMPANY)
}

pub fn ctx(role: Role) -> RequestContext {
    RequestContext::new(UserId::from_string(format!("{}-user", role)), company(), role)
}

/// Replays canned replies and records what it was sent.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<ModelReply, String>>>,
    seen: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<std::result::Result<ModelReply, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Messages and declared tool count of the n-th call.
    pub fn call(&self, n: usize) -> (Vec<ChatMessage>, usize) {
        self.seen.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply> {
        self.seen
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.len()));
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(MediationError::UpstreamModel(message)),
            None => Err(MediationError::UpstreamModel("script exhausted".into())),
        }
    }
}

pub fn text(content: &str) -> std::result::Result<ModelReply, String> {
    Ok(ModelReply {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
    })
}

pub fn calls(calls: &[(&str, &str, &str)]) -> std::result::Result<ModelReply, String> {
    Ok(ModelReply {
        content: None,
        tool_calls: calls
            .iter()
            .map(|(id, name, arguments)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            })
            .collect(),
    })
}

pub fn failure(message: &str) -> std::result::Result<ModelReply, String> {
    Err(message.to_string())
}
