//! Database-backed implementations of the pipeline seams.
//!
//! [`DbStore`] wraps one [`StockDb`] handle and implements every storage
//! trait. Which trait object a component receives decides what it can do:
//! the orchestrator gets the readers, executors get the writer.

use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::store::{BomStore, CatalogReader, ConversationStore, InventoryReader, InventoryWriter};
use async_trait::async_trait;
use stockgate_db::{
    ActionFilter, ActionId, AuditEntry, BomDraft, BomLineItem, BomLinePatch, BranchId,
    CatalogEntry, CatalogItemId, CompanyId, Conversation, ConversationId, DraftId, ExtractedLine,
    ProposedAction, PurchaseOrder, PurchaseOrderLine, StockDb, StockLevel,
    StoredMessage, Transition, UserId,
};

/// SQLite-backed store.
#[derive(Clone)]
pub struct DbStore {
    db: StockDb,
}

impl DbStore {
    pub fn new(db: StockDb) -> Self {
        Self { db }
    }

    /// Open from a database path (e.g., "~/.stockgate/stockgate.sqlite3").
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(StockDb::open(path).await?))
    }

    /// Get the underlying database (for direct access).
    pub fn db(&self) -> &StockDb {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for DbStore {
    async fn insert(&self, action: &ProposedAction) -> Result<()> {
        Ok(self.db.action_insert(action).await?)
    }

    async fn get(&self, company_id: &CompanyId, id: &ActionId) -> Result<Option<ProposedAction>> {
        Ok(self.db.action_get(company_id, id).await?)
    }

    async fn list(
        &self,
        company_id: &CompanyId,
        filter: &ActionFilter,
    ) -> Result<Vec<ProposedAction>> {
        Ok(self.db.action_list(company_id, filter).await?)
    }

    async fn transition(
        &self,
        company_id: &CompanyId,
        id: &ActionId,
        transition: &Transition,
    ) -> Result<bool> {
        Ok(self.db.action_transition(company_id, id, transition).await?)
    }

    async fn audit(&self, company_id: &CompanyId, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        Ok(self.db.audit_list(company_id, limit).await?)
    }
}

#[async_trait]
impl CatalogReader for DbStore {
    async fn snapshot(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<CatalogEntry>> {
        Ok(self.db.catalog_snapshot(company_id, branch_id).await?)
    }
}

#[async_trait]
impl InventoryReader for DbStore {
    async fn stock_level(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
    ) -> Result<Option<StockLevel>> {
        Ok(self.db.stock_get(company_id, item_id).await?)
    }

    async fn search(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<StockLevel>> {
        Ok(self.db.stock_search(company_id, branch_id, text, limit).await?)
    }

    async fn low_stock(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<StockLevel>> {
        Ok(self.db.stock_low(company_id, branch_id).await?)
    }
}

#[async_trait]
impl InventoryWriter for DbStore {
    async fn adjust(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        delta: f64,
    ) -> Result<StockLevel> {
        Ok(self.db.stock_adjust(company_id, item_id, delta).await?)
    }

    async fn set_par_level(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        par_level: Option<f64>,
    ) -> Result<StockLevel> {
        Ok(self.db.stock_set_par(company_id, item_id, par_level).await?)
    }

    async fn create_purchase_order(
        &self,
        company_id: &CompanyId,
        vendor: Option<&str>,
        created_by: Option<&UserId>,
        source_action_id: &ActionId,
        lines: &[PurchaseOrderLine],
    ) -> Result<PurchaseOrder> {
        Ok(self
            .db
            .purchase_order_create(company_id, vendor, created_by, Some(source_action_id), lines)
            .await?)
    }
}

#[async_trait]
impl ConversationStore for DbStore {
    async fn create(
        &self,
        company_id: &CompanyId,
        user_id: &UserId,
        topic: Option<&str>,
    ) -> Result<Conversation> {
        Ok(self.db.conversation_create(company_id, user_id, topic).await?)
    }

    async fn get(
        &self,
        company_id: &CompanyId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        Ok(self.db.conversation_get(company_id, id).await?)
    }

    async fn append_exchange(
        &self,
        conversation_id: &ConversationId,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<()> {
        Ok(self
            .db
            .exchange_append(conversation_id, user_content, assistant_content)
            .await?)
    }

    async fn recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        Ok(self.db.messages_recent(conversation_id, limit).await?)
    }
}

#[async_trait]
impl BomStore for DbStore {
    async fn create_draft(
        &self,
        company_id: &CompanyId,
        name: &str,
        lines: &[ExtractedLine],
    ) -> Result<BomDraft> {
        Ok(self.db.bom_draft_create(company_id, name, lines).await?)
    }

    async fn get_draft(&self, company_id: &CompanyId, id: &DraftId) -> Result<Option<BomDraft>> {
        Ok(self.db.bom_draft_get(company_id, id).await?)
    }

    async fn list_drafts(&self, company_id: &CompanyId) -> Result<Vec<BomDraft>> {
        Ok(self.db.bom_draft_list(company_id).await?)
    }

    async fn lines(&self, draft_id: &DraftId) -> Result<Vec<BomLineItem>> {
        Ok(self.db.bom_lines(draft_id).await?)
    }

    async fn replace_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        lines: &[BomLineItem],
    ) -> Result<Vec<BomLineItem>> {
        Ok(self.db.bom_replace_lines(company_id, draft_id, lines).await?)
    }

    async fn patch_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        patches: &[BomLinePatch],
    ) -> Result<Vec<BomLineItem>> {
        Ok(self.db.bom_patch_lines(company_id, draft_id, patches).await?)
    }

    async fn mark_submitted(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        action_id: &ActionId,
    ) -> Result<bool> {
        Ok(self
            .db
            .bom_draft_mark_submitted(company_id, draft_id, action_id)
            .await?)
    }
}
