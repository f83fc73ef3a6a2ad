//! Repository seams.
//!
//! The pipeline only talks to storage through these traits. Reads and
//! writes of inventory are split so that the orchestrator can be handed a
//! reader and nothing else.

use crate::error::Result;
use async_trait::async_trait;
use stockgate_db::{
    ActionId, BomDraft, BomLineItem, BomLinePatch, BranchId, CatalogEntry, CatalogItemId,
    CompanyId, Conversation, ConversationId, DraftId, ExtractedLine,
    PurchaseOrder, PurchaseOrderLine, StockLevel, StoredMessage, UserId,
};

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Call-time snapshot used for matching.
    async fn snapshot(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<CatalogEntry>>;
}

#[async_trait]
pub trait InventoryReader: Send + Sync {
    async fn stock_level(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
    ) -> Result<Option<StockLevel>>;

    async fn search(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<StockLevel>>;

    async fn low_stock(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<StockLevel>>;
}

/// Mutations. Only executors hold one of these.
#[async_trait]
pub trait InventoryWriter: Send + Sync {
    async fn adjust(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        delta: f64,
    ) -> Result<StockLevel>;

    async fn set_par_level(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        par_level: Option<f64>,
    ) -> Result<StockLevel>;

    async fn create_purchase_order(
        &self,
        company_id: &CompanyId,
        vendor: Option<&str>,
        created_by: Option<&UserId>,
        source_action_id: &ActionId,
        lines: &[PurchaseOrderLine],
    ) -> Result<PurchaseOrder>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(
        &self,
        company_id: &CompanyId,
        user_id: &UserId,
        topic: Option<&str>,
    ) -> Result<Conversation>;

    async fn get(
        &self,
        company_id: &CompanyId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>>;

    /// Persist a completed turn: the user's message and the reply.
    async fn append_exchange(
        &self,
        conversation_id: &ConversationId,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<()>;

    /// Last `limit` messages, oldest first.
    async fn recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>>;
}

#[async_trait]
pub trait BomStore: Send + Sync {
    async fn create_draft(
        &self,
        company_id: &CompanyId,
        name: &str,
        lines: &[ExtractedLine],
    ) -> Result<BomDraft>;

    async fn get_draft(&self, company_id: &CompanyId, id: &DraftId) -> Result<Option<BomDraft>>;

    async fn list_drafts(&self, company_id: &CompanyId) -> Result<Vec<BomDraft>>;

    async fn lines(&self, draft_id: &DraftId) -> Result<Vec<BomLineItem>>;

    /// Replace non-overridden lines and mark the draft processed.
    async fn replace_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        lines: &[BomLineItem],
    ) -> Result<Vec<BomLineItem>>;

    async fn patch_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        patches: &[BomLinePatch],
    ) -> Result<Vec<BomLineItem>>;

    /// `false` when the draft was no longer `PROCESSED`.
    async fn mark_submitted(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        action_id: &ActionId,
    ) -> Result<bool>;
}
