//! Action Ledger - gated mutations
//!
//! Every write the pipeline produces becomes a ledger row first:
//!
//! ```text
//! PROPOSED --confirm--> CONFIRMED --execute ok---> EXECUTED (+ audit row)
//!                                 --execute err--> FAILED
//! PROPOSED --cancel---> CANCELLED
//! ```
//!
//! Rows are never deleted. Status changes are compare-and-swap updates in
//! the store, so concurrent confirmations of the same row cannot both run
//! the executor.

mod manager;
mod memory;

pub use manager::{ActionLedger, ExecutionReport, Proposer};
pub use memory::MemoryLedgerStore;

use crate::error::Result;
use async_trait::async_trait;
use stockgate_db::{ActionFilter, ActionId, AuditEntry, CompanyId, ProposedAction, Transition};

/// Persistence contract for ledger rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, action: &ProposedAction) -> Result<()>;

    /// Rows of other companies read as absent.
    async fn get(&self, company_id: &CompanyId, id: &ActionId) -> Result<Option<ProposedAction>>;

    async fn list(&self, company_id: &CompanyId, filter: &ActionFilter)
        -> Result<Vec<ProposedAction>>;

    /// Apply `transition` iff the stored status equals `transition.from`.
    /// Reaching `EXECUTED` records the audit row atomically.
    async fn transition(
        &self,
        company_id: &CompanyId,
        id: &ActionId,
        transition: &Transition,
    ) -> Result<bool>;

    async fn audit(&self, company_id: &CompanyId, limit: Option<usize>) -> Result<Vec<AuditEntry>>;
}
