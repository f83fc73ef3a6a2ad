//! Ledger lifecycle operations on top of a [`LedgerStore`].

use super::LedgerStore;
use crate::context::RequestContext;
use crate::error::{MediationError, Result};
use crate::executors::ActionExecutor;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use stockgate_db::{
    ActionFilter, ActionId, ActionStatus, AuditEntry, CompanyId, ConversationId, ProposedAction,
    Transition, UserId,
};
use tracing::{error, info, warn};

/// Outcome of a confirmation that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub action: ProposedAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.action.status == ActionStatus::Executed
    }
}

#[derive(Clone)]
pub struct ActionLedger {
    store: Arc<dyn LedgerStore>,
}

impl ActionLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// A handle that can add rows and do nothing else.
    pub fn proposer(&self) -> Proposer {
        Proposer {
            ledger: self.clone(),
        }
    }

    /// Insert a new `PROPOSED` row. Identical proposals are not merged.
    pub async fn propose(
        &self,
        company_id: &CompanyId,
        conversation_id: Option<&ConversationId>,
        action_type: &str,
        arguments_json: &str,
        proposed_by: Option<&UserId>,
    ) -> Result<ProposedAction> {
        if action_type.trim().is_empty() {
            return Err(MediationError::validation("action type must not be empty"));
        }

        let action = ProposedAction::new(
            company_id.clone(),
            conversation_id.cloned(),
            action_type,
            arguments_json,
            proposed_by.cloned(),
        );
        self.store.insert(&action).await?;

        info!(
            action_id = %action.id,
            action_type = %action.action_type,
            company_id = %company_id,
            "Proposed action"
        );
        Ok(action)
    }

    pub async fn get(&self, company_id: &CompanyId, id: &ActionId) -> Result<ProposedAction> {
        self.store
            .get(company_id, id)
            .await?
            .ok_or_else(|| MediationError::not_found(format!("action {}", id)))
    }

    pub async fn list(
        &self,
        company_id: &CompanyId,
        filter: &ActionFilter,
    ) -> Result<Vec<ProposedAction>> {
        self.store.list(company_id, filter).await
    }

    pub async fn list_audit(
        &self,
        company_id: &CompanyId,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        self.store.audit(company_id, limit).await
    }

    /// Cancel a proposal. Cancelling an already cancelled row succeeds
    /// without writing.
    pub async fn cancel(&self, id: &ActionId, requester: &RequestContext) -> Result<ProposedAction> {
        let company_id = &requester.company_id;
        let action = self.get(company_id, id).await?;

        match action.status {
            ActionStatus::Cancelled => return Ok(action),
            ActionStatus::Proposed => {}
            from => {
                return Err(MediationError::InvalidTransition {
                    action_id: id.clone(),
                    from,
                    attempted: ActionStatus::Cancelled,
                })
            }
        }

        let applied = self
            .store
            .transition(company_id, id, &Transition::cancel(Some(requester.user_id.clone())))
            .await?;
        let current = self.get(company_id, id).await?;

        if !applied && current.status != ActionStatus::Cancelled {
            return Err(MediationError::InvalidTransition {
                action_id: id.clone(),
                from: current.status,
                attempted: ActionStatus::Cancelled,
            });
        }

        if applied {
            info!(action_id = %id, user_id = %requester.user_id, "Cancelled action");
        }
        Ok(current)
    }

    /// Confirm a proposal and run `executor` on it exactly once.
    ///
    /// `CONFIRMED` is persisted before the executor runs. Executor failure is
    /// recorded as `FAILED` and reported, not returned as an error. A storage
    /// error from the executor is returned instead and the row stays
    /// `CONFIRMED`, since the mutation may or may not have landed.
    pub async fn confirm_and_execute(
        &self,
        id: &ActionId,
        requester: &RequestContext,
        executor: &dyn ActionExecutor,
    ) -> Result<ExecutionReport> {
        let company_id = &requester.company_id;
        let action = self.get(company_id, id).await?;

        if action.status != ActionStatus::Proposed {
            return Err(MediationError::InvalidTransition {
                action_id: id.clone(),
                from: action.status,
                attempted: ActionStatus::Confirmed,
            });
        }

        let confirm = Transition::confirm(Some(requester.user_id.clone()));
        if !self.store.transition(company_id, id, &confirm).await? {
            let current = self.get(company_id, id).await?;
            return Err(MediationError::InvalidTransition {
                action_id: id.clone(),
                from: current.status,
                attempted: ActionStatus::Confirmed,
            });
        }
        info!(action_id = %id, user_id = %requester.user_id, "Confirmed action");

        let confirmed = self.get(company_id, id).await?;
        let (terminal, result, error) = match executor.execute(requester, &confirmed).await {
            Ok(value) => {
                let json = serde_json::to_string(&value)
                    .map_err(|e| MediationError::Storage(format!("unserializable result: {}", e)))?;
                (Transition::executed(json), Some(value), None)
            }
            Err(MediationError::Storage(msg)) => {
                error!(
                    action_id = %id,
                    action_type = %confirmed.action_type,
                    error = %msg,
                    "Storage failed during execution; action left CONFIRMED"
                );
                return Err(MediationError::Storage(msg));
            }
            Err(err) => {
                let message = match err {
                    MediationError::Execution(msg) => msg,
                    other => other.to_string(),
                };
                warn!(action_id = %id, action_type = %confirmed.action_type, error = %message, "Execution failed");
                (Transition::failed(message.clone()), None, Some(message))
            }
        };

        if !self.store.transition(company_id, id, &terminal).await? {
            return Err(MediationError::Storage(format!(
                "action {} left CONFIRMED under another writer",
                id
            )));
        }

        let action = self.get(company_id, id).await?;
        info!(action_id = %id, status = %action.status, "Action finished");
        Ok(ExecutionReport {
            action,
            result,
            error,
        })
    }
}

/// Write-restricted view of the ledger handed to the orchestrator and the
/// BOM pipeline.
#[derive(Clone)]
pub struct Proposer {
    ledger: ActionLedger,
}

impl Proposer {
    pub async fn propose(
        &self,
        company_id: &CompanyId,
        conversation_id: Option<&ConversationId>,
        action_type: &str,
        arguments_json: &str,
        proposed_by: Option<&UserId>,
    ) -> Result<ProposedAction> {
        self.ledger
            .propose(company_id, conversation_id, action_type, arguments_json, proposed_by)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::ledger::MemoryLedgerStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    struct DiskFullExecutor;

    #[async_trait]
    impl ActionExecutor for DiskFullExecutor {
        async fn execute(&self, _ctx: &RequestContext, _action: &ProposedAction) -> Result<Value> {
            Err(MediationError::Storage("disk I/O error".to_string()))
        }
    }

    impl CountingExecutor {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        async fn execute(&self, _ctx: &RequestContext, _action: &ProposedAction) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MediationError::execution("stock went negative"))
            } else {
                Ok(json!({"onHand": 7}))
            }
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            UserId::from_string("u1"),
            CompanyId::from_string("acme"),
            Role::Manager,
        )
    }

    async fn proposed(ledger: &ActionLedger) -> ProposedAction {
        ledger
            .propose(&ctx().company_id, None, "adjust_stock", "{}", Some(&ctx().user_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_confirm_executes_and_audits() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;
        let executor = CountingExecutor::new(false);

        let report = ledger
            .confirm_and_execute(&action.id, &ctx(), &executor)
            .await
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.result, Some(json!({"onHand": 7})));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.list_audit(&ctx().company_id, None).await.unwrap().len(), 1);

        let again = ledger.confirm_and_execute(&action.id, &ctx(), &executor).await;
        assert!(matches!(
            again,
            Err(MediationError::InvalidTransition {
                from: ActionStatus::Executed,
                ..
            })
        ));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_thrown() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;

        let report = ledger
            .confirm_and_execute(&action.id, &ctx(), &CountingExecutor::new(true))
            .await
            .unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.action.status, ActionStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("stock went negative"));
        assert_eq!(report.action.error_message.as_deref(), Some("stock went negative"));
        assert!(ledger.list_audit(&ctx().company_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_error_leaves_row_confirmed() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;

        let err = ledger
            .confirm_and_execute(&action.id, &ctx(), &DiskFullExecutor)
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::Storage(_)));

        let stored = ledger.get(&ctx().company_id, &action.id).await.unwrap();
        assert_eq!(stored.status, ActionStatus::Confirmed);
        assert_eq!(stored.error_message, None);
        assert!(ledger.list_audit(&ctx().company_id, None).await.unwrap().is_empty());

        let confirmed = ledger
            .list(
                &ctx().company_id,
                &ActionFilter {
                    status: Some(ActionStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_idempotent() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;

        let first = ledger.cancel(&action.id, &ctx()).await.unwrap();
        let second = ledger.cancel(&action.id, &ctx()).await.unwrap();
        assert_eq!(first.status, ActionStatus::Cancelled);
        assert_eq!(second.cancelled_at, first.cancelled_at);
    }

    #[tokio::test]
    async fn test_cancel_after_execution_rejected() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;
        ledger
            .confirm_and_execute(&action.id, &ctx(), &CountingExecutor::new(false))
            .await
            .unwrap();

        let err = ledger.cancel(&action.id, &ctx()).await.unwrap_err();
        assert_eq!(err.http_status(), 409);
    }

    #[tokio::test]
    async fn test_other_company_sees_not_found() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        let action = proposed(&ledger).await;
        let outsider = RequestContext::new(
            UserId::from_string("u9"),
            CompanyId::from_string("globex"),
            Role::Owner,
        );

        let err = ledger
            .confirm_and_execute(&action.id, &outsider, &CountingExecutor::new(false))
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::NotFound(_)));
        assert!(matches!(
            ledger.cancel(&action.id, &outsider).await,
            Err(MediationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_proposals_are_not_deduplicated() {
        let ledger = ActionLedger::new(Arc::new(MemoryLedgerStore::new()));
        proposed(&ledger).await;
        proposed(&ledger).await;
        let rows = ledger
            .list(&ctx().company_id, &ActionFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
