//! Confirmation Service - the human decision on a proposed action.
//!
//! The only caller that hands a live executor to the ledger.

use crate::classifier::{classify, Classification};
use crate::context::RequestContext;
use crate::error::{MediationError, Result};
use crate::executors::ExecutorRegistry;
use crate::ledger::ActionLedger;
use serde::Serialize;
use serde_json::Value;
use stockgate_db::{ActionId, ProposedAction};
use tracing::info;

/// `{success, result?, error?, action}` as returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub action: ProposedAction,
}

pub struct ConfirmationService {
    ledger: ActionLedger,
    executors: ExecutorRegistry,
}

impl ConfirmationService {
    pub fn new(ledger: ActionLedger, executors: ExecutorRegistry) -> Self {
        Self { ledger, executors }
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Confirm (execute) or reject (cancel) one action.
    ///
    /// The requester must hold the capability the action type needs; the
    /// check happens before any state change.
    pub async fn confirm_action(
        &self,
        ctx: &RequestContext,
        action_id: &ActionId,
        confirmed: bool,
    ) -> Result<ConfirmationResult> {
        let action = self.ledger.get(&ctx.company_id, action_id).await?;

        if let Classification::Rejected { reason } =
            classify(&action.action_type, ctx.capabilities())
        {
            return Err(MediationError::authorization(reason));
        }

        if !confirmed {
            let action = self.ledger.cancel(action_id, ctx).await?;
            return Ok(ConfirmationResult {
                success: true,
                result: None,
                error: None,
                action,
            });
        }

        let executor = self.executors.resolve(&action.action_type);
        let report = self
            .ledger
            .confirm_and_execute(action_id, ctx, executor.as_ref())
            .await?;

        info!(
            action_id = %action_id,
            action_type = %report.action.action_type,
            success = report.succeeded(),
            "Confirmation processed"
        );

        Ok(ConfirmationResult {
            success: report.succeeded(),
            result: report.result,
            error: report.error,
            action: report.action,
        })
    }
}
