//! Executors - the code that actually performs a confirmed mutation.
//!
//! Only the confirmation service looks executors up; the ledger receives
//! one per call and runs it at most once.

use crate::actions::*;
use crate::context::RequestContext;
use crate::error::{MediationError, Result};
use crate::store::InventoryWriter;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use stockgate_db::{ProposedAction, PurchaseOrderLine};
use tracing::debug;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform the mutation described by `action`. The returned value is
    /// stored as the action's result.
    async fn execute(&self, ctx: &RequestContext, action: &ProposedAction) -> Result<Value>;
}

fn payload(action: &ProposedAction) -> Result<ActionPayload> {
    ActionPayload::from_json_str(&action.action_type, &action.arguments_json)
        .map_err(|e| MediationError::execution(e.to_string()))
}

fn storage_failure(err: MediationError) -> MediationError {
    match err {
        MediationError::Storage(msg) => MediationError::Storage(msg),
        other => MediationError::execution(other.to_string()),
    }
}

pub struct AdjustStockExecutor {
    inventory: Arc<dyn InventoryWriter>,
}

#[async_trait]
impl ActionExecutor for AdjustStockExecutor {
    async fn execute(&self, ctx: &RequestContext, action: &ProposedAction) -> Result<Value> {
        let ActionPayload::AdjustStock(args) = payload(action)? else {
            return Err(MediationError::execution("payload is not adjust_stock"));
        };
        let item_id = args.item.require_id()?;
        let level = self
            .inventory
            .adjust(&ctx.company_id, item_id, args.delta)
            .await
            .map_err(storage_failure)?;

        Ok(json!({
            "itemId": level.item_id,
            "itemName": level.item_name,
            "delta": args.delta,
            "quantityOnHand": level.quantity_on_hand,
        }))
    }
}

pub struct SetParLevelExecutor {
    inventory: Arc<dyn InventoryWriter>,
}

#[async_trait]
impl ActionExecutor for SetParLevelExecutor {
    async fn execute(&self, ctx: &RequestContext, action: &ProposedAction) -> Result<Value> {
        let ActionPayload::SetParLevel(args) = payload(action)? else {
            return Err(MediationError::execution("payload is not set_par_level"));
        };
        let item_id = args.item.require_id()?;
        let level = self
            .inventory
            .set_par_level(&ctx.company_id, item_id, args.par_level)
            .await
            .map_err(storage_failure)?;

        Ok(json!({
            "itemId": level.item_id,
            "itemName": level.item_name,
            "parLevel": level.par_level,
        }))
    }
}

pub struct CreatePurchaseOrderExecutor {
    inventory: Arc<dyn InventoryWriter>,
}

#[async_trait]
impl ActionExecutor for CreatePurchaseOrderExecutor {
    async fn execute(&self, ctx: &RequestContext, action: &ProposedAction) -> Result<Value> {
        let ActionPayload::CreatePurchaseOrder(args) = payload(action)? else {
            return Err(MediationError::execution("payload is not create_purchase_order"));
        };

        let mut lines = Vec::with_capacity(args.lines.len());
        for line in &args.lines {
            lines.push(PurchaseOrderLine {
                item_id: line.item.require_id()?.clone(),
                quantity: line.quantity,
            });
        }

        let created_by = action.proposed_by.as_ref().unwrap_or(&ctx.user_id);
        let order = self
            .inventory
            .create_purchase_order(
                &ctx.company_id,
                args.vendor.as_deref(),
                Some(created_by),
                &action.id,
                &lines,
            )
            .await
            .map_err(storage_failure)?;

        Ok(json!({
            "purchaseOrderId": order.id,
            "vendor": order.vendor,
            "lineCount": order.lines.len(),
        }))
    }
}

/// Stand-in for action types nobody registered. Always fails, so the row
/// ends `FAILED` rather than hanging in `CONFIRMED`.
struct UnregisteredExecutor;

#[async_trait]
impl ActionExecutor for UnregisteredExecutor {
    async fn execute(&self, _ctx: &RequestContext, action: &ProposedAction) -> Result<Value> {
        Err(MediationError::execution(format!(
            "no executor registered for action type '{}'",
            action.action_type
        )))
    }
}

/// Executors by action type.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
    fallback: Arc<dyn ActionExecutor>,
}

impl ExecutorRegistry {
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
            fallback: Arc::new(UnregisteredExecutor),
        }
    }

    /// The built-in executors over an inventory writer.
    pub fn with_inventory(inventory: Arc<dyn InventoryWriter>) -> Self {
        let mut registry = Self::empty();
        registry.register(
            ADJUST_STOCK,
            Arc::new(AdjustStockExecutor {
                inventory: inventory.clone(),
            }),
        );
        registry.register(
            SET_PAR_LEVEL,
            Arc::new(SetParLevelExecutor {
                inventory: inventory.clone(),
            }),
        );
        registry.register(
            CREATE_PURCHASE_ORDER,
            Arc::new(CreatePurchaseOrderExecutor { inventory }),
        );
        debug!("Registered {} executors", registry.executors.len());
        registry
    }

    pub fn register(&mut self, action_type: &str, executor: Arc<dyn ActionExecutor>) {
        debug!("Registering executor: {}", action_type);
        self.executors.insert(action_type.to_string(), executor);
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.executors.contains_key(action_type)
    }

    /// The executor for `action_type`, or one that fails the action.
    pub fn resolve(&self, action_type: &str) -> Arc<dyn ActionExecutor> {
        self.executors
            .get(action_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use stockgate_db::{CompanyId, UserId};

    fn ctx() -> RequestContext {
        RequestContext::new(
            UserId::from_string("u1"),
            CompanyId::from_string("acme"),
            Role::Owner,
        )
    }

    #[tokio::test]
    async fn test_unregistered_type_fails() {
        let registry = ExecutorRegistry::empty();
        assert!(!registry.contains("transfer_stock"));

        let action = ProposedAction::new(
            CompanyId::from_string("acme"),
            None,
            "transfer_stock",
            "{}",
            None,
        );
        let err = registry
            .resolve("transfer_stock")
            .execute(&ctx(), &action)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no executor registered"));
    }
}
