//! In-process ledger store.
//!
//! Same compare-and-swap contract as the SQLite store, guarded by one
//! mutex. Useful for embedding the pipeline without a database.

use super::LedgerStore;
use crate::error::{MediationError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use stockgate_db::{
    ActionFilter, ActionId, ActionStatus, AuditEntry, CompanyId, ProposedAction, Transition,
};

#[derive(Default)]
struct State {
    actions: HashMap<ActionId, ProposedAction>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| MediationError::Storage(format!("ledger lock poisoned: {}", e)))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert(&self, action: &ProposedAction) -> Result<()> {
        let mut state = self.lock()?;
        if state.actions.contains_key(&action.id) {
            return Err(MediationError::Storage(format!("duplicate action id {}", action.id)));
        }
        state.actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn get(&self, company_id: &CompanyId, id: &ActionId) -> Result<Option<ProposedAction>> {
        let state = self.lock()?;
        Ok(state
            .actions
            .get(id)
            .filter(|a| &a.company_id == company_id)
            .cloned())
    }

    async fn list(
        &self,
        company_id: &CompanyId,
        filter: &ActionFilter,
    ) -> Result<Vec<ProposedAction>> {
        let state = self.lock()?;
        let mut rows: Vec<ProposedAction> = state
            .actions
            .values()
            .filter(|a| &a.company_id == company_id)
            .filter(|a| filter.status.map(|s| a.status == s).unwrap_or(true))
            .filter(|a| {
                filter
                    .conversation_id
                    .as_ref()
                    .map(|c| a.conversation_id.as_ref() == Some(c))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn transition(
        &self,
        company_id: &CompanyId,
        id: &ActionId,
        transition: &Transition,
    ) -> Result<bool> {
        if !transition.from.can_transition_to(transition.to) {
            return Err(MediationError::Storage(format!(
                "illegal ledger edge {} -> {}",
                transition.from, transition.to
            )));
        }

        let mut state = self.lock()?;
        let Some(action) = state
            .actions
            .get_mut(id)
            .filter(|a| &a.company_id == company_id && a.status == transition.from)
        else {
            return Ok(false);
        };

        let now = Utc::now();
        action.status = transition.to;
        match transition.to {
            ActionStatus::Confirmed => {
                action.confirmed_at = Some(now);
                action.decided_by = transition.actor.clone();
            }
            ActionStatus::Cancelled => {
                action.cancelled_at = Some(now);
                action.decided_by = transition.actor.clone();
            }
            ActionStatus::Executed => {
                action.executed_at = Some(now);
                action.result_json = transition.result_json.clone();
            }
            ActionStatus::Failed => {
                action.error_message = transition.error_message.clone();
            }
            ActionStatus::Proposed => {}
        }

        if transition.to == ActionStatus::Executed {
            let entry = AuditEntry {
                action_id: action.id.clone(),
                company_id: action.company_id.clone(),
                action_type: action.action_type.clone(),
                actor: action.decided_by.clone(),
                proposed_args: action.arguments_json.clone(),
                result: action.result_json.clone().unwrap_or_default(),
                recorded_at: now,
            };
            state.audit.push(entry);
        }
        Ok(true)
    }

    async fn audit(&self, company_id: &CompanyId, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let state = self.lock()?;
        let mut rows: Vec<AuditEntry> = state
            .audit
            .iter()
            .rev()
            .filter(|e| &e.company_id == company_id)
            .cloned()
            .collect();
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
