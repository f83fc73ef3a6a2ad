//! Conversation Orchestrator
//!
//! Two model round-trips per user turn:
//!
//! 1. history + user message + declared tools -> model. Each tool call it
//!    returns is classified; READs run inline against the inventory
//!    reader, WRITEs become ledger proposals.
//! 2. Only when there were tool calls: the conversation plus one result per
//!    call goes back to the model, whose text becomes the reply.
//!
//! The orchestrator holds a [`Proposer`], never an inventory writer, so
//! nothing it does can change stock directly.

mod model;
mod prompt;

pub use model::{
    ChatMessage, ChatModel, ChatRole, ModelConfig, ModelReply, OpenAiChatModel, ToolCall,
    DEFAULT_BASE_URL, DEFAULT_MODEL,
};

use crate::actions::{ActionPayload, ItemRef};
use crate::classifier::{classify, Classification};
use crate::context::RequestContext;
use crate::error::{MediationError, Result};
use crate::ledger::Proposer;
use crate::matcher::MatchCandidate;
use crate::resolver::resolve_many;
use crate::store::{CatalogReader, ConversationStore, InventoryReader};
use crate::tool_log::ToolCallLog;
use crate::tools::{ToolDefinition, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use stockgate_db::{
    CatalogEntry, CatalogItemId, ConfidenceTier, ConversationId, MessageRole, ProposedAction,
};
use tracing::{debug, info, warn};

const DEGRADED_REPLY: &str =
    "Sorry, I couldn't process that request right now. No changes were made; please try again.";
const EMPTY_REPLY: &str = "I don't have anything to add.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Stored messages replayed to the model.
    pub history_limit: usize,
    /// Tool calls dispatched per turn; the rest are declined.
    pub max_tool_calls: usize,
    pub search_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            max_tool_calls: 8,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub message: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// A READ that ran during the turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedRead {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
}

/// What happened to one tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    #[serde(rename_all = "camelCase")]
    Executed {
        tool_call_id: String,
        tool: String,
        arguments: Value,
        result: Value,
    },
    #[serde(rename_all = "camelCase")]
    Proposed {
        tool_call_id: String,
        tool: String,
        action: ProposedAction,
    },
    #[serde(rename_all = "camelCase")]
    NeedsClarification {
        tool_call_id: String,
        tool: String,
        candidates: Vec<MatchCandidate>,
    },
    #[serde(rename_all = "camelCase")]
    Declined {
        tool_call_id: String,
        tool: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        tool_call_id: String,
        tool: String,
        error: String,
    },
}

impl ToolOutcome {
    pub fn tool_call_id(&self) -> &str {
        match self {
            Self::Executed { tool_call_id, .. }
            | Self::Proposed { tool_call_id, .. }
            | Self::NeedsClarification { tool_call_id, .. }
            | Self::Declined { tool_call_id, .. }
            | Self::Failed { tool_call_id, .. } => tool_call_id,
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Executed { tool, .. }
            | Self::Proposed { tool, .. }
            | Self::NeedsClarification { tool, .. }
            | Self::Declined { tool, .. }
            | Self::Failed { tool, .. } => tool,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Executed { .. } => "executed",
            Self::Proposed { .. } => "proposed",
            Self::NeedsClarification { .. } => "needs_clarification",
            Self::Declined { .. } => "declined",
            Self::Failed { .. } => "failed",
        }
    }

    /// Tool-result message content for phase 2.
    fn to_model_content(&self) -> String {
        let value = match self {
            Self::Executed { result, .. } => json!({"status": "ok", "result": result}),
            Self::Proposed { action, .. } => json!({
                "status": "pending_confirmation",
                "actionId": action.id,
                "actionType": action.action_type,
                "message": "Proposed. Nothing has changed until a human confirms it."
            }),
            Self::NeedsClarification { candidates, .. } => json!({
                "status": "needs_clarification",
                "unresolved": candidates
                    .iter()
                    .filter(|c| !c.is_actionable())
                    .map(|c| json!({"text": c.source_text, "tier": c.confidence_tier, "reason": c.reason}))
                    .collect::<Vec<_>>(),
                "message": "Ask the user which catalog item they mean."
            }),
            Self::Declined { reason, .. } => json!({"status": "declined", "reason": reason}),
            Self::Failed { error, .. } => json!({"status": "error", "error": error}),
        };
        value.to_string()
    }

    fn summary_line(&self) -> String {
        match self {
            Self::Executed { tool, .. } => format!("- {}: done", tool),
            Self::Proposed { tool, action, .. } => {
                format!("- {}: awaiting your confirmation (action {})", tool, action.id)
            }
            Self::NeedsClarification {
                tool, candidates, ..
            } => {
                let names: Vec<&str> = candidates
                    .iter()
                    .filter(|c| !c.is_actionable())
                    .map(|c| c.source_text.as_str())
                    .collect();
                format!("- {}: which item did you mean by {}?", tool, names.join(", "))
            }
            Self::Declined { tool, reason, .. } => format!("- {}: declined ({})", tool, reason),
            Self::Failed { tool, error, .. } => format!("- {}: failed ({})", tool, error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub conversation_id: ConversationId,
    pub reply: String,
    pub proposed_actions: Vec<ProposedAction>,
    pub executed_actions: Vec<ExecutedRead>,
    pub requires_confirmation: bool,
    /// The reply was not produced by the model.
    pub degraded: bool,
    pub outcomes: Vec<ToolOutcome>,
}

struct Turn {
    reply: String,
    outcomes: Vec<ToolOutcome>,
    degraded: bool,
}

impl Turn {
    fn degraded() -> Self {
        Self {
            reply: DEGRADED_REPLY.to_string(),
            outcomes: Vec::new(),
            degraded: true,
        }
    }
}

/// A tool call whose arguments are at least valid JSON.
struct ParsedCall {
    call: ToolCall,
    args: Value,
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    catalog: Arc<dyn CatalogReader>,
    inventory: Arc<dyn InventoryReader>,
    conversations: Arc<dyn ConversationStore>,
    proposer: Proposer,
    tools: ToolRegistry,
    tool_log: Option<Arc<ToolCallLog>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        catalog: Arc<dyn CatalogReader>,
        inventory: Arc<dyn InventoryReader>,
        conversations: Arc<dyn ConversationStore>,
        proposer: Proposer,
    ) -> Self {
        Self {
            model,
            catalog,
            inventory,
            conversations,
            proposer,
            tools: ToolRegistry::new(),
            tool_log: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tool_log(mut self, log: Arc<ToolCallLog>) -> Self {
        self.tool_log = Some(log);
        self
    }

    /// Handle one user turn.
    pub async fn chat(&self, ctx: &RequestContext, request: ChatRequest) -> Result<ChatResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(MediationError::validation("message must not be empty"));
        }

        let conversation = match request.conversation_id {
            Some(ref id) => self
                .conversations
                .get(&ctx.company_id, id)
                .await?
                .ok_or_else(|| MediationError::not_found(format!("conversation {}", id)))?,
            None => {
                self.conversations
                    .create(&ctx.company_id, &ctx.user_id, request.topic.as_deref())
                    .await?
            }
        };

        let history = self
            .conversations
            .recent(&conversation.id, self.config.history_limit)
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(prompt::system_prompt(ctx, &self.tools)));
        messages.extend(history.into_iter().map(|m| match m.role {
            MessageRole::User => ChatMessage::user(m.content),
            MessageRole::Assistant => ChatMessage::assistant(m.content),
        }));
        messages.push(ChatMessage::user(message));

        // Nothing is written to the transcript until the turn has a reply.
        let turn = self.run_turn(ctx, &conversation.id, messages).await?;

        self.conversations
            .append_exchange(&conversation.id, message, &turn.reply)
            .await?;

        let mut proposed_actions = Vec::new();
        let mut executed_actions = Vec::new();
        for outcome in &turn.outcomes {
            match outcome {
                ToolOutcome::Proposed { action, .. } => proposed_actions.push(action.clone()),
                ToolOutcome::Executed {
                    tool,
                    arguments,
                    result,
                    ..
                } => executed_actions.push(ExecutedRead {
                    tool: tool.clone(),
                    arguments: arguments.clone(),
                    result: result.clone(),
                }),
                _ => {}
            }
        }

        info!(
            conversation_id = %conversation.id,
            proposed = proposed_actions.len(),
            executed = executed_actions.len(),
            degraded = turn.degraded,
            "Chat turn complete"
        );

        Ok(ChatResponse {
            conversation_id: conversation.id,
            reply: turn.reply,
            requires_confirmation: !proposed_actions.is_empty(),
            proposed_actions,
            executed_actions,
            degraded: turn.degraded,
            outcomes: turn.outcomes,
        })
    }

    async fn run_turn(
        &self,
        ctx: &RequestContext,
        conversation_id: &ConversationId,
        mut messages: Vec<ChatMessage>,
    ) -> Result<Turn> {
        let tools: Vec<ToolDefinition> = self.tools.definitions();

        let phase1 = match self.model.complete(&messages, &tools).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(model = self.model.name(), error = %err, "Phase-1 model call failed");
                self.log_model_failure(conversation_id, 1, &err);
                return Ok(Turn::degraded());
            }
        };

        if phase1.tool_calls.is_empty() {
            return Ok(Turn {
                reply: phase1.content.unwrap_or_else(|| EMPTY_REPLY.to_string()),
                outcomes: Vec::new(),
                degraded: false,
            });
        }

        // Every call must parse before any of them is dispatched.
        let parsed = match parse_tool_calls(&phase1.tool_calls) {
            Ok(parsed) => parsed,
            Err(bad) => {
                warn!(
                    tool = %bad.name,
                    tool_call_id = %bad.id,
                    payload = %bad.arguments,
                    "Malformed tool-call arguments; nothing dispatched"
                );
                self.log_model_failure(conversation_id, 1, "malformed tool-call arguments");
                return Ok(Turn::degraded());
            }
        };

        let outcomes = self.dispatch_all(ctx, conversation_id, parsed).await?;

        messages.push(ChatMessage::assistant_tool_calls(
            phase1.content.clone().unwrap_or_default(),
            phase1.tool_calls.clone(),
        ));
        for outcome in &outcomes {
            messages.push(ChatMessage::tool_result(
                outcome.tool_call_id(),
                outcome.to_model_content(),
            ));
        }

        let (reply, degraded) = match self.model.complete(&messages, &[]).await {
            Ok(ModelReply {
                content: Some(text),
                ..
            }) => (text, false),
            Ok(_) => (fallback_reply(phase1.content.as_deref(), &outcomes), false),
            Err(err) => {
                warn!(model = self.model.name(), error = %err, "Phase-2 model call failed");
                self.log_model_failure(conversation_id, 2, &err);
                (fallback_reply(phase1.content.as_deref(), &outcomes), true)
            }
        };

        Ok(Turn {
            reply,
            outcomes,
            degraded,
        })
    }

    async fn dispatch_all(
        &self,
        ctx: &RequestContext,
        conversation_id: &ConversationId,
        calls: Vec<ParsedCall>,
    ) -> Result<Vec<ToolOutcome>> {
        let mut snapshot: Option<Vec<CatalogEntry>> = None;
        let mut outcomes = Vec::with_capacity(calls.len());

        for (index, parsed) in calls.into_iter().enumerate() {
            let started = Instant::now();
            let (outcome, classification) = if index >= self.config.max_tool_calls {
                let reason = format!(
                    "limit of {} tool calls per turn reached",
                    self.config.max_tool_calls
                );
                (declined(&parsed.call, reason), "SKIPPED")
            } else {
                self.dispatch(ctx, conversation_id, &parsed, &mut snapshot)
                    .await?
            };

            debug!(
                tool = %parsed.call.name,
                outcome = outcome.label(),
                "Tool call dispatched"
            );
            if let Some(ref log) = self.tool_log {
                if let Err(err) = log.log_tool_call(
                    conversation_id,
                    &parsed.call.name,
                    classification,
                    outcome.label(),
                    started.elapsed().as_millis() as u64,
                    &parsed.args,
                ) {
                    warn!(error = %err, "Failed to write tool-call log");
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        conversation_id: &ConversationId,
        parsed: &ParsedCall,
        snapshot: &mut Option<Vec<CatalogEntry>>,
    ) -> Result<(ToolOutcome, &'static str)> {
        let call = &parsed.call;
        if !self.tools.contains(&call.name) {
            return Ok((declined(call, format!("unknown tool '{}'", call.name)), "UNKNOWN"));
        }

        let classification = classify(&call.name, ctx.capabilities());
        let label = classification.label();
        if let Classification::Rejected { reason } = classification {
            info!(tool = %call.name, role = %ctx.role, "Tool call rejected for role");
            return Ok((declined(call, reason), label));
        }

        let mut payload = match ActionPayload::parse(&call.name, parsed.args.clone()) {
            Ok(payload) => payload,
            Err(err) => return Ok((declined(call, err.to_string()), label)),
        };

        if !payload.item_refs_mut().is_empty() {
            if snapshot.is_none() {
                *snapshot = Some(
                    self.catalog
                        .snapshot(&ctx.company_id, ctx.branch_id.as_ref())
                        .await?,
                );
            }
            let catalog = snapshot.as_deref().unwrap_or_default();

            let candidates = match resolve_item_refs(&mut payload, catalog) {
                Ok(candidates) => candidates,
                Err(err @ MediationError::AmbiguousCatalog { .. }) => {
                    return Ok((failed(call, err.to_string()), label));
                }
                Err(err) => return Err(err),
            };
            if candidates.iter().any(|c| !c.is_actionable()) {
                return Ok((
                    ToolOutcome::NeedsClarification {
                        tool_call_id: call.id.clone(),
                        tool: call.name.clone(),
                        candidates,
                    },
                    label,
                ));
            }
        }

        let outcome = if classification == Classification::Read {
            match self.execute_read(ctx, &payload).await {
                Ok(result) => ToolOutcome::Executed {
                    tool_call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: payload.arguments()?,
                    result,
                },
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "Read tool failed");
                    failed(call, err.to_string())
                }
            }
        } else {
            let action = self
                .proposer
                .propose(
                    &ctx.company_id,
                    Some(conversation_id),
                    &call.name,
                    &payload.arguments_json()?,
                    Some(&ctx.user_id),
                )
                .await?;
            ToolOutcome::Proposed {
                tool_call_id: call.id.clone(),
                tool: call.name.clone(),
                action,
            }
        };

        Ok((outcome, label))
    }

    async fn execute_read(&self, ctx: &RequestContext, payload: &ActionPayload) -> Result<Value> {
        let branch = ctx.branch_id.as_ref();
        match payload {
            ActionPayload::LookupStock(args) => {
                let item_id = args.item.require_id()?;
                let level = self
                    .inventory
                    .stock_level(&ctx.company_id, item_id)
                    .await?
                    .ok_or_else(|| MediationError::not_found(format!("catalog item {}", item_id)))?;
                Ok(serde_json::to_value(level)?)
            }
            ActionPayload::SearchCatalog(args) => {
                let limit = args.limit.unwrap_or(self.config.search_limit).clamp(1, 50);
                let rows = self
                    .inventory
                    .search(&ctx.company_id, branch, &args.query, limit)
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
            ActionPayload::ListLowStock(_) => {
                let rows = self.inventory.low_stock(&ctx.company_id, branch).await?;
                Ok(serde_json::to_value(rows)?)
            }
            other => Err(MediationError::execution(format!(
                "'{}' is not a read operation",
                other.action_type()
            ))),
        }
    }

    fn log_model_failure(&self, conversation_id: &ConversationId, phase: u8, err: impl ToString) {
        if let Some(ref log) = self.tool_log {
            if let Err(log_err) = log.log_model_failure(conversation_id, phase, &err.to_string()) {
                warn!(error = %log_err, "Failed to write tool-call log");
            }
        }
    }
}

fn parse_tool_calls(calls: &[ToolCall]) -> std::result::Result<Vec<ParsedCall>, ToolCall> {
    calls
        .iter()
        .map(|call| {
            let raw = call.arguments.trim();
            let args = if raw.is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(raw).map_err(|_| call.clone())?
            };
            Ok(ParsedCall {
                call: call.clone(),
                args,
            })
        })
        .collect()
}

/// Resolve every item reference in `payload` against the snapshot and
/// write the chosen ids back into it.
fn resolve_item_refs(
    payload: &mut ActionPayload,
    catalog: &[CatalogEntry],
) -> Result<Vec<MatchCandidate>> {
    let by_id: HashMap<&CatalogItemId, &CatalogEntry> =
        catalog.iter().map(|e| (&e.id, e)).collect();
    let mut refs = payload.item_refs_mut();

    let queries: Vec<_> = refs
        .iter()
        .filter(|r| r.item_id.is_none())
        .map(|r| r.to_query())
        .collect();
    let mut matched = resolve_many(&queries, catalog)?.into_iter();

    let mut candidates = Vec::with_capacity(refs.len());
    for item in refs.iter_mut() {
        let candidate = match item.item_id {
            Some(ref id) => match by_id.get(id) {
                Some(entry) => MatchCandidate {
                    source_text: item.name.clone(),
                    catalog_item_id: Some(entry.id.clone()),
                    confidence_tier: ConfidenceTier::Exact,
                    reason: format!("Catalog id {} given", entry.id),
                },
                None => MatchCandidate {
                    source_text: item.name.clone(),
                    catalog_item_id: None,
                    confidence_tier: ConfidenceTier::Manual,
                    reason: format!("Catalog id {} is not in this catalog", id),
                },
            },
            None => matched
                .next()
                .ok_or_else(|| MediationError::Storage("resolver returned too few candidates".into()))?,
        };

        if let Some(entry) = candidate.catalog_item_id.as_ref().and_then(|id| by_id.get(id)) {
            **item = ItemRef {
                item_id: Some(entry.id.clone()),
                name: entry.name.clone(),
                category: Some(entry.category.clone()).filter(|c| !c.is_empty()),
                unit: Some(entry.unit.clone()).filter(|u| !u.is_empty()),
                sku: entry.sku.clone(),
            };
        }
        candidates.push(candidate);
    }

    Ok(candidates)
}

/// Reply when phase 2 produced no text: the phase-1 text (if any) followed
/// by one line per tool call.
fn fallback_reply(phase1_text: Option<&str>, outcomes: &[ToolOutcome]) -> String {
    let mut reply = String::new();
    if let Some(text) = phase1_text.map(str::trim).filter(|t| !t.is_empty()) {
        reply.push_str(text);
        reply.push_str("\n\n");
    }
    reply.push_str("Here is what happened:\n");
    let lines: Vec<String> = outcomes.iter().map(ToolOutcome::summary_line).collect();
    reply.push_str(&lines.join("\n"));
    reply
}

fn declined(call: &ToolCall, reason: String) -> ToolOutcome {
    ToolOutcome::Declined {
        tool_call_id: call.id.clone(),
        tool: call.name.clone(),
        reason,
    }
}

fn failed(call: &ToolCall, error: String) -> ToolOutcome {
    ToolOutcome::Failed {
        tool_call_id: call.id.clone(),
        tool: call.name.clone(),
        error,
    }
}
