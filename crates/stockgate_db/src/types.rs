//! Unified types for all Stockgate database entities.
//!
//! These types are the single source of truth. The mediation pipeline and
//! the CLI use them directly.

use crate::ids::{
    ActionId, BomLineId, BranchId, CatalogItemId, CompanyId, ConversationId, DraftId,
    PurchaseOrderId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Action Ledger Types
// ============================================================================

/// Lifecycle state of a proposed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Proposed,
    Confirmed,
    Executed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 5] = [
        Self::Proposed,
        Self::Confirmed,
        Self::Executed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::Confirmed => "CONFIRMED",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Cancelled)
    }

    /// The only edges of the ledger state machine.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Confirmed)
                | (Self::Proposed, Self::Cancelled)
                | (Self::Confirmed, Self::Executed)
                | (Self::Confirmed, Self::Failed)
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gated mutation row.
///
/// `result_json` is set iff `status == Executed`; `error_message` iff
/// `status == Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    pub id: ActionId,
    pub company_id: CompanyId,
    pub conversation_id: Option<ConversationId>,
    pub action_type: String,
    /// Opaque payload owned by the executor for `action_type`.
    pub arguments_json: String,
    pub status: ActionStatus,
    pub proposed_by: Option<UserId>,
    pub decided_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
}

impl ProposedAction {
    /// Build a fresh `PROPOSED` row.
    pub fn new(
        company_id: CompanyId,
        conversation_id: Option<ConversationId>,
        action_type: impl Into<String>,
        arguments_json: impl Into<String>,
        proposed_by: Option<UserId>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            company_id,
            conversation_id,
            action_type: action_type.into(),
            arguments_json: arguments_json.into(),
            status: ActionStatus::Proposed,
            proposed_by,
            decided_by: None,
            created_at: Utc::now(),
            confirmed_at: None,
            executed_at: None,
            cancelled_at: None,
            result_json: None,
            error_message: None,
        }
    }
}

/// Audit-log row written when (and only when) an action reaches `EXECUTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action_id: ActionId,
    pub company_id: CompanyId,
    pub action_type: String,
    pub actor: Option<UserId>,
    pub proposed_args: String,
    pub result: String,
    pub recorded_at: DateTime<Utc>,
}

/// Filter for listing ledger rows.
#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub status: Option<ActionStatus>,
    pub conversation_id: Option<ConversationId>,
    pub limit: Option<usize>,
}

// ============================================================================
// Catalog & Inventory Types
// ============================================================================

/// Matching target. Names are unique per company + branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: CatalogItemId,
    pub company_id: CompanyId,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub sku: Option<String>,
}

/// Catalog row as supplied for import (ids are minted on insert).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCatalogEntry {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub quantity_on_hand: f64,
    #[serde(default)]
    pub par_level: Option<f64>,
}

/// On-hand quantity for one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub item_id: CatalogItemId,
    pub item_name: String,
    pub category: String,
    pub unit: String,
    pub quantity_on_hand: f64,
    pub par_level: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    pub fn is_below_par(&self) -> bool {
        self.par_level
            .map(|par| self.quantity_on_hand < par)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderLine {
    pub item_id: CatalogItemId,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub company_id: CompanyId,
    pub vendor: Option<String>,
    pub created_by: Option<UserId>,
    /// Ledger action that produced this order.
    pub source_action_id: Option<ActionId>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<PurchaseOrderLine>,
}

// ============================================================================
// BOM Types
// ============================================================================

/// Confidence tier attached to every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Exact,
    High,
    Medium,
    Low,
    Manual,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXACT" => Some(Self::Exact),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Whether a match at this tier may drive an operation without a human
    /// picking the item first.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Exact | Self::High | Self::Medium)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BomDraftStatus {
    Extracted,
    Processed,
    Submitted,
}

impl BomDraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "EXTRACTED",
            Self::Processed => "PROCESSED",
            Self::Submitted => "SUBMITTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXTRACTED" => Some(Self::Extracted),
            "PROCESSED" => Some(Self::Processed),
            "SUBMITTED" => Some(Self::Submitted),
            _ => None,
        }
    }
}

/// One line as returned by document extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLine {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomDraft {
    pub id: DraftId,
    pub company_id: CompanyId,
    pub name: String,
    pub status: BomDraftStatus,
    pub extracted_lines: Vec<ExtractedLine>,
    pub created_at: DateTime<Utc>,
    pub submitted_action_id: Option<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomLineItem {
    pub id: BomLineId,
    pub draft_id: DraftId,
    pub line_index: i64,
    pub extracted_name: String,
    pub extracted_qty: f64,
    pub extracted_unit: Option<String>,
    pub extracted_category: Option<String>,
    pub matched_item_id: Option<CatalogItemId>,
    /// Best candidate for a line too uncertain to match on its own.
    #[serde(default)]
    pub suggested_item_id: Option<CatalogItemId>,
    pub confidence_tier: ConfidenceTier,
    pub match_reason: String,
    pub manually_overridden: bool,
}

/// Reviewer edit to one line. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomLinePatch {
    pub id: BomLineId,
    #[serde(default)]
    pub matched_item_id: Option<CatalogItemId>,
    #[serde(default)]
    pub quantity: Option<f64>,
}

// ============================================================================
// Conversation Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_edges() {
        use ActionStatus::*;
        assert!(Proposed.can_transition_to(Confirmed));
        assert!(Proposed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Executed));
        assert!(Confirmed.can_transition_to(Failed));
        assert!(!Proposed.can_transition_to(Executed));
        assert!(!Confirmed.can_transition_to(Cancelled));

        for terminal in [Executed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in ActionStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ActionStatus::parse("proposed"), Some(ActionStatus::Proposed));
        assert_eq!(ActionStatus::parse(" EXECUTED "), Some(ActionStatus::Executed));
        assert_eq!(ActionStatus::parse("done"), None);
    }

    #[test]
    fn test_tier_actionable() {
        assert!(ConfidenceTier::Exact.is_actionable());
        assert!(ConfidenceTier::Medium.is_actionable());
        assert!(!ConfidenceTier::Low.is_actionable());
        assert!(!ConfidenceTier::Manual.is_actionable());
    }
}
