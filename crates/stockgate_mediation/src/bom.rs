//! BOM pipeline: document -> extracted lines -> matched lines -> one
//! purchase-order proposal.
//!
//! ```text
//! import  -> EXTRACTED
//! process -> PROCESSED   (re-runnable; reviewer overrides survive)
//! patch   -> PROCESSED   (lines become manually overridden)
//! submit  -> SUBMITTED   (+ one PROPOSED create_purchase_order row)
//! ```
//!
//! Matching goes through the same resolver as the chat path. Only an
//! actionable tier fills `matched_item_id`; LOW and MANUAL lines wait for a
//! reviewer.

use crate::actions::{CreatePurchaseOrderArgs, ItemRef, OrderLineArgs, CREATE_PURCHASE_ORDER};
use crate::classifier::{classify, Classification};
use crate::context::{Capability, RequestContext};
use crate::error::{MediationError, Result};
use crate::ledger::Proposer;
use crate::matcher::MatchQuery;
use crate::orchestrator::{ChatMessage, ChatModel};
use crate::resolver::resolve_many;
use crate::store::{BomStore, CatalogReader};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use stockgate_db::{
    BomDraft, BomDraftStatus, BomLineId, BomLineItem, BomLinePatch, DraftId, ExtractedLine,
    ProposedAction,
};
use tracing::{info, warn};

// ============================================================================
// Extraction
// ============================================================================

/// Turns an uploaded document into line items.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, document: &str) -> Result<Vec<ExtractedLine>>;
}

/// Documents that already are structured: a JSON array of lines, or an
/// object with a `lines` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentExtractor;

#[async_trait]
impl DocumentExtractor for JsonDocumentExtractor {
    async fn extract(&self, document: &str) -> Result<Vec<ExtractedLine>> {
        parse_extracted_lines(document)
    }
}

/// Free-text documents, read by the chat model.
pub struct ModelDocumentExtractor {
    model: Arc<dyn ChatModel>,
}

impl ModelDocumentExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

const EXTRACTION_PROMPT: &str = "Extract the bill of materials from the document the user sends. \
Answer with JSON only: an array of objects with fields \"name\" (string), \"quantity\" (number), \
\"unit\" (string or null) and \"category\" (string or null). Do not invent lines.";

#[async_trait]
impl DocumentExtractor for ModelDocumentExtractor {
    async fn extract(&self, document: &str) -> Result<Vec<ExtractedLine>> {
        let messages = [
            ChatMessage::system(EXTRACTION_PROMPT),
            ChatMessage::user(document),
        ];
        let reply = self.model.complete(&messages, &[]).await?;
        let text = reply
            .content
            .ok_or_else(|| MediationError::UpstreamModel("extraction reply was empty".into()))?;

        parse_extracted_lines(strip_code_fence(&text)).map_err(|e| {
            warn!(model = self.model.name(), error = %e, "Unusable extraction reply");
            MediationError::UpstreamModel(format!("extraction reply was not valid lines: {}", e))
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

fn parse_extracted_lines(document: &str) -> Result<Vec<ExtractedLine>> {
    let value: Value = serde_json::from_str(document.trim())?;
    let lines = match value {
        Value::Object(mut map) => map
            .remove("lines")
            .ok_or_else(|| MediationError::validation("document has no 'lines' array"))?,
        other => other,
    };
    let lines: Vec<ExtractedLine> = serde_json::from_value(lines)?;

    if lines.is_empty() {
        return Err(MediationError::validation("document contains no lines"));
    }
    for (index, line) in lines.iter().enumerate() {
        if line.name.trim().is_empty() {
            return Err(MediationError::validation(format!("line {} has no name", index)));
        }
        if line.quantity.is_nan() || line.quantity <= 0.0 {
            return Err(MediationError::validation(format!(
                "line {} ('{}') needs a positive quantity",
                index, line.name
            )));
        }
    }
    Ok(lines)
}

// ============================================================================
// Service
// ============================================================================

/// `{items, matchedCount, totalCount}` after processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDraft {
    pub items: Vec<BomLineItem>,
    pub matched_count: usize,
    pub total_count: usize,
}

impl ProcessedDraft {
    fn from_items(items: Vec<BomLineItem>) -> Self {
        Self {
            matched_count: items.iter().filter(|l| l.matched_item_id.is_some()).count(),
            total_count: items.len(),
            items,
        }
    }
}

/// A draft with its current lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub draft: BomDraft,
    pub items: Vec<BomLineItem>,
}

pub struct BomService {
    store: Arc<dyn BomStore>,
    catalog: Arc<dyn CatalogReader>,
    proposer: Proposer,
}

impl BomService {
    pub fn new(store: Arc<dyn BomStore>, catalog: Arc<dyn CatalogReader>, proposer: Proposer) -> Self {
        Self {
            store,
            catalog,
            proposer,
        }
    }

    /// Run the extractor and store the result as a new `EXTRACTED` draft.
    pub async fn import_extraction(
        &self,
        ctx: &RequestContext,
        name: &str,
        document: &str,
        extractor: &dyn DocumentExtractor,
    ) -> Result<BomDraft> {
        require(ctx, Capability::InventoryRead)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(MediationError::validation("draft name must not be empty"));
        }

        let lines = extractor.extract(document).await?;
        let draft = self.store.create_draft(&ctx.company_id, name, &lines).await?;

        info!(draft_id = %draft.id, lines = lines.len(), "Imported BOM draft");
        Ok(draft)
    }

    pub async fn get_draft(&self, ctx: &RequestContext, draft_id: &DraftId) -> Result<DraftView> {
        require(ctx, Capability::InventoryRead)?;
        let draft = self.load(ctx, draft_id).await?;
        let items = self.store.lines(draft_id).await?;
        Ok(DraftView { draft, items })
    }

    pub async fn list_drafts(&self, ctx: &RequestContext) -> Result<Vec<BomDraft>> {
        require(ctx, Capability::InventoryRead)?;
        self.store.list_drafts(&ctx.company_id).await
    }

    /// Match every extracted line against a fresh catalog snapshot.
    pub async fn process_draft(
        &self,
        ctx: &RequestContext,
        draft_id: &DraftId,
    ) -> Result<ProcessedDraft> {
        require(ctx, Capability::InventoryRead)?;
        let draft = self.load(ctx, draft_id).await?;
        if draft.status == BomDraftStatus::Submitted {
            return Err(MediationError::validation(format!(
                "draft {} is already submitted",
                draft_id
            )));
        }

        let catalog = self
            .catalog
            .snapshot(&ctx.company_id, ctx.branch_id.as_ref())
            .await?;
        let queries: Vec<MatchQuery> = draft.extracted_lines.iter().map(MatchQuery::from).collect();
        let candidates = resolve_many(&queries, &catalog)?;

        let lines: Vec<BomLineItem> = draft
            .extracted_lines
            .iter()
            .zip(candidates)
            .enumerate()
            .map(|(index, (line, candidate))| {
                // A weak candidate is kept as a hint for the reviewer but
                // never counts as a match.
                let (matched_item_id, suggested_item_id) =
                    if candidate.confidence_tier.is_actionable() {
                        (candidate.catalog_item_id, None)
                    } else {
                        (None, candidate.catalog_item_id)
                    };
                BomLineItem {
                    id: BomLineId::new(),
                    draft_id: draft_id.clone(),
                    line_index: index as i64,
                    extracted_name: line.name.clone(),
                    extracted_qty: line.quantity,
                    extracted_unit: line.unit.clone(),
                    extracted_category: line.category.clone(),
                    matched_item_id,
                    suggested_item_id,
                    confidence_tier: candidate.confidence_tier,
                    match_reason: candidate.reason,
                    manually_overridden: false,
                }
            })
            .collect();

        let items = self
            .store
            .replace_lines(&ctx.company_id, draft_id, &lines)
            .await?;
        let processed = ProcessedDraft::from_items(items);

        info!(
            draft_id = %draft_id,
            matched = processed.matched_count,
            total = processed.total_count,
            "Processed BOM draft"
        );
        Ok(processed)
    }

    /// Apply reviewer choices. Patched lines survive later reprocessing.
    pub async fn patch_items(
        &self,
        ctx: &RequestContext,
        draft_id: &DraftId,
        patches: &[BomLinePatch],
    ) -> Result<DraftView> {
        require(ctx, Capability::InventoryRead)?;
        if patches.is_empty() {
            return Err(MediationError::validation("no line edits given"));
        }
        if let Some(empty) = patches
            .iter()
            .find(|p| p.matched_item_id.is_none() && p.quantity.is_none())
        {
            return Err(MediationError::validation(format!(
                "edit for line {} changes nothing",
                empty.id
            )));
        }

        let items = self
            .store
            .patch_lines(&ctx.company_id, draft_id, patches)
            .await?;
        let draft = self.load(ctx, draft_id).await?;

        info!(draft_id = %draft_id, edits = patches.len(), "Patched BOM draft");
        Ok(DraftView { draft, items })
    }

    /// Propose one purchase order covering every line of the draft.
    pub async fn submit_draft(
        &self,
        ctx: &RequestContext,
        draft_id: &DraftId,
        vendor: Option<&str>,
    ) -> Result<ProposedAction> {
        if let Classification::Rejected { reason } =
            classify(CREATE_PURCHASE_ORDER, ctx.capabilities())
        {
            return Err(MediationError::authorization(reason));
        }

        let draft = self.load(ctx, draft_id).await?;
        if draft.status != BomDraftStatus::Processed {
            return Err(MediationError::validation(format!(
                "draft {} is {}; only processed drafts can be submitted",
                draft_id,
                draft.status.as_str()
            )));
        }

        let items = self.store.lines(draft_id).await?;
        let unmatched: Vec<String> = items
            .iter()
            .filter(|l| l.matched_item_id.is_none())
            .map(|l| format!("#{} '{}'", l.line_index, l.extracted_name))
            .collect();
        if items.is_empty() || !unmatched.is_empty() {
            return Err(MediationError::validation(format!(
                "every line needs a catalog item before submitting; unmatched: {}",
                unmatched.join(", ")
            )));
        }

        let lines = items
            .iter()
            .filter_map(|l| {
                l.matched_item_id.clone().map(|id| OrderLineArgs {
                    item: ItemRef::resolved(id, l.extracted_name.clone()),
                    quantity: l.extracted_qty,
                })
            })
            .collect();
        let args = CreatePurchaseOrderArgs {
            vendor: vendor.map(str::to_string),
            lines,
        };

        let action = self
            .proposer
            .propose(
                &ctx.company_id,
                None,
                CREATE_PURCHASE_ORDER,
                &serde_json::to_string(&args)?,
                Some(&ctx.user_id),
            )
            .await?;

        if !self
            .store
            .mark_submitted(&ctx.company_id, draft_id, &action.id)
            .await?
        {
            warn!(
                draft_id = %draft_id,
                action_id = %action.id,
                "Draft was submitted concurrently; cancel the duplicate proposal"
            );
            return Err(MediationError::validation(format!(
                "draft {} was submitted concurrently (duplicate proposal {})",
                draft_id, action.id
            )));
        }

        info!(draft_id = %draft_id, action_id = %action.id, "Submitted BOM draft");
        Ok(action)
    }

    async fn load(&self, ctx: &RequestContext, draft_id: &DraftId) -> Result<BomDraft> {
        self.store
            .get_draft(&ctx.company_id, draft_id)
            .await?
            .ok_or_else(|| MediationError::not_found(format!("BOM draft {}", draft_id)))
    }
}

fn require(ctx: &RequestContext, capability: Capability) -> Result<()> {
    if ctx.role.has(capability) {
        Ok(())
    } else {
        Err(MediationError::authorization(format!(
            "role {} lacks the {} capability",
            ctx.role, capability
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_and_object_forms() {
        let array = r#"[{"name": "12/2 MC", "quantity": 250, "unit": "ft"}]"#;
        let object = r#"{"lines": [{"name": "20A Breaker", "quantity": 4, "category": "Breakers"}]}"#;

        assert_eq!(parse_extracted_lines(array).unwrap()[0].unit.as_deref(), Some("ft"));
        assert_eq!(
            parse_extracted_lines(object).unwrap()[0].category.as_deref(),
            Some("Breakers")
        );
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(parse_extracted_lines("[]").is_err());
        assert!(parse_extracted_lines(r#"[{"name": " ", "quantity": 1}]"#).is_err());
        assert!(parse_extracted_lines(r#"[{"name": "x", "quantity": 0}]"#).is_err());
        assert!(parse_extracted_lines(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence(" [1] "), "[1]");
    }
}
