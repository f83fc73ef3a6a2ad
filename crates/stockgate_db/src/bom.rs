//! BOM draft persistence.
//!
//! Lines of a `SUBMITTED` draft are frozen; every write below checks the
//! parent status inside its transaction.

use crate::error::{DbError, Result};
use crate::ids::{ActionId, BomLineId, CatalogItemId, CompanyId, DraftId};
use crate::types::*;
use crate::StockDb;
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;

impl StockDb {
    /// Store a freshly extracted draft.
    pub async fn bom_draft_create(
        &self,
        company_id: &CompanyId,
        name: &str,
        extracted_lines: &[ExtractedLine],
    ) -> Result<BomDraft> {
        let draft = BomDraft {
            id: DraftId::new(),
            company_id: company_id.clone(),
            name: name.to_string(),
            status: BomDraftStatus::Extracted,
            extracted_lines: extracted_lines.to_vec(),
            created_at: chrono::Utc::now(),
            submitted_action_id: None,
        };

        sqlx::query(
            r#"
            INSERT INTO bom_drafts (id, company_id, name, status, extracted_lines_json, created_at)
            VALUES (?, ?, ?, 'EXTRACTED', ?, ?)
            "#,
        )
        .bind(draft.id.as_str())
        .bind(company_id.as_str())
        .bind(&draft.name)
        .bind(serde_json::to_string(&draft.extracted_lines)?)
        .bind(draft.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        info!(draft_id = %draft.id, lines = extracted_lines.len(), "BOM draft stored");
        Ok(draft)
    }

    pub async fn bom_draft_get(
        &self,
        company_id: &CompanyId,
        id: &DraftId,
    ) -> Result<Option<BomDraft>> {
        let row = sqlx::query("SELECT * FROM bom_drafts WHERE id = ? AND company_id = ?")
            .bind(id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_draft(&row)).transpose()
    }

    /// Drafts for a company, newest first.
    pub async fn bom_draft_list(&self, company_id: &CompanyId) -> Result<Vec<BomDraft>> {
        let rows = sqlx::query(
            "SELECT * FROM bom_drafts WHERE company_id = ? ORDER BY created_at DESC, id",
        )
        .bind(company_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_draft).collect()
    }

    /// Line items of a draft in document order.
    pub async fn bom_lines(&self, draft_id: &DraftId) -> Result<Vec<BomLineItem>> {
        let rows = sqlx::query(
            "SELECT * FROM bom_line_items WHERE draft_id = ? ORDER BY line_index",
        )
        .bind(draft_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line).collect()
    }

    /// Replace the machine-resolved lines of a draft and mark it
    /// `PROCESSED`. Manually overridden lines survive; a new line at the
    /// same index is dropped.
    pub async fn bom_replace_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        lines: &[BomLineItem],
    ) -> Result<Vec<BomLineItem>> {
        let mut tx = self.pool.begin().await?;
        claim_open_draft(&mut tx, company_id, draft_id, Some(BomDraftStatus::Processed)).await?;

        sqlx::query("DELETE FROM bom_line_items WHERE draft_id = ? AND manually_overridden = 0")
            .bind(draft_id.as_str())
            .execute(&mut *tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO bom_line_items (
                    id, draft_id, line_index, extracted_name, extracted_qty, extracted_unit,
                    extracted_category, matched_item_id, suggested_item_id, confidence_tier,
                    match_reason, manually_overridden
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(line.id.as_str())
            .bind(draft_id.as_str())
            .bind(line.line_index)
            .bind(&line.extracted_name)
            .bind(line.extracted_qty)
            .bind(line.extracted_unit.as_deref())
            .bind(line.extracted_category.as_deref())
            .bind(line.matched_item_id.as_ref().map(|i| i.as_str()))
            .bind(line.suggested_item_id.as_ref().map(|i| i.as_str()))
            .bind(line.confidence_tier.as_str())
            .bind(&line.match_reason)
            .bind(line.manually_overridden)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.bom_lines(draft_id).await
    }

    /// Apply reviewer edits. Each patched line becomes manually overridden.
    pub async fn bom_patch_lines(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        patches: &[BomLinePatch],
    ) -> Result<Vec<BomLineItem>> {
        let mut tx = self.pool.begin().await?;
        claim_open_draft(&mut tx, company_id, draft_id, None).await?;

        for patch in patches {
            if let Some(quantity) = patch.quantity {
                if quantity <= 0.0 {
                    return Err(DbError::constraint(format!(
                        "line {} quantity must be positive",
                        patch.id
                    )));
                }
            }
            if let Some(ref item_id) = patch.matched_item_id {
                require_catalog_item(&mut tx, company_id, item_id).await?;
            }

            let result = sqlx::query(
                r#"
                UPDATE bom_line_items SET
                    matched_item_id = COALESCE(?, matched_item_id),
                    extracted_qty = COALESCE(?, extracted_qty),
                    confidence_tier = CASE WHEN ? IS NULL THEN confidence_tier ELSE 'MANUAL' END,
                    match_reason = CASE WHEN ? IS NULL THEN match_reason ELSE 'Selected by reviewer' END,
                    manually_overridden = 1
                WHERE id = ? AND draft_id = ?
                "#,
            )
            .bind(patch.matched_item_id.as_ref().map(|i| i.as_str()))
            .bind(patch.quantity)
            .bind(patch.matched_item_id.as_ref().map(|i| i.as_str()))
            .bind(patch.matched_item_id.as_ref().map(|i| i.as_str()))
            .bind(patch.id.as_str())
            .bind(draft_id.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found(format!(
                    "line {} in draft {}",
                    patch.id, draft_id
                )));
            }
        }

        tx.commit().await?;
        self.bom_lines(draft_id).await
    }

    /// Mark a processed draft submitted. Returns `false` if it was not in
    /// `PROCESSED` any more.
    pub async fn bom_draft_mark_submitted(
        &self,
        company_id: &CompanyId,
        draft_id: &DraftId,
        action_id: &ActionId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bom_drafts SET status = 'SUBMITTED', submitted_action_id = ?
            WHERE id = ? AND company_id = ? AND status = 'PROCESSED'
            "#,
        )
        .bind(action_id.as_str())
        .bind(draft_id.as_str())
        .bind(company_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Take the write lock on an unsubmitted draft, optionally moving it to
/// `status`. Must be the first statement of the transaction so the write
/// lock is held before anything is read.
async fn claim_open_draft(
    tx: &mut Transaction<'_, Sqlite>,
    company_id: &CompanyId,
    draft_id: &DraftId,
    status: Option<BomDraftStatus>,
) -> Result<()> {
    let claimed = sqlx::query(
        "UPDATE bom_drafts SET status = COALESCE(?, status) \
         WHERE id = ? AND company_id = ? AND status != 'SUBMITTED'",
    )
    .bind(status.map(|s| s.as_str()))
    .bind(draft_id.as_str())
    .bind(company_id.as_str())
    .execute(&mut **tx)
    .await?;
    if claimed.rows_affected() > 0 {
        return Ok(());
    }

    let exists = sqlx::query("SELECT 1 FROM bom_drafts WHERE id = ? AND company_id = ?")
        .bind(draft_id.as_str())
        .bind(company_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    match exists {
        Some(_) => Err(DbError::constraint(format!(
            "BOM draft {} is already submitted",
            draft_id
        ))),
        None => Err(DbError::not_found(format!("BOM draft {}", draft_id))),
    }
}

async fn require_catalog_item(
    tx: &mut Transaction<'_, Sqlite>,
    company_id: &CompanyId,
    item_id: &CatalogItemId,
) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM catalog_items WHERE id = ? AND company_id = ?")
        .bind(item_id.as_str())
        .bind(company_id.as_str())
        .fetch_optional(&mut **tx)
        .await?
        .is_some();

    if exists {
        Ok(())
    } else {
        Err(DbError::not_found(format!("catalog item {}", item_id)))
    }
}

fn row_to_draft(row: &sqlx::sqlite::SqliteRow) -> Result<BomDraft> {
    let status_str: String = row.get("status");
    let status = BomDraftStatus::parse(&status_str)
        .ok_or_else(|| DbError::corrupt(format!("Unknown draft status: {}", status_str)))?;
    let lines_json: String = row.get("extracted_lines_json");

    Ok(BomDraft {
        id: DraftId::from_string(row.get::<String, _>("id")),
        company_id: CompanyId::from_string(row.get::<String, _>("company_id")),
        name: row.get("name"),
        status,
        extracted_lines: serde_json::from_str(&lines_json)?,
        created_at: StockDb::millis_to_datetime(row.get("created_at")),
        submitted_action_id: row
            .get::<Option<String>, _>("submitted_action_id")
            .map(ActionId::from_string),
    })
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<BomLineItem> {
    let tier_str: String = row.get("confidence_tier");
    let confidence_tier = ConfidenceTier::parse(&tier_str)
        .ok_or_else(|| DbError::corrupt(format!("Unknown confidence tier: {}", tier_str)))?;

    Ok(BomLineItem {
        id: BomLineId::from_string(row.get::<String, _>("id")),
        draft_id: DraftId::from_string(row.get::<String, _>("draft_id")),
        line_index: row.get("line_index"),
        extracted_name: row.get("extracted_name"),
        extracted_qty: row.get("extracted_qty"),
        extracted_unit: row.get("extracted_unit"),
        extracted_category: row.get("extracted_category"),
        matched_item_id: row
            .get::<Option<String>, _>("matched_item_id")
            .map(CatalogItemId::from_string),
        suggested_item_id: row
            .get::<Option<String>, _>("suggested_item_id")
            .map(CatalogItemId::from_string),
        confidence_tier,
        match_reason: row.get("match_reason"),
        manually_overridden: row.get("manually_overridden"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(name: &str) -> ExtractedLine {
        ExtractedLine {
            name: name.to_string(),
            quantity: 4.0,
            unit: Some("ea".to_string()),
            category: None,
        }
    }

    fn resolved(draft: &BomDraft, index: i64, item: Option<&CatalogItemId>) -> BomLineItem {
        let line = &draft.extracted_lines[index as usize];
        BomLineItem {
            id: BomLineId::new(),
            draft_id: draft.id.clone(),
            line_index: index,
            extracted_name: line.name.clone(),
            extracted_qty: line.quantity,
            extracted_unit: line.unit.clone(),
            extracted_category: line.category.clone(),
            matched_item_id: item.cloned(),
            suggested_item_id: None,
            confidence_tier: if item.is_some() {
                ConfidenceTier::High
            } else {
                ConfidenceTier::Manual
            },
            match_reason: "test".to_string(),
            manually_overridden: false,
        }
    }

    async fn setup() -> (StockDb, CompanyId, CatalogItemId) {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        db.catalog_import(
            &company,
            &[NewCatalogEntry {
                name: "4in Box".into(),
                category: "Boxes".into(),
                unit: "ea".into(),
                sku: None,
                branch_id: None,
                quantity_on_hand: 0.0,
                par_level: None,
            }],
        )
        .await
        .unwrap();
        let item = db.catalog_snapshot(&company, None).await.unwrap()[0].id.clone();
        (db, company, item)
    }

    #[tokio::test]
    async fn test_reprocess_keeps_overrides() {
        let (db, company, item) = setup().await;
        let draft = db
            .bom_draft_create(&company, "Job 12", &[extracted("4in box"), extracted("mystery")])
            .await
            .unwrap();

        let first = vec![resolved(&draft, 0, Some(&item)), resolved(&draft, 1, None)];
        db.bom_replace_lines(&company, &draft.id, &first).await.unwrap();

        let patched = db
            .bom_patch_lines(
                &company,
                &draft.id,
                &[BomLinePatch {
                    id: first[1].id.clone(),
                    matched_item_id: Some(item.clone()),
                    quantity: Some(9.0),
                }],
            )
            .await
            .unwrap();
        assert!(patched[1].manually_overridden);
        assert_eq!(patched[1].extracted_qty, 9.0);

        let second = vec![resolved(&draft, 0, Some(&item)), resolved(&draft, 1, None)];
        let lines = db.bom_replace_lines(&company, &draft.id, &second).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, second[0].id);
        assert_eq!(lines[1].id, first[1].id);
        assert_eq!(lines[1].matched_item_id.as_ref(), Some(&item));

        let stored = db.bom_draft_get(&company, &draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BomDraftStatus::Processed);
    }

    #[tokio::test]
    async fn test_submitted_draft_is_frozen() {
        let (db, company, item) = setup().await;
        let draft = db
            .bom_draft_create(&company, "Job 7", &[extracted("4in box")])
            .await
            .unwrap();
        let lines = vec![resolved(&draft, 0, Some(&item))];
        db.bom_replace_lines(&company, &draft.id, &lines).await.unwrap();

        let action = ActionId::new();
        assert!(db
            .bom_draft_mark_submitted(&company, &draft.id, &action)
            .await
            .unwrap());
        assert!(!db
            .bom_draft_mark_submitted(&company, &draft.id, &action)
            .await
            .unwrap());

        let patch = BomLinePatch {
            id: lines[0].id.clone(),
            matched_item_id: None,
            quantity: Some(1.0),
        };
        let result = db.bom_patch_lines(&company, &draft.id, &[patch]).await;
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_patch_rejects_unknown_item() {
        let (db, company, _) = setup().await;
        let draft = db
            .bom_draft_create(&company, "Job 3", &[extracted("4in box")])
            .await
            .unwrap();
        let lines = vec![resolved(&draft, 0, None)];
        db.bom_replace_lines(&company, &draft.id, &lines).await.unwrap();

        let patch = BomLinePatch {
            id: lines[0].id.clone(),
            matched_item_id: Some(CatalogItemId::new()),
            quantity: None,
        };
        let result = db.bom_patch_lines(&company, &draft.id, &[patch]).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_suggestion_stored_without_match() {
        let (db, company, item) = setup().await;
        let draft = db
            .bom_draft_create(&company, "Job 5", &[extracted("4 inch bx")])
            .await
            .unwrap();
        let mut line = resolved(&draft, 0, None);
        line.confidence_tier = ConfidenceTier::Low;
        line.suggested_item_id = Some(item.clone());

        let lines = db.bom_replace_lines(&company, &draft.id, &[line]).await.unwrap();
        assert_eq!(lines[0].matched_item_id, None);
        assert_eq!(lines[0].suggested_item_id.as_ref(), Some(&item));
    }

    #[tokio::test]
    async fn test_unknown_draft_not_found() {
        let (db, company, _) = setup().await;
        let result = db.bom_replace_lines(&company, &DraftId::new(), &[]).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));

        let draft = db
            .bom_draft_create(&company, "Job 9", &[extracted("4in box")])
            .await
            .unwrap();
        let other = CompanyId::from_string("globex");
        let result = db.bom_patch_lines(&other, &draft.id, &[]).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
