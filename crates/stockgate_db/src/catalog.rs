//! Catalog operations (matching targets)

use crate::error::{DbError, Result};
use crate::ids::{BranchId, CatalogItemId, CompanyId};
use crate::types::*;
use crate::StockDb;
use sqlx::Row;
use tracing::info;

impl StockDb {
    /// Catalog rows visible from a branch: company-wide rows plus the
    /// branch's own. With no branch, every row of the company.
    pub async fn catalog_snapshot(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<CatalogEntry>> {
        let rows = match branch_id {
            Some(branch) => {
                sqlx::query(
                    r#"
                    SELECT * FROM catalog_items
                    WHERE company_id = ? AND (branch_id = '' OR branch_id = ?)
                    ORDER BY name, id
                    "#,
                )
                .bind(company_id.as_str())
                .bind(branch.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM catalog_items WHERE company_id = ? ORDER BY name, id")
                    .bind(company_id.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_catalog_entry).collect())
    }

    /// Get one catalog row.
    pub async fn catalog_get(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
    ) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query("SELECT * FROM catalog_items WHERE id = ? AND company_id = ?")
            .bind(item_id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_catalog_entry))
    }

    /// Upsert catalog rows keyed by (company, branch, name) and set their
    /// stock levels. Returns the number of rows written.
    pub async fn catalog_import(
        &self,
        company_id: &CompanyId,
        entries: &[NewCatalogEntry],
    ) -> Result<usize> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(DbError::constraint("catalog entry name must not be empty"));
            }
            let branch = entry.branch_id.as_ref().map(|b| b.as_str()).unwrap_or("");

            sqlx::query(
                r#"
                INSERT INTO catalog_items (id, company_id, branch_id, name, category, unit, sku, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(company_id, branch_id, name) DO UPDATE SET
                    category = excluded.category,
                    unit = excluded.unit,
                    sku = excluded.sku
                "#,
            )
            .bind(CatalogItemId::new().as_str())
            .bind(company_id.as_str())
            .bind(branch)
            .bind(name)
            .bind(entry.category.trim())
            .bind(entry.unit.trim())
            .bind(entry.sku.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let item_id: String = sqlx::query(
                "SELECT id FROM catalog_items WHERE company_id = ? AND branch_id = ? AND name = ?",
            )
            .bind(company_id.as_str())
            .bind(branch)
            .bind(name)
            .fetch_one(&mut *tx)
            .await?
            .get("id");

            sqlx::query(
                r#"
                INSERT INTO stock_levels (item_id, quantity_on_hand, par_level, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(item_id) DO UPDATE SET
                    quantity_on_hand = excluded.quantity_on_hand,
                    par_level = excluded.par_level,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&item_id)
            .bind(entry.quantity_on_hand)
            .bind(entry.par_level)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(company_id = %company_id, count = entries.len(), "Catalog imported");
        Ok(entries.len())
    }
}

pub(crate) fn row_to_catalog_entry(row: &sqlx::sqlite::SqliteRow) -> CatalogEntry {
    let branch: String = row.get("branch_id");
    CatalogEntry {
        id: CatalogItemId::from_string(row.get::<String, _>("id")),
        company_id: CompanyId::from_string(row.get::<String, _>("company_id")),
        branch_id: (!branch.is_empty()).then(|| BranchId::from_string(branch)),
        name: row.get("name"),
        category: row.get("category"),
        unit: row.get("unit"),
        sku: row.get("sku"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, category: &str, branch: Option<&str>) -> NewCatalogEntry {
        NewCatalogEntry {
            name: name.to_string(),
            category: category.to_string(),
            unit: "ea".to_string(),
            sku: None,
            branch_id: branch.map(BranchId::from_string),
            quantity_on_hand: 10.0,
            par_level: Some(4.0),
        }
    }

    #[tokio::test]
    async fn test_snapshot_scopes_branch() {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        db.catalog_import(
            &company,
            &[
                entry("20A Breaker", "Breakers", None),
                entry("Panel 100A", "Panels", Some("north")),
                entry("Panel 200A", "Panels", Some("south")),
            ],
        )
        .await
        .unwrap();

        let north = BranchId::from_string("north");
        let visible = db.catalog_snapshot(&company, Some(&north)).await.unwrap();
        let names: Vec<_> = visible.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["20A Breaker", "Panel 100A"]);

        assert_eq!(db.catalog_snapshot(&company, None).await.unwrap().len(), 3);
        let other = CompanyId::from_string("globex");
        assert!(db.catalog_snapshot(&other, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_upserts_by_name() {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        db.catalog_import(&company, &[entry("12/2 MC", "Wire", None)])
            .await
            .unwrap();
        db.catalog_import(&company, &[entry("12/2 MC", "Cable/Wire", None)])
            .await
            .unwrap();

        let rows = db.catalog_snapshot(&company, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "Cable/Wire");
        assert!(rows[0].branch_id.is_none());
    }

    #[tokio::test]
    async fn test_import_rejects_blank_name() {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        let result = db.catalog_import(&company, &[entry("  ", "Wire", None)]).await;
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }
}
