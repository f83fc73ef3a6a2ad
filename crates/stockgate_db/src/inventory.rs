//! Stock levels and purchase orders.
//!
//! These are the only tables mutated by ledger executors.

use crate::error::{DbError, Result};
use crate::ids::{ActionId, BranchId, CatalogItemId, CompanyId, PurchaseOrderId, UserId};
use crate::types::*;
use crate::StockDb;
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;

const STOCK_SELECT: &str = r#"
    SELECT c.id AS item_id, c.name, c.category, c.unit,
           COALESCE(s.quantity_on_hand, 0) AS quantity_on_hand,
           s.par_level,
           COALESCE(s.updated_at, c.created_at) AS updated_at
    FROM catalog_items c
    LEFT JOIN stock_levels s ON s.item_id = c.id
"#;

impl StockDb {
    /// Stock level for one item.
    pub async fn stock_get(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
    ) -> Result<Option<StockLevel>> {
        let sql = format!("{} WHERE c.id = ? AND c.company_id = ?", STOCK_SELECT);
        let row = sqlx::query(&sql)
            .bind(item_id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_stock_level))
    }

    /// Items whose name contains `text` (case-insensitive).
    pub async fn stock_search(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<StockLevel>> {
        let pattern = format!("%{}%", text.trim().to_lowercase());
        let sql = format!(
            "{} WHERE c.company_id = ? AND (c.branch_id = '' OR ? IS NULL OR c.branch_id = ?) \
             AND lower(c.name) LIKE ? ORDER BY c.name LIMIT ?",
            STOCK_SELECT
        );
        let branch = branch_id.map(|b| b.as_str());
        let rows = sqlx::query(&sql)
            .bind(company_id.as_str())
            .bind(branch)
            .bind(branch)
            .bind(pattern)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_stock_level).collect())
    }

    /// Items below their par level.
    pub async fn stock_low(
        &self,
        company_id: &CompanyId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<StockLevel>> {
        let sql = format!(
            "{} WHERE c.company_id = ? AND (c.branch_id = '' OR ? IS NULL OR c.branch_id = ?) \
             AND s.par_level IS NOT NULL AND s.quantity_on_hand < s.par_level ORDER BY c.name",
            STOCK_SELECT
        );
        let branch = branch_id.map(|b| b.as_str());
        let rows = sqlx::query(&sql)
            .bind(company_id.as_str())
            .bind(branch)
            .bind(branch)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_stock_level).collect())
    }

    /// Add `delta` to the on-hand quantity. The result may not go negative.
    ///
    /// The check and the write are one statement, so concurrent adjustments
    /// never read a stale quantity or wait on a lock upgrade.
    pub async fn stock_adjust(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        delta: f64,
    ) -> Result<StockLevel> {
        let now = StockDb::now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO stock_levels (item_id, quantity_on_hand, updated_at)
            SELECT c.id, ?, ? FROM catalog_items c
            WHERE c.id = ? AND c.company_id = ?
              AND (? >= 0 OR EXISTS (SELECT 1 FROM stock_levels s WHERE s.item_id = c.id))
            ON CONFLICT(item_id) DO UPDATE SET
                quantity_on_hand = stock_levels.quantity_on_hand + ?,
                updated_at = excluded.updated_at
            WHERE stock_levels.quantity_on_hand + ? >= 0
            "#,
        )
        .bind(delta)
        .bind(now)
        .bind(item_id.as_str())
        .bind(company_id.as_str())
        .bind(delta)
        .bind(delta)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.stock_get(company_id, item_id).await?.ok_or_else(|| {
                DbError::not_found(format!("catalog item {}", item_id))
            })?;
            return Err(DbError::constraint(format!(
                "adjustment of {} would leave {} on hand for item {}",
                delta,
                current.quantity_on_hand + delta,
                item_id
            )));
        }

        let level = self
            .stock_get(company_id, item_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("catalog item {}", item_id)))?;
        info!(item_id = %item_id, delta, on_hand = level.quantity_on_hand, "Stock adjusted");
        Ok(level)
    }

    /// Set (or clear) the par level of an item.
    pub async fn stock_set_par(
        &self,
        company_id: &CompanyId,
        item_id: &CatalogItemId,
        par_level: Option<f64>,
    ) -> Result<StockLevel> {
        if par_level.is_some_and(|par| par < 0.0) {
            return Err(DbError::constraint("par level must not be negative"));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO stock_levels (item_id, quantity_on_hand, par_level, updated_at)
            SELECT id, 0, ?, ? FROM catalog_items WHERE id = ? AND company_id = ?
            ON CONFLICT(item_id) DO UPDATE SET
                par_level = excluded.par_level,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(par_level)
        .bind(StockDb::now_millis())
        .bind(item_id.as_str())
        .bind(company_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("catalog item {}", item_id)));
        }

        info!(item_id = %item_id, ?par_level, "Par level set");
        self.stock_get(company_id, item_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("catalog item {}", item_id)))
    }

    /// Create a purchase order. Every line must reference an item in the
    /// company catalog.
    pub async fn purchase_order_create(
        &self,
        company_id: &CompanyId,
        vendor: Option<&str>,
        created_by: Option<&UserId>,
        source_action_id: Option<&ActionId>,
        lines: &[PurchaseOrderLine],
    ) -> Result<PurchaseOrder> {
        if lines.is_empty() {
            return Err(DbError::constraint("purchase order needs at least one line"));
        }

        let order = PurchaseOrder {
            id: PurchaseOrderId::new(),
            company_id: company_id.clone(),
            vendor: vendor.map(str::to_string),
            created_by: created_by.cloned(),
            source_action_id: source_action_id.cloned(),
            created_at: chrono::Utc::now(),
            lines: lines.to_vec(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, company_id, vendor, created_by, source_action_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.id.as_str())
        .bind(company_id.as_str())
        .bind(order.vendor.as_deref())
        .bind(order.created_by.as_ref().map(|u| u.as_str()))
        .bind(order.source_action_id.as_ref().map(|a| a.as_str()))
        .bind(order.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for (line_no, line) in lines.iter().enumerate() {
            if line.quantity <= 0.0 {
                return Err(DbError::constraint(format!(
                    "line {} quantity must be positive",
                    line_no + 1
                )));
            }
            current_quantity(&mut tx, company_id, &line.item_id).await?;

            sqlx::query(
                "INSERT INTO purchase_order_lines (order_id, line_no, item_id, quantity) VALUES (?, ?, ?, ?)",
            )
            .bind(order.id.as_str())
            .bind(line_no as i64)
            .bind(line.item_id.as_str())
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(order_id = %order.id, lines = lines.len(), "Purchase order created");
        Ok(order)
    }

    /// Load a purchase order with its lines.
    pub async fn purchase_order_get(
        &self,
        company_id: &CompanyId,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>> {
        let row = sqlx::query("SELECT * FROM purchase_orders WHERE id = ? AND company_id = ?")
            .bind(id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query(
            "SELECT item_id, quantity FROM purchase_order_lines WHERE order_id = ? ORDER BY line_no",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|line| PurchaseOrderLine {
            item_id: CatalogItemId::from_string(line.get::<String, _>("item_id")),
            quantity: line.get("quantity"),
        })
        .collect();

        Ok(Some(PurchaseOrder {
            id: id.clone(),
            company_id: company_id.clone(),
            vendor: row.get("vendor"),
            created_by: row.get::<Option<String>, _>("created_by").map(UserId::from_string),
            source_action_id: row
                .get::<Option<String>, _>("source_action_id")
                .map(ActionId::from_string),
            created_at: StockDb::millis_to_datetime(row.get("created_at")),
            lines,
        }))
    }
}

/// On-hand quantity for an item of this company; `NotFound` otherwise.
async fn current_quantity(
    tx: &mut Transaction<'_, Sqlite>,
    company_id: &CompanyId,
    item_id: &CatalogItemId,
) -> Result<f64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(s.quantity_on_hand, 0) AS quantity_on_hand
        FROM catalog_items c LEFT JOIN stock_levels s ON s.item_id = c.id
        WHERE c.id = ? AND c.company_id = ?
        "#,
    )
    .bind(item_id.as_str())
    .bind(company_id.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|row| row.get::<f64, _>("quantity_on_hand"))
        .ok_or_else(|| DbError::not_found(format!("catalog item {}", item_id)))
}

fn row_to_stock_level(row: &sqlx::sqlite::SqliteRow) -> StockLevel {
    StockLevel {
        item_id: CatalogItemId::from_string(row.get::<String, _>("item_id")),
        item_name: row.get("name"),
        category: row.get("category"),
        unit: row.get("unit"),
        quantity_on_hand: row.get("quantity_on_hand"),
        par_level: row.get("par_level"),
        updated_at: StockDb::millis_to_datetime(row.get("updated_at")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (StockDb, CompanyId, CatalogItemId) {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        db.catalog_import(
            &company,
            &[NewCatalogEntry {
                name: "20A Breaker".into(),
                category: "Breakers".into(),
                unit: "ea".into(),
                sku: None,
                branch_id: None,
                quantity_on_hand: 5.0,
                par_level: Some(10.0),
            }],
        )
        .await
        .unwrap();
        let id = db.catalog_snapshot(&company, None).await.unwrap()[0].id.clone();
        (db, company, id)
    }

    #[tokio::test]
    async fn test_adjust_and_floor() {
        let (db, company, item) = seeded().await;

        let level = db.stock_adjust(&company, &item, 3.0).await.unwrap();
        assert_eq!(level.quantity_on_hand, 8.0);

        let result = db.stock_adjust(&company, &item, -20.0).await;
        assert!(matches!(result, Err(DbError::Constraint(_))));
        let level = db.stock_get(&company, &item).await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, 8.0);
    }

    #[tokio::test]
    async fn test_adjust_unknown_item() {
        let (db, company, _) = seeded().await;
        let missing = CatalogItemId::new();
        let result = db.stock_adjust(&company, &missing, 1.0).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_adjust_never_stocked_item() {
        let (db, company, _) = seeded().await;
        db.catalog_import(
            &company,
            &[NewCatalogEntry {
                name: "Wire Nut".into(),
                category: "Connectors".into(),
                unit: "ea".into(),
                sku: None,
                branch_id: None,
                quantity_on_hand: 0.0,
                par_level: None,
            }],
        )
        .await
        .unwrap();
        let nut = db.stock_search(&company, None, "wire nut", 1).await.unwrap()[0]
            .item_id
            .clone();
        sqlx::query("DELETE FROM stock_levels WHERE item_id = ?")
            .bind(nut.as_str())
            .execute(db.pool())
            .await
            .unwrap();

        let result = db.stock_adjust(&company, &nut, -1.0).await;
        assert!(matches!(result, Err(DbError::Constraint(_))));

        let level = db.stock_adjust(&company, &nut, 4.0).await.unwrap();
        assert_eq!(level.quantity_on_hand, 4.0);
    }

    #[tokio::test]
    async fn test_set_par_on_other_company_item() {
        let (db, _, item) = seeded().await;
        let other = CompanyId::from_string("globex");
        let result = db.stock_set_par(&other, &item, Some(1.0)).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_low_stock_and_par() {
        let (db, company, item) = seeded().await;
        assert_eq!(db.stock_low(&company, None).await.unwrap().len(), 1);

        db.stock_set_par(&company, &item, Some(2.0)).await.unwrap();
        assert!(db.stock_low(&company, None).await.unwrap().is_empty());

        let found = db.stock_search(&company, None, "breaker", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].par_level, Some(2.0));
    }

    #[tokio::test]
    async fn test_purchase_order_round_trip() {
        let (db, company, item) = seeded().await;
        let order = db
            .purchase_order_create(
                &company,
                Some("Graybar"),
                None,
                None,
                &[PurchaseOrderLine {
                    item_id: item.clone(),
                    quantity: 12.0,
                }],
            )
            .await
            .unwrap();

        let loaded = db.purchase_order_get(&company, &order.id).await.unwrap().unwrap();
        assert_eq!(loaded.vendor.as_deref(), Some("Graybar"));
        assert_eq!(loaded.lines, order.lines);
    }

    #[tokio::test]
    async fn test_purchase_order_rejects_foreign_item() {
        let (db, _, item) = seeded().await;
        let other = CompanyId::from_string("globex");
        let result = db
            .purchase_order_create(
                &other,
                None,
                None,
                None,
                &[PurchaseOrderLine {
                    item_id: item,
                    quantity: 1.0,
                }],
            )
            .await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
