//! Database schema creation for all Stockgate tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are epoch milliseconds; JSON payloads are stored as text.

use crate::error::Result;
use crate::StockDb;
use sqlx::Row;
use tracing::info;

const STATEMENTS: &[&str] = &[
    // Action ledger. Rows are never deleted.
    r#"CREATE TABLE IF NOT EXISTS actions (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        conversation_id TEXT,
        action_type TEXT NOT NULL,
        arguments_json TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PROPOSED',
        proposed_by TEXT,
        decided_by TEXT,
        created_at INTEGER NOT NULL,
        confirmed_at INTEGER,
        executed_at INTEGER,
        cancelled_at INTEGER,
        result_json TEXT,
        error_message TEXT,
        CHECK ((status = 'EXECUTED') = (result_json IS NOT NULL)),
        CHECK ((status = 'FAILED') = (error_message IS NOT NULL))
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_actions_company_status ON actions(company_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_actions_conversation ON actions(conversation_id)",
    // One audit row per executed action.
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        action_id TEXT PRIMARY KEY REFERENCES actions(id),
        company_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        actor TEXT,
        proposed_args TEXT NOT NULL,
        result TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_audit_company ON audit_log(company_id, recorded_at)",
    // Catalog. Empty branch_id means company-wide (keeps UNIQUE effective).
    r#"CREATE TABLE IF NOT EXISTS catalog_items (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        branch_id TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT '',
        unit TEXT NOT NULL DEFAULT '',
        sku TEXT,
        created_at INTEGER NOT NULL,
        UNIQUE(company_id, branch_id, name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS stock_levels (
        item_id TEXT PRIMARY KEY REFERENCES catalog_items(id) ON DELETE CASCADE,
        quantity_on_hand REAL NOT NULL DEFAULT 0,
        par_level REAL,
        updated_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS purchase_orders (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        vendor TEXT,
        created_by TEXT,
        source_action_id TEXT,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS purchase_order_lines (
        order_id TEXT NOT NULL REFERENCES purchase_orders(id) ON DELETE CASCADE,
        line_no INTEGER NOT NULL,
        item_id TEXT NOT NULL,
        quantity REAL NOT NULL,
        PRIMARY KEY (order_id, line_no)
    )"#,
    // BOM drafts and their resolved lines.
    r#"CREATE TABLE IF NOT EXISTS bom_drafts (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'EXTRACTED',
        extracted_lines_json TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        submitted_action_id TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS bom_line_items (
        id TEXT PRIMARY KEY,
        draft_id TEXT NOT NULL REFERENCES bom_drafts(id) ON DELETE CASCADE,
        line_index INTEGER NOT NULL,
        extracted_name TEXT NOT NULL,
        extracted_qty REAL NOT NULL,
        extracted_unit TEXT,
        extracted_category TEXT,
        matched_item_id TEXT,
        suggested_item_id TEXT,
        confidence_tier TEXT NOT NULL,
        match_reason TEXT NOT NULL,
        manually_overridden INTEGER NOT NULL DEFAULT 0,
        UNIQUE(draft_id, line_index)
    )"#,
    // Conversations
    r#"CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        company_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        topic TEXT,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id)",
];

impl StockDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        for statement in STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        self.add_missing_column("bom_line_items", "suggested_item_id", "TEXT")
            .await?;

        info!(tables = STATEMENTS.len(), "Database schema verified");
        Ok(())
    }

    /// Databases created before `column` existed get it added in place.
    async fn add_missing_column(&self, table: &str, column: &str, decl: &str) -> Result<()> {
        let columns = sqlx::query(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(&self.pool)
            .await?;
        if columns.iter().any(|row| row.get::<String, _>("name") == column) {
            return Ok(());
        }

        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))
            .execute(&self.pool)
            .await?;
        info!(table, column, "Column added");
        Ok(())
    }
}
