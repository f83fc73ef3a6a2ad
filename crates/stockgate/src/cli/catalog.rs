//! `stockgate catalog` - load and browse the matching catalog.

use crate::cli::context::App;
use crate::cli::error::HelpfulError;
use crate::cli::output::{format_quantity, format_time, print_json, print_table_colored};
use anyhow::Result;
use clap::Subcommand;
use comfy_table::Color;
use std::path::{Path, PathBuf};
use stockgate_db::{NewCatalogEntry, StockLevel};
use stockgate_mediation::Capability;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum CatalogAction {
    /// Import catalog rows (JSON array) and set their stock levels
    Import {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List stock levels
    List {
        /// Only items whose name contains this text
        #[arg(long, short)]
        search: Option<String>,
        /// Only items below their par level
        #[arg(long, conflicts_with = "search")]
        low: bool,
        #[arg(long, default_value = "100")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: CatalogAction, app: &App) -> Result<()> {
    let ctx = app.request_context()?;
    let db = app.store.db();

    match action {
        CatalogAction::Import { file, json } => {
            // Bulk load bypasses the ledger; keep it to roles that manage inventory.
            if !ctx.role.has(Capability::InventoryManage) {
                return Err(HelpfulError::new(format!(
                    "Role {} cannot import the catalog",
                    ctx.role
                ))
                .with_context("Catalog import needs inventory:manage")
                .into());
            }
            let entries = read_entries(&file)?;
            let written = db.catalog_import(&ctx.company_id, &entries).await?;
            info!(company = %ctx.company_id, rows = written, "Catalog imported");

            if json {
                return print_json(&serde_json::json!({ "imported": written }));
            }
            println!("Imported {} catalog rows", written);
            Ok(())
        }

        CatalogAction::List {
            search,
            low,
            limit,
            json,
        } => {
            let branch = ctx.branch_id.as_ref();
            let levels = if low {
                db.stock_low(&ctx.company_id, branch).await?
            } else {
                let text = search.as_deref().unwrap_or("");
                db.stock_search(&ctx.company_id, branch, text, limit).await?
            };

            if json {
                return print_json(&levels);
            }
            if levels.is_empty() {
                println!("No items.");
                return Ok(());
            }
            print_levels(&levels);
            Ok(())
        }
    }
}

fn read_entries(path: &Path) -> Result<Vec<NewCatalogEntry>> {
    if !path.exists() {
        return Err(HelpfulError::file_not_found(path).into());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| HelpfulError::cannot_read_file(path, &e.to_string()))?;
    let entries: Vec<NewCatalogEntry> = serde_json::from_str(&content)
        .map_err(|e| HelpfulError::json_parse_error(path, &e.to_string()))?;
    Ok(entries)
}

fn print_levels(levels: &[StockLevel]) {
    let rows = levels
        .iter()
        .map(|l| {
            let low = l.is_below_par();
            vec![
                (l.item_id.to_string(), None),
                (l.item_name.clone(), None),
                (l.category.clone(), None),
                (
                    format!("{} {}", format_quantity(l.quantity_on_hand), l.unit),
                    low.then_some(Color::Red),
                ),
                (l.par_level.map(format_quantity).unwrap_or_else(|| "-".into()), None),
                (format_time(l.updated_at), None),
            ]
        })
        .collect();
    print_table_colored(&["ID", "ITEM", "CATEGORY", "ON HAND", "PAR", "UPDATED"], rows);
}
