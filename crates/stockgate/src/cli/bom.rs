//! `stockgate bom` - turn a bill of materials into a purchase order proposal.

use crate::cli::context::App;
use crate::cli::error::{mediation, HelpfulError};
use crate::cli::output::{
    format_quantity, format_time, print_json, print_table, print_table_colored, tier_color,
};
use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use stockgate_db::{BomLineItem, BomLinePatch, CatalogItemId, DraftId};
use stockgate_mediation::{
    DocumentExtractor, JsonDocumentExtractor, ModelDocumentExtractor, ProcessedDraft,
};

#[derive(Debug, Subcommand)]
pub enum BomAction {
    /// Import a document as a new draft
    Import {
        /// JSON lines file, or any text document with --with-model
        file: PathBuf,
        /// Draft name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Ask the model to extract lines from free text
        #[arg(long)]
        with_model: bool,
        #[arg(long)]
        json: bool,
    },
    /// Match draft lines against the catalog
    Process {
        draft: String,
        #[arg(long)]
        json: bool,
    },
    /// Pick the catalog item or fix the quantity of one line
    Patch {
        draft: String,
        /// Line number as shown by `bom show`
        line: i64,
        /// Catalog item id to use for this line
        #[arg(long)]
        item: Option<String>,
        #[arg(long)]
        quantity: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Propose a purchase order for the draft
    Submit {
        draft: String,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a draft and its lines
    Show {
        draft: String,
        #[arg(long)]
        json: bool,
    },
    /// List drafts
    List {
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: BomAction, app: &App) -> Result<()> {
    let ctx = app.request_context()?;
    let bom = app.bom();

    match action {
        BomAction::Import {
            file,
            name,
            with_model,
            json,
        } => {
            if !file.exists() {
                return Err(HelpfulError::file_not_found(&file).into());
            }
            let document = std::fs::read_to_string(&file)
                .map_err(|e| HelpfulError::cannot_read_file(&file, &e.to_string()))?;
            let name = name.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "bom".to_string())
            });

            let extractor: Box<dyn DocumentExtractor> = if with_model {
                Box::new(ModelDocumentExtractor::new(app.model()?))
            } else {
                Box::new(JsonDocumentExtractor)
            };
            let draft = bom
                .import_extraction(&ctx, &name, &document, extractor.as_ref())
                .await
                .map_err(mediation)?;

            if json {
                return print_json(&draft);
            }
            println!(
                "Imported draft {} '{}' with {} lines",
                draft.id,
                draft.name,
                draft.extracted_lines.len()
            );
            println!("Next: stockgate bom process {}", draft.id);
            Ok(())
        }

        BomAction::Process { draft, json } => {
            let processed = bom
                .process_draft(&ctx, &DraftId::from_string(draft.clone()))
                .await
                .map_err(mediation)?;
            if json {
                return print_json(&processed);
            }
            print_lines(&processed.items);
            print_match_summary(&processed, &draft);
            Ok(())
        }

        BomAction::Patch {
            draft,
            line,
            item,
            quantity,
            json,
        } => {
            let draft_id = DraftId::from_string(draft);
            let view = bom.get_draft(&ctx, &draft_id).await.map_err(mediation)?;
            let target = view
                .items
                .iter()
                .find(|l| l.line_index == line)
                .ok_or_else(|| {
                    HelpfulError::new(format!("Draft has no line {}", line))
                        .with_suggestion(format!("TRY: stockgate bom show {}", draft_id))
                })?;

            let patch = BomLinePatch {
                id: target.id.clone(),
                matched_item_id: item.map(CatalogItemId::from_string),
                quantity,
            };
            let view = bom
                .patch_items(&ctx, &draft_id, &[patch])
                .await
                .map_err(mediation)?;
            if json {
                return print_json(&view);
            }
            print_lines(&view.items);
            Ok(())
        }

        BomAction::Submit {
            draft,
            vendor,
            json,
        } => {
            let action = bom
                .submit_draft(&ctx, &DraftId::from_string(draft), vendor.as_deref())
                .await
                .map_err(mediation)?;
            if json {
                return print_json(&action);
            }
            println!("Proposed purchase order {}", action.id);
            println!("Run `stockgate actions confirm {}` to place it.", action.id);
            Ok(())
        }

        BomAction::Show { draft, json } => {
            let view = bom
                .get_draft(&ctx, &DraftId::from_string(draft))
                .await
                .map_err(mediation)?;
            if json {
                return print_json(&view);
            }
            println!("Draft:   {} '{}'", view.draft.id, view.draft.name);
            println!("Status:  {}", view.draft.status.as_str());
            println!("Created: {}", format_time(view.draft.created_at));
            if let Some(action) = &view.draft.submitted_action_id {
                println!("Order:   {}", action);
            }
            println!();
            if view.items.is_empty() {
                for (index, line) in view.draft.extracted_lines.iter().enumerate() {
                    println!("  {:>3}  {}  x{}", index, line.name, format_quantity(line.quantity));
                }
            } else {
                print_lines(&view.items);
            }
            Ok(())
        }

        BomAction::List { json } => {
            let drafts = bom.list_drafts(&ctx).await.map_err(mediation)?;
            if json {
                return print_json(&drafts);
            }
            if drafts.is_empty() {
                println!("No drafts.");
                return Ok(());
            }
            let rows = drafts
                .iter()
                .map(|d| {
                    vec![
                        d.id.to_string(),
                        d.name.clone(),
                        d.status.as_str().to_string(),
                        d.extracted_lines.len().to_string(),
                        format_time(d.created_at),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "STATUS", "LINES", "CREATED"], rows);
            Ok(())
        }
    }
}

fn print_lines(items: &[BomLineItem]) {
    let rows = items
        .iter()
        .map(|l| {
            let marker = if l.manually_overridden { " *" } else { "" };
            vec![
                (l.line_index.to_string(), None),
                (l.extracted_name.clone(), None),
                (format_quantity(l.extracted_qty), None),
                (
                    format!("{}{}", l.confidence_tier.as_str(), marker),
                    Some(tier_color(l.confidence_tier)),
                ),
                (item_cell(l), None),
                (l.match_reason.clone(), None),
            ]
        })
        .collect();
    print_table_colored(&["#", "LINE", "QTY", "TIER", "ITEM", "REASON"], rows);
}

/// Matched item, or the unconfirmed suggestion marked with `?`.
fn item_cell(line: &BomLineItem) -> String {
    match (&line.matched_item_id, &line.suggested_item_id) {
        (Some(item), _) => item.to_string(),
        (None, Some(suggested)) => format!("? {}", suggested),
        (None, None) => "-".to_string(),
    }
}

fn print_match_summary(processed: &ProcessedDraft, draft: &str) {
    println!(
        "{} of {} lines matched",
        processed.matched_count, processed.total_count
    );
    if processed.matched_count < processed.total_count {
        println!("Pick items for the rest: stockgate bom patch {} <line> --item <id>", draft);
    } else {
        println!("Next: stockgate bom submit {}", draft);
    }
}
