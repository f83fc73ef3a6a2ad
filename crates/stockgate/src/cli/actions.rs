//! `stockgate actions` - review and decide proposed actions.

use crate::cli::chat::describe;
use crate::cli::context::App;
use crate::cli::error::{mediation, HelpfulError};
use crate::cli::output::{format_time, print_json, print_table, print_table_colored, status_color};
use anyhow::Result;
use clap::Subcommand;
use stockgate_db::{ActionFilter, ActionId, ActionStatus, ConversationId, ProposedAction};

#[derive(Debug, Subcommand)]
pub enum ActionsAction {
    /// List ledger rows, newest first
    List {
        /// Only rows in this status (proposed, confirmed, executed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Only rows proposed in this conversation
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show one action with its arguments, result and audit row
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Confirm and execute a proposed action
    Confirm {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Cancel a proposed action
    Cancel {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the audit log of executed actions
    Audit {
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: ActionsAction, app: &App) -> Result<()> {
    match action {
        ActionsAction::List {
            status,
            conversation,
            limit,
            json,
        } => list(app, status, conversation, limit, json).await,
        ActionsAction::Show { id, json } => show(app, &id, json).await,
        ActionsAction::Confirm { id, json } => decide(app, &id, true, json).await,
        ActionsAction::Cancel { id, json } => decide(app, &id, false, json).await,
        ActionsAction::Audit { limit, json } => audit(app, limit, json).await,
    }
}

fn parse_status(raw: &str) -> Result<ActionStatus> {
    ActionStatus::parse(raw).ok_or_else(|| {
        HelpfulError::new(format!("Unknown status: '{}'", raw))
            .with_suggestion("TRY: proposed, confirmed, executed, failed or cancelled")
            .into()
    })
}

async fn list(
    app: &App,
    status: Option<String>,
    conversation: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let ctx = app.request_context()?;
    let filter = ActionFilter {
        status: status.as_deref().map(parse_status).transpose()?,
        conversation_id: conversation.map(ConversationId::from_string),
        limit: Some(limit),
    };
    let actions = app
        .ledger
        .list(&ctx.company_id, &filter)
        .await
        .map_err(mediation)?;

    if json {
        return print_json(&actions);
    }

    if actions.is_empty() {
        println!("No actions found.");
        return Ok(());
    }

    let rows = actions
        .iter()
        .map(|a| {
            vec![
                (a.id.to_string(), None),
                (a.status.to_string(), Some(status_color(a.status))),
                (describe(&a.action_type, &a.arguments_json), None),
                (
                    a.proposed_by.as_ref().map(|u| u.to_string()).unwrap_or_default(),
                    None,
                ),
                (format_time(a.created_at), None),
            ]
        })
        .collect();
    print_table_colored(&["ID", "STATUS", "ACTION", "BY", "CREATED"], rows);

    let counts = app
        .store
        .db()
        .action_status_counts(&ctx.company_id)
        .await?;
    let summary: Vec<String> = counts
        .iter()
        .map(|(status, n)| format!("{} {}", n, status.as_str().to_lowercase()))
        .collect();
    println!("{}", summary.join(", "));
    Ok(())
}

async fn show(app: &App, id: &str, json: bool) -> Result<()> {
    let ctx = app.request_context()?;
    let id = ActionId::from_string(id);
    let action = app.ledger.get(&ctx.company_id, &id).await.map_err(mediation)?;
    let audit = app.store.db().audit_get(&ctx.company_id, &id).await?;

    if json {
        return print_json(&serde_json::json!({ "action": action, "audit": audit }));
    }

    print_action(&action);
    if let Some(entry) = audit {
        println!(
            "Audited:    {} by {}",
            format_time(entry.recorded_at),
            entry.actor.map(|u| u.to_string()).unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}

fn print_action(action: &ProposedAction) {
    println!("Action:     {}", action.id);
    println!("Type:       {}", action.action_type);
    println!("Status:     {}", action.status);
    println!("Summary:    {}", describe(&action.action_type, &action.arguments_json));
    println!("Arguments:  {}", action.arguments_json);
    if let Some(conversation) = &action.conversation_id {
        println!("Conversation: {}", conversation);
    }
    if let Some(by) = &action.proposed_by {
        println!("Proposed by: {}", by);
    }
    if let Some(by) = &action.decided_by {
        println!("Decided by: {}", by);
    }
    println!("Created:    {}", format_time(action.created_at));
    if let Some(at) = action.confirmed_at {
        println!("Confirmed:  {}", format_time(at));
    }
    if let Some(at) = action.executed_at {
        println!("Executed:   {}", format_time(at));
    }
    if let Some(at) = action.cancelled_at {
        println!("Cancelled:  {}", format_time(at));
    }
    if let Some(result) = &action.result_json {
        println!("Result:     {}", result);
    }
    if let Some(error) = &action.error_message {
        println!("Error:      {}", error);
    }
}

async fn decide(app: &App, id: &str, confirmed: bool, json: bool) -> Result<()> {
    let ctx = app.request_context()?;
    let result = app
        .confirmations()
        .confirm_action(&ctx, &ActionId::from_string(id), confirmed)
        .await
        .map_err(mediation)?;

    if json {
        return print_json(&result);
    }

    match (confirmed, result.success) {
        (false, _) => println!("Cancelled {}", result.action.id),
        (true, true) => println!(
            "Executed {}: {}",
            result.action.id,
            describe(&result.action.action_type, &result.action.arguments_json)
        ),
        (true, false) => println!(
            "Execution failed for {}: {}",
            result.action.id,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
    Ok(())
}

async fn audit(app: &App, limit: usize, json: bool) -> Result<()> {
    let ctx = app.request_context()?;
    let entries = app
        .ledger
        .list_audit(&ctx.company_id, Some(limit))
        .await
        .map_err(mediation)?;

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No executed actions yet.");
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.action_id.to_string(),
                describe(&e.action_type, &e.proposed_args),
                e.actor.as_ref().map(|u| u.to_string()).unwrap_or_default(),
                format_time(e.recorded_at),
            ]
        })
        .collect();
    print_table(&["ACTION", "WHAT", "BY", "RECORDED"], rows);
    Ok(())
}
