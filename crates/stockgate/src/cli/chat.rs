//! `stockgate chat` - talk to the assistant.
//!
//! With a message argument, runs one turn and exits. Without one, reads
//! messages from stdin until EOF or `/quit`, keeping the conversation.

use crate::cli::context::App;
use crate::cli::error::mediation;
use crate::cli::output::{format_quantity, print_json};
use anyhow::Result;
use std::io::{BufRead, Write};
use stockgate_db::ConversationId;
use stockgate_mediation::{ActionPayload, ChatRequest, ChatResponse, Orchestrator, RequestContext};

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Message to send (omit for an interactive session)
    pub message: Option<String>,

    /// Continue an existing conversation
    #[arg(long, short = 'c')]
    pub conversation: Option<String>,

    /// Topic for a new conversation
    #[arg(long)]
    pub topic: Option<String>,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ChatArgs, app: &App) -> Result<()> {
    let ctx = app.request_context()?;
    let orchestrator = app.orchestrator()?;
    let mut conversation = args.conversation.map(ConversationId::from_string);

    if let Some(message) = args.message {
        let response = turn(&orchestrator, &ctx, &mut conversation, &args.topic, message).await?;
        return render(&response, args.json);
    }

    if !args.json {
        println!("Stockgate assistant. Type /quit to leave.");
    }
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        if !args.json {
            print!("> ");
            std::io::stdout().flush()?;
        }
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }

        match turn(&orchestrator, &ctx, &mut conversation, &args.topic, message.to_string()).await
        {
            Ok(response) => render(&response, args.json)?,
            // Keep the session alive on per-turn errors.
            Err(e) => eprintln!("{}", e),
        }
    }
    Ok(())
}

async fn turn(
    orchestrator: &Orchestrator,
    ctx: &RequestContext,
    conversation: &mut Option<ConversationId>,
    topic: &Option<String>,
    message: String,
) -> Result<ChatResponse> {
    let response = orchestrator
        .chat(
            ctx,
            ChatRequest {
                conversation_id: conversation.clone(),
                message,
                topic: topic.clone(),
            },
        )
        .await
        .map_err(mediation)?;
    *conversation = Some(response.conversation_id.clone());
    Ok(response)
}

fn render(response: &ChatResponse, json: bool) -> Result<()> {
    if json {
        return print_json(response);
    }

    println!();
    println!("{}", response.reply);
    if response.degraded {
        println!("(assistant unavailable; reply generated locally)");
    }

    if !response.executed_actions.is_empty() {
        println!();
        for read in &response.executed_actions {
            println!("  looked up: {}", read.tool);
        }
    }

    if response.requires_confirmation {
        println!();
        println!("PENDING CONFIRMATION");
        for action in &response.proposed_actions {
            println!("  {}  {}", action.id, describe(&action.action_type, &action.arguments_json));
        }
        println!();
        println!("Run `stockgate actions confirm <id>` to apply, or `stockgate actions cancel <id>`.");
    }
    println!();
    println!("conversation: {}", response.conversation_id);
    Ok(())
}

/// One-line description of a proposal's arguments.
pub fn describe(action_type: &str, arguments_json: &str) -> String {
    let payload = match ActionPayload::from_json_str(action_type, arguments_json) {
        Ok(payload) => payload,
        Err(_) => return action_type.to_string(),
    };
    match payload {
        ActionPayload::AdjustStock(args) => {
            format!("adjust {} by {}", args.item.name, signed(args.delta))
        }
        ActionPayload::SetParLevel(args) => match args.par_level {
            Some(par) => format!("set par for {} to {}", args.item.name, format_quantity(par)),
            None => format!("clear par for {}", args.item.name),
        },
        ActionPayload::CreatePurchaseOrder(args) => {
            let vendor = args
                .vendor
                .map(|v| format!(" from {}", v))
                .unwrap_or_default();
            format!("purchase order{} ({} lines)", vendor, args.lines.len())
        }
        _ => action_type.to_string(),
    }
}

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_quantity(value))
    } else {
        format_quantity(value)
    }
}
