//! Stockgate - conversational inventory assistant
//!
//! Every change the assistant suggests lands in the action ledger as a
//! proposal. Nothing touches stock until someone runs
//! `stockgate actions confirm`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use stockgate_logging::{init_logging, LogConfig};
use tracing::debug;

mod cli;

use cli::actions::ActionsAction;
use cli::bom::BomAction;
use cli::catalog::CatalogAction;
use cli::chat::ChatArgs;
use cli::config::{ConfigArgs, StockgateConfig};
use cli::context::{App, GlobalOpts};

#[derive(Parser, Debug)]
#[command(name = "stockgate", version, about = "Conversational inventory with human confirmation")]
struct Cli {
    /// Show info-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the assistant about stock or describe what you used
    Chat(ChatArgs),

    /// Review, confirm and cancel proposed actions
    Actions {
        #[command(subcommand)]
        action: ActionsAction,
    },

    /// Bill-of-materials drafts
    Bom {
        #[command(subcommand)]
        action: BomAction,
    },

    /// Catalog and stock levels
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Show resolved configuration
    Config(ConfigArgs),
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Chat(args) => args.json,
        Commands::Config(args) => args.json,
        Commands::Actions { action } => match action {
            ActionsAction::List { json, .. }
            | ActionsAction::Show { json, .. }
            | ActionsAction::Confirm { json, .. }
            | ActionsAction::Cancel { json, .. }
            | ActionsAction::Audit { json, .. } => *json,
        },
        Commands::Bom { action } => match action {
            BomAction::Import { json, .. }
            | BomAction::Process { json, .. }
            | BomAction::Patch { json, .. }
            | BomAction::Submit { json, .. }
            | BomAction::Show { json, .. }
            | BomAction::List { json } => *json,
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Import { json, .. } | CatalogAction::List { json, .. } => *json,
        },
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(e) = init_logging(LogConfig {
        app_name: "stockgate",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: file logging disabled: {:#}", e);
    }

    let result = run_command(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let mut config = StockgateConfig::load()?;
    cli.global.apply(&mut config);

    if let Commands::Config(args) = cli.command {
        return cli::config::run(args, &config);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let app = App::open(config).await?;
        debug!(database = %app.config.database.display(), "Session ready");

        match cli.command {
            Commands::Chat(args) => cli::chat::run(args, &app).await,
            Commands::Actions { action } => cli::actions::run(action, &app).await,
            Commands::Bom { action } => cli::bom::run(action, &app).await,
            Commands::Catalog { action } => cli::catalog::run(action, &app).await,
            Commands::Config(_) => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_json_flag_detected() {
        let cli = Cli::parse_from(["stockgate", "actions", "list", "--json", "--status", "proposed"]);
        assert!(command_wants_json(&cli.command));

        let cli = Cli::parse_from(["stockgate", "--role", "viewer", "bom", "list"]);
        assert!(!command_wants_json(&cli.command));
        assert_eq!(cli.global.role.as_deref(), Some("viewer"));
    }
}
