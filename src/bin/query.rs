use anyhow::Result;
use clap::{Parser, Subcommand};
use nft_balance_sync::config::Config;
use nft_balance_sync::query::commands::{
    EventQuery, cmd_balance, cmd_balances, cmd_events, cmd_reset, cmd_stats,
};
use nft_balance_sync::query::formatters::OutputFormat;
use nft_balance_sync::repository::Database;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query synced NFT balances and transfer events", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Balances {
        #[arg(long, default_value = "false")]
        unsynced: bool,
    },
    Balance {
        contract: String,
        token_id: String,
    },
    Events {
        #[arg(default_value = "eip721")]
        standard: String,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Stats,
    /// Delete every stored balance and event
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let db = Database::new(&Config::database_url_from_env())?;

    match cli.command {
        Commands::Balances { unsynced } => {
            cmd_balances(&db, unsynced, &format)?;
        }
        Commands::Balance { contract, token_id } => {
            cmd_balance(&db, &contract, &token_id, &format)?;
        }
        Commands::Events {
            standard,
            limit,
            offset,
        } => {
            let query = EventQuery {
                standard,
                limit,
                offset,
            };
            cmd_events(&db, query, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&db, &format)?;
        }
        Commands::Reset => {
            cmd_reset(&db)?;
        }
    }

    Ok(())
}
