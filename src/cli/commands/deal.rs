//! Deal command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::api::{DataProvider, Id};
use crate::config::CrmConfig;
use crate::services::PipelineService;

#[derive(Subcommand)]
pub enum DealCommands {
    /// Move a deal to a stage and position on the board
    Move {
        deal_id: Id,
        /// Destination stage value (e.g. "won")
        #[arg(long)]
        stage: String,
        /// Zero-based position in the destination stage; defaults to the end
        #[arg(long)]
        index: Option<i64>,
    },
    /// Archive a deal, removing it from the board
    Archive { deal_id: Id },
    /// Restore an archived deal to the end of its stage
    Unarchive { deal_id: Id },
}

pub async fn handle_deal_command<P: DataProvider>(
    args: DealCommands,
    provider: &P,
    config: &CrmConfig,
) -> Result<()> {
    let service = PipelineService::new(provider, config);
    match args {
        DealCommands::Move {
            deal_id,
            stage,
            index,
        } => {
            let updates = service.move_deal(deal_id, &stage, index).await?;
            println!(
                "{} deal {} to stage {} ({} index writes)",
                "Moved".green().bold(),
                deal_id,
                stage.cyan(),
                updates.len()
            );
        }
        DealCommands::Archive { deal_id } => {
            service.archive_deal(deal_id).await?;
            println!("{} deal {}", "Archived".green().bold(), deal_id);
        }
        DealCommands::Unarchive { deal_id } => {
            service.unarchive_deal(deal_id).await?;
            println!("{} deal {}", "Restored".green().bold(), deal_id);
        }
    }
    Ok(())
}
