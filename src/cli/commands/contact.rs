//! Contact command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use dialoguer::Confirm;

use crate::api::{DataProvider, Id};
use crate::services::MergeService;

#[derive(Subcommand)]
pub enum ContactCommands {
    /// Merge one contact into another, reassigning its related records
    Merge {
        /// Contact that will be merged away and deleted
        loser_id: Id,
        /// Contact that survives the merge
        winner_id: Id,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_contact_command<P: DataProvider>(
    args: ContactCommands,
    provider: &P,
) -> Result<()> {
    match args {
        ContactCommands::Merge {
            loser_id,
            winner_id,
            yes,
        } => {
            let service = MergeService::new(provider);
            let impact = service.preview(loser_id).await?;
            println!(
                "Merging contact {} into {} will reassign {} tasks, {} notes and {} deals.",
                loser_id,
                winner_id,
                impact.tasks.to_string().cyan(),
                impact.notes.to_string().cyan(),
                impact.deals.to_string().cyan()
            );
            println!(
                "Contact {} will be {} afterwards.",
                loser_id,
                "deleted".red().bold()
            );

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Proceed with the merge?")
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Merge aborted.");
                    return Ok(());
                }
            }

            let outcome = service.merge(loser_id, winner_id).await?;
            println!(
                "{} contact {} into {} ({} records reassigned)",
                "Merged".green().bold(),
                outcome.loser_id,
                outcome.winner_id,
                outcome.reassigned.total()
            );
        }
    }
    Ok(())
}
