//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

use commands::contact::ContactCommands;
use commands::deal::DealCommands;
use commands::export::ExportCommands;
use commands::import::ImportCommands;

#[derive(Parser)]
#[command(name = "atrium-crm", version, about = "CRM operations toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage deals on the pipeline board
    #[command(subcommand)]
    Deal(DealCommands),
    /// Manage contacts
    #[command(subcommand)]
    Contact(ContactCommands),
    /// Bulk import from JSON or CSV files
    #[command(subcommand)]
    Import(ImportCommands),
    /// Export contacts
    #[command(subcommand)]
    Export(ExportCommands),
}
