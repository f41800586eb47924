use anyhow::Result;
use clap::Parser;

use atrium_crm::api::PostgrestProvider;
use atrium_crm::cli::commands::{contact, deal, export, import};
use atrium_crm::cli::{Cli, Commands};
use atrium_crm::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let mut provider = PostgrestProvider::new(config.base_url.clone());
    if let Some(api_key) = &config.api_key {
        provider = provider.with_api_key(api_key.clone());
    }

    match cli.command {
        Commands::Deal(args) => deal::handle_deal_command(args, &provider, &config.crm).await,
        Commands::Contact(args) => contact::handle_contact_command(args, &provider).await,
        Commands::Import(args) => import::handle_import_command(args, &provider, &config.crm).await,
        Commands::Export(args) => export::handle_export_command(args, &provider).await,
    }
}
