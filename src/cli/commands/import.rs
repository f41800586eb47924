//! Import command handlers

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use dialoguer::Confirm;

use crate::api::DataProvider;
use crate::config::CrmConfig;
use crate::import::csv::{CsvImporter, CsvTarget, auto_map, parse_csv, target_fields};
use crate::import::json::JsonImporter;

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Import a JSON snapshot (sales, companies, contacts, notes, tasks)
    Json {
        file: PathBuf,
        /// Where to write records that failed (default: import-errors.json)
        #[arg(long)]
        error_report: Option<PathBuf>,
    },
    /// Import contacts or companies from a CSV sheet
    Csv {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = CsvKind::Contacts)]
        kind: CsvKind,
        /// Where to write rows that failed (default: import-errors.csv)
        #[arg(long)]
        error_report: Option<PathBuf>,
        /// Accept the proposed column mapping without asking
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CsvKind {
    Contacts,
    Companies,
}

impl From<CsvKind> for CsvTarget {
    fn from(kind: CsvKind) -> Self {
        match kind {
            CsvKind::Contacts => CsvTarget::Contact,
            CsvKind::Companies => CsvTarget::Company,
        }
    }
}

pub async fn handle_import_command<P: DataProvider>(
    args: ImportCommands,
    provider: &P,
    config: &CrmConfig,
) -> Result<()> {
    match args {
        ImportCommands::Json { file, error_report } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open import file: {}", file.display()))?;
            let report = JsonImporter::new(provider, config).run(reader).await?;

            for (kind, counts) in &report.counts {
                let line = format!(
                    "{:<10} {} imported, {} failed",
                    kind, counts.imported, counts.failed
                );
                if counts.failed > 0 {
                    println!("{}", line.yellow());
                } else {
                    println!("{}", line);
                }
            }
            println!(
                "{} {} records imported, {} failed",
                "Done:".green().bold(),
                report.total_imported(),
                report.total_failed()
            );

            if report.total_failed() > 0 {
                let path = error_report.unwrap_or_else(|| PathBuf::from("import-errors.json"));
                report.write_failed_report(&path)?;
                println!("Failed records written to {}", path.display());
            }
        }
        ImportCommands::Csv {
            file,
            kind,
            error_report,
            yes,
        } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open import file: {}", file.display()))?;
            let sheet = parse_csv(reader)?;
            let target = CsvTarget::from(kind);
            let mapping = auto_map(&sheet.headers, target);

            println!("Proposed column mapping:");
            for &field in target_fields(target) {
                match mapping.column(field) {
                    Some(col) => println!(
                        "  {:<14} <- column {} ({})",
                        field,
                        col + 1,
                        sheet.headers[col].cyan()
                    ),
                    None => println!("  {:<14} <- {}", field, "unmapped".dimmed()),
                }
            }

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Import {} rows with this mapping?", sheet.rows.len()))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Import aborted.");
                    return Ok(());
                }
            }

            let report = CsvImporter::new(provider, config)
                .run(&sheet, &mapping, target)
                .await?;
            println!(
                "{} {} rows imported, {} failed",
                "Done:".green().bold(),
                report.imported,
                report.failed
            );

            if report.failed > 0 {
                let path = error_report.unwrap_or_else(|| PathBuf::from("import-errors.csv"));
                report.write_error_report(&path)?;
                println!("Failed rows written to {}", path.display());
            }
        }
    }
    Ok(())
}
