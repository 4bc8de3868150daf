//! Command dispatch against the registry service

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};
use crate::cli::{output, ColourManager, Command};
use crate::plugin::{OperationResult, PackageUpload, RegistryService};

/// Run one command and return the text to print
pub async fn execute_command(service: &RegistryService, command: &Command, colours: &ColourManager) -> Result<String> {
    debug!("Executing command: {:?}", command);

    match command {
        Command::List { table } => {
            if *table {
                Ok(output::listing_table(&service.get_all().await?))
            } else {
                Ok(service.get_all_text().await?)
            }
        }
        Command::Get { id } => {
            let entry = service.get_by_id(id).await?;
            Ok(output::entry_details(&entry, colours))
        }
        Command::Add { file, private } => {
            let text = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read specifications from {}", file.display()))?;
            let outcome = service.add(&text, *private).await?;
            Ok(output::mutation_summary("Added", &outcome, colours))
        }
        Command::Delete { id } => {
            let outcome = service.delete(id).await?;
            Ok(output::mutation_summary("Deleted", &outcome, colours))
        }
        Command::DeleteAll => {
            let outcome = service.delete_all().await?;
            Ok(output::mutation_summary("Deleted", &outcome, colours))
        }
        Command::Submit { id, archive } => {
            let bytes = tokio::fs::read(archive)
                .await
                .with_context(|| format!("Failed to read package archive {}", archive.display()))?;
            let upload = PackageUpload {
                id: id.clone(),
                file_data: STANDARD.encode(bytes),
            };
            operation_output(service.submit(upload).await, colours)
        }
        Command::Sync => operation_output(service.sync().await, colours),
        Command::Export { output: path } => {
            let archive = service.export().await?;
            tokio::fs::write(path, &archive)
                .await
                .with_context(|| format!("Failed to write export archive {}", path.display()))?;
            info!("Exported {} bytes to {}", archive.len(), path.display());
            Ok(format!("{} {}", colours.success("Exported plugins to"), path.display()))
        }
        Command::Status => {
            let status = service.status().await?;
            Ok(output::status_report(&status, colours))
        }
    }
}

/// JSON body of an operation result; unsuccessful results become errors
/// carrying the same JSON.
fn operation_output(result: OperationResult, colours: &ColourManager) -> Result<String> {
    let json = result.to_json()?;
    if result.is_success() {
        Ok(output::operation_line(&result, &json, colours))
    } else {
        Err(anyhow::anyhow!(output::operation_line(&result, &json, colours)))
    }
}
