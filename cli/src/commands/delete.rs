use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use humantime::format_duration;
use reqwest::Client;
use tracing::debug;

use crate::{commands::StoreSelection, config::ServerConfig};

/// Delete chunks or layers from the GeoRocket data store
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub selection: StoreSelection,
}

/// Send the delete request for the selected chunks to the server
pub async fn delete(client: &Client, base_url: &str, selection: &StoreSelection) -> Result<()> {
    selection.ensure_not_empty()?;
    let url = format!("{}{}", base_url, selection.store_path(&[])?);

    debug!(%url, "deleting chunks");
    let response = client
        .delete(&url)
        .send()
        .await
        .with_context(|| format!("Unable to send request to {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Unable to delete chunks: {status} {}", body.trim());
    }

    Ok(())
}

/// Run the `delete` command
pub async fn run_delete(args: DeleteArgs, server: &ServerConfig) -> Result<()> {
    let start = Instant::now();
    delete(&Client::new(), &server.base_url(), &args.selection).await?;

    eprintln!(
        "Deleted chunks in {}",
        format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
    );

    Ok(())
}
