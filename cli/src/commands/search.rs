use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use humantime::format_duration;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{commands::StoreSelection, config::ServerConfig};

/// Search the GeoRocket data store
#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub selection: StoreSelection,

    /// Let the server merge chunks without inspecting them first. Faster,
    /// but the result may be invalid if the chunks are not compatible.
    #[arg(long)]
    pub optimistic_merging: bool,
}

/// Send the search request to the server and copy the merged document into
/// `out`. Returns the number of bytes written. Zero means no chunk matched.
pub async fn search<W>(
    client: &Client,
    base_url: &str,
    args: &SearchArgs,
    out: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    args.selection.ensure_not_empty()?;
    let extra: &[(&str, &str)] = if args.optimistic_merging {
        &[("optimisticMerging", "true")]
    } else {
        &[]
    };
    let url = format!("{}{}", base_url, args.selection.store_path(extra)?);

    debug!(%url, "searching chunks");
    let mut response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Unable to send request to {url}"))?;

    match response.status() {
        StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(0),
        status if !status.is_success() => {
            let body = response.text().await.unwrap_or_default();
            bail!("Unable to search chunks: {status} {}", body.trim());
        }
        _ => {}
    }

    let mut written = 0;
    while let Some(bytes) = response
        .chunk()
        .await
        .context("Unable to read response")?
    {
        out.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    out.flush().await?;

    Ok(written)
}

/// Run the `search` command
pub async fn run_search(args: SearchArgs, server: &ServerConfig) -> Result<()> {
    let start = Instant::now();

    let mut stdout = tokio::io::stdout();
    let written = search(&Client::new(), &server.base_url(), &args, &mut stdout).await?;

    let elapsed = format_duration(Duration::from_millis(start.elapsed().as_millis() as u64));
    if written == 0 {
        eprintln!("No chunks matched in {elapsed}");
    } else {
        eprintln!("Received {written} bytes in {elapsed}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assertor::{assert_that, ResultAssertion};
    use pretty_assertions::assert_eq;
    use reqwest::Client;

    use crate::commands::{test_server::serve_once, StoreSelection};

    use super::{search, SearchArgs};

    fn args(query: &[&str], optimistic_merging: bool) -> SearchArgs {
        SearchArgs {
            selection: StoreSelection {
                layer: None,
                query: query.iter().map(|q| q.to_string()).collect(),
            },
            optimistic_merging,
        }
    }

    #[tokio::test]
    async fn document() {
        let doc = r#"<root><a/></root>"#;
        let (base_url, request) = serve_once("200 OK", doc).await;

        let mut out = Vec::new();
        let n = search(&Client::new(), &base_url, &args(&["test"], false), &mut out)
            .await
            .unwrap();
        assert_eq!(n, doc.len() as u64);
        assert_eq!(String::from_utf8(out).unwrap(), doc);
        assert_eq!(
            request.await.unwrap(),
            "GET /store/?search=test HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn optimistic_merging() {
        let (base_url, request) = serve_once("204 No Content", "").await;

        let mut out = Vec::new();
        search(&Client::new(), &base_url, &args(&["test"], true), &mut out)
            .await
            .unwrap();
        assert_eq!(
            request.await.unwrap(),
            "GET /store/?search=test&optimisticMerging=true HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn not_found() {
        let (base_url, _request) = serve_once("404 Not Found", "Not Found").await;

        let mut out = Vec::new();
        let n = search(&Client::new(), &base_url, &args(&["test"], false), &mut out)
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn server_error() {
        let (base_url, _request) = serve_once("400 Bad Request", "invalid query").await;

        let mut out = Vec::new();
        let r = search(&Client::new(), &base_url, &args(&["EQ("], false), &mut out).await;
        assert_that!(r).is_err();
    }
}
