use anyhow::{Context, Result};
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::{
    output::{Merger, MultiMerger},
    storage::{chunk_meta::ChunkMeta, Store},
};

/// Fetch the chunks with the given metadata from the store, merge them, and
/// write the resulting document to `out`. Returns the number of merged
/// chunks.
pub async fn export<S, W>(
    store: &S,
    metas: &[ChunkMeta],
    optimistic: bool,
    out: &mut W,
) -> Result<usize>
where
    S: Store,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut merger = MultiMerger::new(optimistic);

    if !optimistic {
        for meta in metas {
            merger
                .init(meta)
                .with_context(|| format!("Unable to prepare chunk with ID `{}'", meta.id()))?;
        }
    }

    let mut merged = 0;
    for meta in metas {
        let chunk = store.get_one(meta.id()).await?;
        merger
            .merge(chunk, meta, &mut *out)
            .await
            .with_context(|| format!("Unable to merge chunk with ID `{}'", meta.id()))?;
        merged += 1;
    }

    merger.finish(out).await.context("Unable to finish document")?;
    debug!(merged, "export finished");

    Ok(merged)
}
