use std::{io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::trace;
use ulid::Ulid;

use super::Store;

/// An implementation of the [`Store`] trait that keeps every chunk in its own
/// file inside a root directory
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a new file store at the given location. The directory will be
    /// created if it does not exist yet.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Unable to create store directory {:?}", root))?;
        Ok(Self { root })
    }

    fn chunk_path(&self, id: Ulid) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl Store for FileStore {
    type ChunkReadStream = File;

    async fn add(&mut self, id: Ulid, chunk: Vec<u8>) -> Result<()> {
        let path = self.chunk_path(id);
        trace!(%id, len = chunk.len(), "writing chunk");
        let mut file = File::create(&path)
            .await
            .with_context(|| format!("Unable to create chunk file {:?}", path))?;
        file.write_all(&chunk).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_one(&self, id: Ulid) -> Result<Self::ChunkReadStream> {
        match File::open(self.chunk_path(id)).await {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                anyhow::bail!("Unable to find chunk with ID `{}'", id)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Unable to open chunk with ID `{}'", id))
            }
        }
    }

    async fn delete(&mut self, id: Ulid) -> Result<()> {
        match fs::remove_file(self.chunk_path(id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Unable to delete chunk with ID `{}'", id))
            }
            _ => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        // every chunk is flushed in `add` already
        Ok(())
    }
}
