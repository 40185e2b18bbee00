pub mod chunk_meta;
pub mod file_store;

use anyhow::Result;
use tokio::io::AsyncRead;
use ulid::Ulid;

/// A store for chunks
pub trait Store {
    /// The byte stream a stored chunk is read from
    type ChunkReadStream: AsyncRead + Unpin;

    /// Add a chunk with given ID to the store. Depending on the actual
    /// implementation, this operation might be asynchronous. Call [`commit`]
    /// to wait for all operations to finish.
    ///
    /// [`commit`]: Store::commit
    async fn add(&mut self, id: Ulid, chunk: Vec<u8>) -> Result<()>;

    /// Open the chunk with the given ID for reading
    async fn get_one(&self, id: Ulid) -> Result<Self::ChunkReadStream>;

    /// Delete the chunk with the given ID. Deleting a chunk that does not
    /// exist is not an error.
    async fn delete(&mut self, id: Ulid) -> Result<()>;

    /// Call this method after adding or deleting one or more chunks
    async fn commit(&mut self) -> Result<()>;
}
