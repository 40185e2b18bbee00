use tokio::io::{AsyncRead, AsyncWrite};

pub mod error;
pub mod geo_json;
pub mod multi;
pub mod xml;

pub use self::error::MergerError;
pub use self::multi::MultiMerger;

/// Merges chunks into one document. A merger is driven through zero or more
/// calls to [`init`](Merger::init), zero or more calls to
/// [`merge`](Merger::merge), and exactly one call to
/// [`finish`](Merger::finish).
pub trait Merger<M> {
    /// Announce a chunk that will be merged later so the merger can compute
    /// a document structure that fits all chunks. Must be called for every
    /// chunk before the first call to [`merge`](Merger::merge) unless the
    /// merger is optimistic.
    fn init(&mut self, meta: &M) -> Result<(), MergerError>;

    /// Read the given chunk to its end and write it into `out`
    async fn merge<R, W>(&mut self, chunk: R, meta: &M, out: &mut W) -> Result<(), MergerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized;

    /// Write everything that is necessary to complete the document. Flushes
    /// `out` but never shuts it down.
    async fn finish<W>(&mut self, out: &mut W) -> Result<(), MergerError>
    where
        W: AsyncWrite + Unpin + ?Sized;
}
