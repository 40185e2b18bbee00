use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::{
    output::{geo_json::GeoJsonMerger, xml::XmlMerger, Merger, MergerError},
    storage::chunk_meta::{ChunkFormat, ChunkMeta},
};

enum State {
    Unbound,
    Xml(XmlMerger),
    GeoJson(GeoJsonMerger),
    Failed,
    Finished,
}

/// A merger that delegates to the [`XmlMerger`] or the [`GeoJsonMerger`]
/// depending on the format of the first chunk it sees. All following chunks
/// must have the same format.
pub struct MultiMerger {
    optimistic: bool,
    state: State,
}

impl MultiMerger {
    pub fn new(optimistic: bool) -> Self {
        Self {
            optimistic,
            state: State::Unbound,
        }
    }

    /// The format the merger has been bound to by the first chunk, if any
    pub fn bound_format(&self) -> Option<ChunkFormat> {
        match self.state {
            State::Xml(_) => Some(ChunkFormat::Xml),
            State::GeoJson(_) => Some(ChunkFormat::GeoJson),
            State::Unbound | State::Failed | State::Finished => None,
        }
    }

    /// Make sure a merger for the chunk's format exists and that it matches
    /// the format of all previous chunks
    fn ensure_merger(&mut self, meta: &ChunkMeta) -> Result<(), MergerError> {
        if matches!(self.state, State::Failed | State::Finished) {
            return Err(MergerError::SessionClosed);
        }

        let attempted = meta
            .format()
            .ok_or_else(|| MergerError::UnsupportedChunkType(meta.mime_type().to_string()))?;

        match self.bound_format() {
            Some(bound) if bound != attempted => {
                return Err(MergerError::FormatConflict { attempted, bound });
            }
            Some(_) => {}
            None => {
                debug!(id = %meta.id(), format = %attempted, "binding merger");
                self.state = match attempted {
                    ChunkFormat::Xml => State::Xml(XmlMerger::new(self.optimistic)),
                    ChunkFormat::GeoJson => State::GeoJson(GeoJsonMerger::new(self.optimistic)),
                };
            }
        }

        Ok(())
    }

    /// Move to the failed state unless the error leaves the session intact
    fn record<T>(&mut self, r: Result<T, MergerError>) -> Result<T, MergerError> {
        if let Err(e) = &r {
            if !matches!(
                e,
                MergerError::UnsupportedChunkType(_) | MergerError::SessionClosed
            ) {
                warn!(error = %e, "merge session failed");
                self.state = State::Failed;
            }
        }
        r
    }

    async fn merge_bound<R, W>(
        &mut self,
        chunk: R,
        meta: &ChunkMeta,
        out: &mut W,
    ) -> Result<(), MergerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.ensure_merger(meta)?;
        match (&mut self.state, meta) {
            (State::Xml(m), ChunkMeta::Xml(meta)) => m.merge(chunk, meta, out).await,
            (State::GeoJson(m), ChunkMeta::GeoJson(meta)) => m.merge(chunk, meta, out).await,
            _ => Err(MergerError::SessionClosed),
        }
    }
}

impl Merger<ChunkMeta> for MultiMerger {
    fn init(&mut self, meta: &ChunkMeta) -> Result<(), MergerError> {
        let r = self.ensure_merger(meta).and_then(|_| match (&mut self.state, meta) {
            (State::Xml(m), ChunkMeta::Xml(meta)) => m.init(meta),
            (State::GeoJson(m), ChunkMeta::GeoJson(meta)) => m.init(meta),
            _ => Err(MergerError::SessionClosed),
        });
        self.record(r)
    }

    async fn merge<R, W>(&mut self, chunk: R, meta: &ChunkMeta, out: &mut W) -> Result<(), MergerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let r = self.merge_bound(chunk, meta, out).await;
        self.record(r)
    }

    async fn finish<W>(&mut self, out: &mut W) -> Result<(), MergerError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let r = match &mut self.state {
            State::Unbound => Ok(()),
            State::Xml(m) => m.finish(out).await,
            State::GeoJson(m) => m.finish(out).await,
            State::Failed | State::Finished => return Err(MergerError::SessionClosed),
        };
        if r.is_ok() {
            self.state = State::Finished;
        }
        self.record(r)
    }
}
