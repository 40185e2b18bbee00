use thiserror::Error;

use crate::storage::chunk_meta::ChunkFormat;

/// Errors that can occur while merging chunks
#[derive(Error, Debug)]
pub enum MergerError {
    #[error("cannot merge {attempted} chunk into {bound} document")]
    FormatConflict {
        attempted: ChunkFormat,
        bound: ChunkFormat,
    },

    #[error("cannot merge chunk of type `{0}'")]
    UnsupportedChunkType(String),

    #[error("chunk cannot be merged into the document (found `{found}', expected `{expected}')")]
    StructuralConflict { found: String, expected: String },

    #[error("merger must be initialized with the chunks' metadata before merging")]
    NotInitialized,

    #[error("merge session has already failed or finished")]
    SessionClosed,

    #[error("unable to read chunk or write output")]
    StreamFailure(#[from] std::io::Error),
}
