use std::fmt::{Display, Formatter};

use ulid::Ulid;

pub mod geo_json;
pub mod xml;

pub use self::geo_json::{GeoJsonChunkMeta, GeoJsonType};
pub use self::xml::{Prefix, XmlChunkMeta, XmlStartElement};

/// The document formats chunks can be merged into
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ChunkFormat {
    Xml,
    GeoJson,
}

impl Display for ChunkFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkFormat::Xml => write!(f, "XML"),
            ChunkFormat::GeoJson => write!(f, "GeoJSON"),
        }
    }
}

/// Metadata about a chunk of an arbitrary type that no merger understands
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct GenericChunkMeta {
    /// The chunk's ID
    pub id: Ulid,

    /// The chunk's MIME type
    pub mime_type: String,
}

impl GenericChunkMeta {
    pub fn new(id: Ulid, mime_type: impl Into<String>) -> Self {
        Self {
            id,
            mime_type: mime_type.into(),
        }
    }
}

/// Information about a chunk
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum ChunkMeta {
    Xml(XmlChunkMeta),
    GeoJson(GeoJsonChunkMeta),
    Generic(GenericChunkMeta),
}

impl ChunkMeta {
    /// The chunk's ID
    pub fn id(&self) -> Ulid {
        match self {
            ChunkMeta::Xml(m) => m.id,
            ChunkMeta::GeoJson(m) => m.id,
            ChunkMeta::Generic(m) => m.id,
        }
    }

    /// The chunk's MIME type
    pub fn mime_type(&self) -> &str {
        match self {
            ChunkMeta::Xml(m) => &m.mime_type,
            ChunkMeta::GeoJson(m) => &m.mime_type,
            ChunkMeta::Generic(m) => &m.mime_type,
        }
    }

    /// The document format the chunk can be merged into or [`None`] if the
    /// chunk's type is not supported
    pub fn format(&self) -> Option<ChunkFormat> {
        match self {
            ChunkMeta::Xml(_) => Some(ChunkFormat::Xml),
            ChunkMeta::GeoJson(_) => Some(ChunkFormat::GeoJson),
            ChunkMeta::Generic(_) => None,
        }
    }
}

impl From<XmlChunkMeta> for ChunkMeta {
    fn from(value: XmlChunkMeta) -> Self {
        Self::Xml(value)
    }
}

impl From<GeoJsonChunkMeta> for ChunkMeta {
    fn from(value: GeoJsonChunkMeta) -> Self {
        Self::GeoJson(value)
    }
}

impl From<GenericChunkMeta> for ChunkMeta {
    fn from(value: GenericChunkMeta) -> Self {
        Self::Generic(value)
    }
}
