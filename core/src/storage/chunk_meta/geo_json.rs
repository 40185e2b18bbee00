use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use thiserror::Error;
use ulid::Ulid;

/// The `type` of a GeoJSON object stored as a chunk
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum GeoJsonType {
    Feature,
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unsupported GeoJSON chunk type `{0}'")]
pub struct UnknownGeoJsonType(pub String);

impl GeoJsonType {
    /// Returns `true` if objects of this type are geometries
    pub fn is_geometry(&self) -> bool {
        !matches!(self, GeoJsonType::Feature)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoJsonType::Feature => "Feature",
            GeoJsonType::Point => "Point",
            GeoJsonType::MultiPoint => "MultiPoint",
            GeoJsonType::LineString => "LineString",
            GeoJsonType::MultiLineString => "MultiLineString",
            GeoJsonType::Polygon => "Polygon",
            GeoJsonType::MultiPolygon => "MultiPolygon",
            GeoJsonType::GeometryCollection => "GeometryCollection",
        }
    }
}

impl FromStr for GeoJsonType {
    type Err = UnknownGeoJsonType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Feature" => GeoJsonType::Feature,
            "Point" => GeoJsonType::Point,
            "MultiPoint" => GeoJsonType::MultiPoint,
            "LineString" => GeoJsonType::LineString,
            "MultiLineString" => GeoJsonType::MultiLineString,
            "Polygon" => GeoJsonType::Polygon,
            "MultiPolygon" => GeoJsonType::MultiPolygon,
            "GeometryCollection" => GeoJsonType::GeometryCollection,
            _ => return Err(UnknownGeoJsonType(s.to_string())),
        })
    }
}

impl Display for GeoJsonType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about a chunk imported from a GeoJSON document
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct GeoJsonChunkMeta {
    /// The chunk's ID
    pub id: Ulid,

    /// The chunk's MIME type
    pub mime_type: String,

    /// The type of the GeoJSON object the chunk contains
    pub object_type: GeoJsonType,

    /// The name of the coordinate reference system declared by the document
    /// the chunk was imported from
    pub crs: Option<String>,
}

impl GeoJsonChunkMeta {
    pub const MIME_TYPE: &'static str = "application/geo+json";

    pub fn new(id: Ulid, object_type: GeoJsonType, crs: Option<String>) -> Self {
        Self {
            id,
            mime_type: Self::MIME_TYPE.to_string(),
            object_type,
            crs,
        }
    }
}
