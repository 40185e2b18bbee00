use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{
    output::{Merger, MergerError},
    storage::chunk_meta::GeoJsonChunkMeta,
};

/// Progress of the output document
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Empty,
    Resolved,
    Open,
    Closed,
}

/// The kind of collection the chunks are merged into
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Collection {
    Features,
    Geometries,
}

impl Collection {
    fn type_name(&self) -> &'static str {
        match self {
            Collection::Features => "FeatureCollection",
            Collection::Geometries => "GeometryCollection",
        }
    }

    fn member_name(&self) -> &'static str {
        match self {
            Collection::Features => "features",
            Collection::Geometries => "geometries",
        }
    }
}

/// A merger that merges GeoJSON features and geometries into a
/// `FeatureCollection` or, if all chunks are geometries and the merger is not
/// optimistic, into a `GeometryCollection`
pub struct GeoJsonMerger {
    optimistic: bool,
    crs: Option<String>,
    collection: Collection,
    state: State,
    merged: usize,
}

impl GeoJsonMerger {
    /// Create a new GeoJSON merger
    pub fn new(optimistic: bool) -> Self {
        Self {
            optimistic,
            crs: None,
            collection: Collection::Features,
            state: State::Empty,
            merged: 0,
        }
    }

    /// Fail if the chunk declares a CRS that differs from the one recorded
    fn check_crs(&self, meta: &GeoJsonChunkMeta) -> Result<(), MergerError> {
        match (&self.crs, &meta.crs) {
            (Some(expected), Some(found)) if expected != found => {
                Err(MergerError::StructuralConflict {
                    found: found.clone(),
                    expected: expected.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Check if the chunk fits into the collection without changing it
    fn check_compatible(&self, meta: &GeoJsonChunkMeta) -> Result<(), MergerError> {
        if meta.crs.is_some() && meta.crs != self.crs {
            return Err(MergerError::StructuralConflict {
                found: meta.crs.clone().unwrap_or_default(),
                expected: self.crs.clone().unwrap_or_else(|| "no CRS".to_string()),
            });
        }
        if self.collection == Collection::Geometries && !meta.object_type.is_geometry() {
            return Err(MergerError::StructuralConflict {
                found: meta.object_type.to_string(),
                expected: "a geometry".to_string(),
            });
        }
        Ok(())
    }

    /// The beginning of the document up to the opening bracket of the array
    fn header(&self) -> String {
        let mut h = format!(r#"{{"type":"{}","#, self.collection.type_name());
        if let Some(crs) = &self.crs {
            h.push_str(r#""crs":{"type":"name","properties":{"name":"#);
            h.push_str(&Value::from(crs.as_str()).to_string());
            h.push_str("}},");
        }
        h.push('"');
        h.push_str(self.collection.member_name());
        h.push_str(r#"":["#);
        h
    }
}

impl Merger<GeoJsonChunkMeta> for GeoJsonMerger {
    fn init(&mut self, meta: &GeoJsonChunkMeta) -> Result<(), MergerError> {
        match self.state {
            State::Closed => return Err(MergerError::SessionClosed),
            State::Open if self.optimistic => {}
            State::Open => self.check_compatible(meta)?,
            State::Empty | State::Resolved if self.optimistic => {
                if self.crs.is_none() {
                    self.crs = meta.crs.clone();
                }
                self.state = State::Resolved;
            }
            State::Empty | State::Resolved => {
                self.check_crs(meta)?;
                if self.crs.is_none() {
                    self.crs = meta.crs.clone();
                }
                self.collection = match (self.state, meta.object_type.is_geometry()) {
                    (State::Empty, true) => Collection::Geometries,
                    (_, true) => self.collection,
                    (_, false) => Collection::Features,
                };
                self.state = State::Resolved;
            }
        }
        Ok(())
    }

    async fn merge<R, W>(
        &mut self,
        mut chunk: R,
        meta: &GeoJsonChunkMeta,
        out: &mut W,
    ) -> Result<(), MergerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.state {
            State::Empty if self.optimistic => {
                self.crs = meta.crs.clone();
                self.state = State::Resolved;
            }
            State::Empty => return Err(MergerError::NotInitialized),
            State::Closed => return Err(MergerError::SessionClosed),
            State::Resolved | State::Open => {}
        }

        if !self.optimistic {
            self.check_compatible(meta)?;
        }

        if self.state == State::Resolved {
            out.write_all(self.header().as_bytes()).await?;
            self.state = State::Open;
        }

        if self.merged > 0 {
            out.write_all(b",").await?;
        }

        let wrap = self.collection == Collection::Features && meta.object_type.is_geometry();
        if wrap {
            out.write_all(br#"{"type":"Feature","properties":null,"geometry":"#)
                .await?;
        }
        let len = tokio::io::copy(&mut chunk, out).await?;
        if wrap {
            out.write_all(b"}").await?;
        }

        self.merged += 1;
        trace!(id = %meta.id, len, "merged GeoJSON chunk");

        Ok(())
    }

    async fn finish<W>(&mut self, out: &mut W) -> Result<(), MergerError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.state {
            State::Empty => {}
            State::Resolved => {
                out.write_all(self.header().as_bytes()).await?;
                out.write_all(b"]}").await?;
            }
            State::Open => out.write_all(b"]}").await?,
            State::Closed => return Err(MergerError::SessionClosed),
        }
        self.state = State::Closed;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::from_utf8;

    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use ulid::Ulid;

    use crate::{
        output::{test_util::FailingWriter, Merger, MergerError},
        storage::chunk_meta::{GeoJsonChunkMeta, GeoJsonType},
    };

    use super::GeoJsonMerger;

    const FEATURE1: &str = r#"{"type":"Feature","properties":{"name":"a"},"geometry":{"type":"Point","coordinates":[1,2]}}"#;
    const FEATURE2: &str = r#"{"type":"Feature","properties":{"name":"b"},"geometry":{"type":"Point","coordinates":[3,4]}}"#;
    const POINT: &str = r#"{"type":"Point","coordinates":[5,6]}"#;
    const LINE: &str = r#"{"type":"LineString","coordinates":[[1,2],[3,4]]}"#;

    fn meta(object_type: GeoJsonType, crs: Option<&str>) -> GeoJsonChunkMeta {
        GeoJsonChunkMeta::new(Ulid::new(), object_type, crs.map(|c| c.to_string()))
    }

    async fn merge_all(
        optimistic: bool,
        chunks: &[(&str, GeoJsonChunkMeta)],
    ) -> Result<String, MergerError> {
        let mut merger = GeoJsonMerger::new(optimistic);
        if !optimistic {
            for (_, m) in chunks {
                merger.init(m)?;
            }
        }

        let mut s = Vec::new();
        for (c, m) in chunks {
            merger.merge(c.as_bytes(), m, &mut s).await?;
        }
        merger.finish(&mut s).await?;

        let s = String::from_utf8(s).unwrap();
        serde_json::from_str::<Value>(&s).expect("merged document must be valid JSON");
        Ok(s)
    }

    #[tokio::test]
    async fn one_feature() {
        let s = merge_all(false, &[(FEATURE1, meta(GeoJsonType::Feature, None))])
            .await
            .unwrap();
        assert_eq!(
            s,
            format!(r#"{{"type":"FeatureCollection","features":[{FEATURE1}]}}"#)
        );
    }

    #[tokio::test]
    async fn two_features() {
        let s = merge_all(
            false,
            &[
                (FEATURE1, meta(GeoJsonType::Feature, None)),
                (FEATURE2, meta(GeoJsonType::Feature, None)),
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            s,
            format!(r#"{{"type":"FeatureCollection","features":[{FEATURE1},{FEATURE2}]}}"#)
        );
    }

    #[tokio::test]
    async fn crs() {
        let crs = "urn:ogc:def:crs:EPSG::25832";
        let s = merge_all(
            false,
            &[
                (FEATURE1, meta(GeoJsonType::Feature, None)),
                (FEATURE2, meta(GeoJsonType::Feature, Some(crs))),
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            s,
            format!(
                r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"{crs}"}}}},"features":[{FEATURE1},{FEATURE2}]}}"#
            )
        );
    }

    #[tokio::test]
    async fn crs_conflict() {
        let e = merge_all(
            false,
            &[
                (FEATURE1, meta(GeoJsonType::Feature, Some("EPSG:4326"))),
                (FEATURE2, meta(GeoJsonType::Feature, Some("EPSG:25832"))),
            ],
        )
        .await
        .unwrap_err();
        match e {
            MergerError::StructuralConflict { found, expected } => {
                assert_eq!(found, "EPSG:25832");
                assert_eq!(expected, "EPSG:4326");
            }
            _ => panic!("Expected MergerError::StructuralConflict"),
        }
    }

    /// The optimistic merger uses the first CRS and ignores all others
    #[tokio::test]
    async fn optimistic_crs() {
        let s = merge_all(
            true,
            &[
                (FEATURE1, meta(GeoJsonType::Feature, Some("EPSG:4326"))),
                (FEATURE2, meta(GeoJsonType::Feature, Some("EPSG:25832"))),
            ],
        )
        .await
        .unwrap();
        let v: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["crs"]["properties"]["name"], "EPSG:4326");
        assert_eq!(v["features"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn geometries() {
        let s = merge_all(
            false,
            &[
                (POINT, meta(GeoJsonType::Point, None)),
                (LINE, meta(GeoJsonType::LineString, None)),
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            s,
            format!(r#"{{"type":"GeometryCollection","geometries":[{POINT},{LINE}]}}"#)
        );
    }

    /// Geometries are wrapped into features if they are merged together with
    /// features
    #[tokio::test]
    async fn mixed() {
        let s = merge_all(
            false,
            &[
                (POINT, meta(GeoJsonType::Point, None)),
                (FEATURE1, meta(GeoJsonType::Feature, None)),
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            s,
            format!(
                r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","properties":null,"geometry":{POINT}}},{FEATURE1}]}}"#
            )
        );
    }

    /// The optimistic merger always creates a feature collection
    #[tokio::test]
    async fn optimistic_geometries() {
        let s = merge_all(
            true,
            &[
                (POINT, meta(GeoJsonType::Point, None)),
                (LINE, meta(GeoJsonType::LineString, None)),
            ],
        )
        .await
        .unwrap();
        let v: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["type"], "FeatureCollection");
        assert_eq!(v["features"][1]["geometry"]["type"], "LineString");
    }

    /// A feature cannot be added to a geometry collection that has already
    /// been opened
    #[tokio::test]
    async fn unannounced_feature() {
        let mut merger = GeoJsonMerger::new(false);
        let point = meta(GeoJsonType::Point, None);
        merger.init(&point).unwrap();

        let mut s = Vec::new();
        merger.merge(POINT.as_bytes(), &point, &mut s).await.unwrap();
        let e = merger
            .merge(FEATURE1.as_bytes(), &meta(GeoJsonType::Feature, None), &mut s)
            .await
            .unwrap_err();
        assert!(matches!(e, MergerError::StructuralConflict { .. }));
    }

    #[tokio::test]
    async fn strict_without_init() {
        let mut merger = GeoJsonMerger::new(false);
        let mut s = Vec::new();
        let e = merger
            .merge(FEATURE1.as_bytes(), &meta(GeoJsonType::Feature, None), &mut s)
            .await
            .unwrap_err();
        assert!(matches!(e, MergerError::NotInitialized));
    }

    #[tokio::test]
    async fn finish_without_chunks() {
        let mut merger = GeoJsonMerger::new(false);
        merger.init(&meta(GeoJsonType::Feature, None)).unwrap();

        let mut s = Vec::new();
        merger.finish(&mut s).await.unwrap();
        assert_eq!(
            from_utf8(&s).unwrap(),
            r#"{"type":"FeatureCollection","features":[]}"#
        );
    }

    #[tokio::test]
    async fn finish_empty() {
        let mut merger = GeoJsonMerger::new(true);
        let mut s = Vec::new();
        merger.finish(&mut s).await.unwrap();
        assert!(s.is_empty());

        let e = merger.finish(&mut s).await.unwrap_err();
        assert!(matches!(e, MergerError::SessionClosed));
    }

    #[tokio::test]
    async fn backpressure() {
        let feature = format!(
            r#"{{"type":"Feature","properties":{{"name":"{}"}},"geometry":null}}"#,
            "x".repeat(10_000)
        );
        let f = meta(GeoJsonType::Feature, None);
        let p = meta(GeoJsonType::Point, None);
        let (mut client, mut server) = tokio::io::duplex(16);

        let reader = tokio::spawn(async move {
            let mut s = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut server, &mut s)
                .await
                .unwrap();
            s
        });

        let mut merger = GeoJsonMerger::new(false);
        merger.init(&f).unwrap();
        merger.init(&p).unwrap();
        merger.merge(feature.as_bytes(), &f, &mut client).await.unwrap();
        merger.merge(POINT.as_bytes(), &p, &mut client).await.unwrap();
        merger.merge(feature.as_bytes(), &f, &mut client).await.unwrap();
        merger.finish(&mut client).await.unwrap();
        drop(client);

        let s = String::from_utf8(reader.await.unwrap()).unwrap();
        assert_eq!(
            s,
            format!(
                r#"{{"type":"FeatureCollection","features":[{feature},{{"type":"Feature","properties":null,"geometry":{POINT}}},{feature}]}}"#
            )
        );
        serde_json::from_str::<Value>(&s).unwrap();
    }

    #[tokio::test]
    async fn failing_sink() {
        let mut merger = GeoJsonMerger::new(true);
        let mut out = FailingWriter {
            written: Vec::new(),
            limit: 4,
        };
        let e = merger
            .merge(FEATURE1.as_bytes(), &meta(GeoJsonType::Feature, None), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(e, MergerError::StreamFailure(_)));
    }
}
