use std::collections::BTreeMap;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{
    output::{Merger, MergerError},
    storage::chunk_meta::{
        xml::{namespaces_in_scope, Prefix},
        XmlChunkMeta, XmlStartElement,
    },
};

/// Progress of the output document
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    /// No chunk has been seen yet
    Empty,

    /// The common parent elements are known but nothing has been written
    Resolved,

    /// The start tags of the common parent elements have been written
    Open,

    /// The end tags have been written
    Closed,
}

/// A merger that merges XML chunks. The merged document's root is the chain
/// of parent elements all chunks have in common. In strict mode, this chain
/// is computed from the metadata passed to [`init`](Merger::init). In
/// optimistic mode, the parent elements of the first chunk are used.
pub struct XmlMerger {
    optimistic: bool,
    parents: Vec<XmlStartElement>,
    state: State,
    merged: usize,
}

impl XmlMerger {
    /// Create a new XML merger
    pub fn new(optimistic: bool) -> Self {
        Self {
            optimistic,
            parents: Vec::new(),
            state: State::Empty,
            merged: 0,
        }
    }

    /// Check if a chunk with the given parent elements can be written into
    /// the document without changing the common parent elements
    fn check_compatible(&self, parents: &[XmlStartElement]) -> Result<(), MergerError> {
        if self.parents.is_empty() && parents.is_empty() && self.merged == 0 {
            // the chunk is the document itself
            return Ok(());
        }
        if reconcile(&self.parents, parents)? != self.parents {
            return Err(MergerError::StructuralConflict {
                found: describe_chain(parents),
                expected: describe_chain(&self.parents),
            });
        }
        Ok(())
    }
}

impl Merger<XmlChunkMeta> for XmlMerger {
    fn init(&mut self, meta: &XmlChunkMeta) -> Result<(), MergerError> {
        match self.state {
            State::Empty => {
                self.parents = meta.parents.clone();
                self.state = State::Resolved;
            }
            State::Resolved | State::Open if self.optimistic => {}
            State::Resolved => self.parents = reconcile(&self.parents, &meta.parents)?,
            State::Open => self.check_compatible(&meta.parents)?,
            State::Closed => return Err(MergerError::SessionClosed),
        }
        Ok(())
    }

    async fn merge<R, W>(
        &mut self,
        mut chunk: R,
        meta: &XmlChunkMeta,
        out: &mut W,
    ) -> Result<(), MergerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.state {
            State::Empty if self.optimistic => {
                self.parents = meta.parents.clone();
                self.state = State::Resolved;
            }
            State::Empty => return Err(MergerError::NotInitialized),
            State::Closed => return Err(MergerError::SessionClosed),
            State::Resolved | State::Open => {}
        }

        // parent elements of the chunk that are not part of the common chain
        let wrappers = if self.optimistic {
            &[][..]
        } else {
            self.check_compatible(&meta.parents)?;
            &meta.parents[self.parents.len()..]
        };

        if self.state == State::Resolved {
            for p in &self.parents {
                write_start_tag(out, p).await?;
            }
            self.state = State::Open;
        }

        for w in wrappers {
            write_start_tag(out, w).await?;
        }
        let len = tokio::io::copy(&mut chunk, out).await?;
        for w in wrappers.iter().rev() {
            write_end_tag(out, w).await?;
        }

        self.merged += 1;
        trace!(id = %meta.id, len, "merged XML chunk");

        Ok(())
    }

    async fn finish<W>(&mut self, out: &mut W) -> Result<(), MergerError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.state {
            State::Empty => {}
            State::Resolved => {
                // no chunks but we know what an empty document looks like
                for p in &self.parents {
                    write_start_tag(out, p).await?;
                }
                for p in self.parents.iter().rev() {
                    write_end_tag(out, p).await?;
                }
            }
            State::Open => {
                for p in self.parents.iter().rev() {
                    write_end_tag(out, p).await?;
                }
            }
            State::Closed => return Err(MergerError::SessionClosed),
        }
        self.state = State::Closed;
        out.flush().await?;
        Ok(())
    }
}

async fn write_start_tag<W>(out: &mut W, element: &XmlStartElement) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(b"<").await?;
    out.write_all(&element.to_bytes_start()).await?;
    out.write_all(b">").await
}

async fn write_end_tag<W>(out: &mut W, element: &XmlStartElement) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(b"</").await?;
    out.write_all(&element.to_bytes_end()).await?;
    out.write_all(b">").await
}

fn describe_chain(chain: &[XmlStartElement]) -> String {
    if chain.is_empty() {
        "no parent elements".to_string()
    } else {
        chain.iter().map(|e| e.to_string()).collect()
    }
}

fn conflict(found: &XmlStartElement, expected: &XmlStartElement) -> MergerError {
    MergerError::StructuralConflict {
        found: found.to_string(),
        expected: expected.to_string(),
    }
}

/// Check if two elements have the same local name and their prefixes refer
/// to the same namespace
fn same_element(
    a: &XmlStartElement,
    scope_a: &BTreeMap<&Prefix, &str>,
    b: &XmlStartElement,
    scope_b: &BTreeMap<&Prefix, &str>,
) -> bool {
    if a.name != b.name {
        return false;
    }
    match (scope_a.get(&a.prefix), scope_b.get(&b.prefix)) {
        (Some(ns_a), Some(ns_b)) => ns_a == ns_b,
        (None, None) => a.prefix == b.prefix,
        _ => false,
    }
}

/// Merge the namespaces, attributes, and schema locations of two elements
/// that have already been found to be the same
fn merge_elements(
    a: &XmlStartElement,
    b: &XmlStartElement,
) -> Result<XmlStartElement, MergerError> {
    let mut namespaces = a.namespaces.clone();
    for (prefix, ns) in &b.namespaces {
        if a.namespace(prefix).is_none() {
            namespaces.push((prefix.clone(), ns.clone()));
        }
    }

    let mut attributes = a.attributes.clone();
    for (key, value) in &b.attributes {
        match a.attribute(key) {
            Some(v) if v != value => return Err(conflict(b, a)),
            Some(_) => {}
            None => attributes.push((key.clone(), value.clone())),
        }
    }

    // schema locations are hints, so the first location of a namespace wins
    let schema_location = match (&a.schema_location, &b.schema_location) {
        (Some((prefix, sla)), Some((_, slb))) => {
            let mut locations = sla.clone();
            for (ns, uri) in slb {
                if !locations.iter().any(|(n, _)| n == ns) {
                    locations.push((ns.clone(), uri.clone()));
                }
            }
            Some((prefix.clone(), locations))
        }
        (sl, None) | (None, sl) => sl.clone(),
    };

    Ok(XmlStartElement::new(
        a.prefix.clone(),
        a.name.clone(),
        namespaces,
        attributes,
        schema_location,
    ))
}

/// Compute the longest chain of parent elements that chunks from both given
/// chains can be nested in. Matching elements are merged. Fails if the root
/// elements differ or if matching elements have conflicting attributes or
/// namespace bindings.
fn reconcile(
    common: &[XmlStartElement],
    parents: &[XmlStartElement],
) -> Result<Vec<XmlStartElement>, MergerError> {
    if common.is_empty() || parents.is_empty() {
        // at least one of the chunks is a complete document
        return Err(MergerError::StructuralConflict {
            found: describe_chain(parents),
            expected: describe_chain(common),
        });
    }

    let mut result = Vec::with_capacity(common.len().min(parents.len()));
    for (depth, (a, b)) in common.iter().zip(parents).enumerate() {
        let scope_a = namespaces_in_scope(common, depth);
        let scope_b = namespaces_in_scope(parents, depth);

        if !same_element(a, &scope_a, b, &scope_b) {
            if depth == 0 {
                return Err(conflict(b, a));
            }
            debug!(
                depth,
                found = %b,
                expected = %a,
                "parent elements differ, merging chunks into common ancestor"
            );
            break;
        }

        for (prefix, ns) in &scope_b {
            if scope_a.get(prefix).is_some_and(|other| other != ns) {
                return Err(conflict(b, a));
            }
        }

        // unprefixed elements of a chunk must stay in their namespace
        if scope_a.get(&Prefix::Default) != scope_b.get(&Prefix::Default) {
            return Err(conflict(b, a));
        }

        result.push(merge_elements(a, b)?);
    }

    Ok(result)
}
