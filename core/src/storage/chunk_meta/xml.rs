use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use quick_xml::{
    escape::escape,
    events::{BytesEnd, BytesStart},
    name::PrefixDeclaration,
    Reader,
};
use ulid::Ulid;

/// The namespace that the `schemaLocation` attribute belongs to
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// An XML namespace prefix declaration
#[derive(PartialEq, Eq, Clone, Debug, Ord, PartialOrd, Hash)]
pub enum Prefix {
    Default,
    Named(String),
}

impl Prefix {
    /// Returns the name of the attribute that binds this prefix to a namespace
    pub fn xmlns_key(&self) -> Cow<'static, str> {
        match self {
            Prefix::Default => Cow::from("xmlns"),
            Prefix::Named(n) => Cow::from(format!("xmlns:{n}")),
        }
    }

    /// Prepends this prefix to a local `name`
    fn qualify(&self, name: &str) -> String {
        match self {
            Prefix::Default => name.to_string(),
            Prefix::Named(n) => format!("{n}:{name}"),
        }
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::Default => write!(f, "<default>"),
            Prefix::Named(name) => write!(f, "{}", name),
        }
    }
}

/// The start tag of an XML element enclosing a chunk
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct XmlStartElement {
    /// The element's prefix
    pub prefix: Prefix,

    /// The element's local name
    pub name: String,

    /// Namespaces declared on this element
    pub namespaces: Vec<(Prefix, String)>,

    /// All other attributes as pairs of qualified name and unescaped value
    pub attributes: Vec<(String, String)>,

    /// An optional `schemaLocation` attribute
    pub schema_location: Option<(Prefix, Vec<(String, String)>)>,
}

impl XmlStartElement {
    /// Creates a new start element. Namespaces, attributes, and schema
    /// locations will be sorted lexicographically.
    pub fn new(
        prefix: Prefix,
        name: String,
        mut namespaces: Vec<(Prefix, String)>,
        mut attributes: Vec<(String, String)>,
        mut schema_location: Option<(Prefix, Vec<(String, String)>)>,
    ) -> Self {
        namespaces.sort_unstable();
        attributes.sort_unstable();
        if let Some(ref mut sl) = schema_location {
            sl.1.sort_unstable();
        }
        Self {
            prefix,
            name,
            namespaces,
            attributes,
            schema_location,
        }
    }

    /// Creates a plain element without a prefix, namespaces, or attributes
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(Prefix::Default, name.into(), vec![], vec![], None)
    }

    /// Creates a start element from the given XML tag
    pub fn try_from_xml_tag<B>(
        tag: &BytesStart,
        reader: &Reader<B>,
    ) -> Result<Self, quick_xml::Error> {
        let decoder = reader.decoder();
        let prefix = match tag.name().prefix() {
            Some(p) => Prefix::Named(decoder.decode(p.as_ref())?.to_string()),
            None => Prefix::Default,
        };
        let name = decoder.decode(tag.local_name().as_ref())?.to_string();

        let mut namespaces = Vec::new();
        let mut attributes = Vec::new();
        let mut xsi: Option<Prefix> = None;

        for attr in tag.attributes() {
            let attr = attr?;
            let value = attr.decode_and_unescape_value(reader)?.to_string();
            if let Some(binding) = attr.key.as_namespace_binding() {
                let prefix = match binding {
                    PrefixDeclaration::Default => Prefix::Default,
                    PrefixDeclaration::Named(b"") => Prefix::Default,
                    PrefixDeclaration::Named(n) => Prefix::Named(decoder.decode(n)?.to_string()),
                };

                if value == XSI_NAMESPACE {
                    xsi = Some(prefix.clone());
                }

                namespaces.push((prefix, value));
            } else {
                let key = decoder.decode(attr.key.as_ref())?.to_string();
                attributes.push((key, value));
            }
        }

        let schema_location = xsi.and_then(|xsi| {
            let key = xsi_attribute_key(&xsi);
            let i = attributes.iter().position(|(k, _)| *k == key)?;
            let (_, v) = attributes.remove(i);
            Some((xsi, parse_schema_location(&v)))
        });

        Ok(Self::new(
            prefix,
            name,
            namespaces,
            attributes,
            schema_location,
        ))
    }

    /// The element's qualified name
    pub fn qualified_name(&self) -> String {
        self.prefix.qualify(&self.name)
    }

    /// Look up the namespace this element declares for `prefix`
    pub fn namespace(&self, prefix: &Prefix) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, n)| n.as_str())
    }

    /// Look up the value of the attribute with the given qualified name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Create a [`BytesStart`] object from this element
    pub fn to_bytes_start(&self) -> BytesStart<'static> {
        let mut str = self.qualified_name();
        let name_len = str.len();

        // append namespaces
        for (prefix, ns) in &self.namespaces {
            str.push(' ');
            str.push_str(&prefix.xmlns_key());
            str.push_str("=\"");
            str.push_str(&escape(ns));
            str.push('"');
        }

        // append other attributes
        for (key, value) in &self.attributes {
            str.push(' ');
            str.push_str(key);
            str.push_str("=\"");
            str.push_str(&escape(value));
            str.push('"');
        }

        // append schema location attribute
        if let Some((prefix, locations)) = &self.schema_location {
            str.push(' ');
            str.push_str(&xsi_attribute_key(prefix));
            str.push_str("=\"");
            for (i, (ns, uri)) in locations.iter().enumerate() {
                if i > 0 {
                    str.push(' ');
                }
                str.push_str(&escape(ns));
                str.push(' ');
                str.push_str(&escape(uri));
            }
            str.push('"');
        }

        BytesStart::from_content(str, name_len)
    }

    /// Create a [`BytesEnd`] object from this element
    pub fn to_bytes_end(&self) -> BytesEnd<'static> {
        BytesEnd::new(self.qualified_name())
    }
}

impl Display for XmlStartElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bs = self.to_bytes_start();
        write!(f, "<{}>", String::from_utf8_lossy(&bs))
    }
}

/// The name of the `schemaLocation` attribute for the given XSI prefix
fn xsi_attribute_key(xsi: &Prefix) -> String {
    xsi.qualify("schemaLocation")
}

/// Split the value of a `schemaLocation` attribute into pairs of namespace
/// and location. A trailing namespace without location is ignored.
pub fn parse_schema_location(value: &str) -> Vec<(String, String)> {
    let mut r = Vec::new();
    for c in &value.split_whitespace().chunks(2) {
        if let Some((namespace, uri)) = c.collect_tuple() {
            r.push((namespace.to_string(), uri.to_string()));
        } else {
            break;
        }
    }
    r
}

/// Collect the namespace bindings in scope at the given `depth` of an
/// element chain. Inner declarations shadow outer ones.
pub fn namespaces_in_scope(chain: &[XmlStartElement], depth: usize) -> BTreeMap<&Prefix, &str> {
    let mut r = BTreeMap::new();
    for e in chain.iter().take(depth + 1) {
        for (p, ns) in &e.namespaces {
            r.insert(p, ns.as_str());
        }
    }
    r
}

/// Metadata about a chunk imported from an XML document
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct XmlChunkMeta {
    /// The chunk's ID
    pub id: Ulid,

    /// The chunk's MIME type
    pub mime_type: String,

    /// The chain of elements enclosing the chunk, outermost first
    pub parents: Vec<XmlStartElement>,
}

impl XmlChunkMeta {
    pub const MIME_TYPE: &'static str = "application/xml";

    /// Create a new chunk meta object with the given ID and parent elements
    pub fn new(id: Ulid, parents: Vec<XmlStartElement>) -> Self {
        Self {
            id,
            mime_type: Self::MIME_TYPE.to_string(),
            parents,
        }
    }

    /// Use a more specific MIME type (e.g. `application/gml+xml`)
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}
