//! Namespace discovery for SVG documents.
//!
//! Inkscape exports lean heavily on prefixed names: the image payload lives
//! in `xlink:href`, and the elements themselves may be `svg:image` or plain
//! `image` under a default namespace. Before any element can be classified,
//! every `xmlns` / `xmlns:prefix` declaration in the document is collected
//! into a [`NamespaceMap`]. The map is an explicit value handed through the
//! pipeline, so two documents processed back to back can never see each
//! other's bindings.

use crate::error::DedupError;
use quick_xml::events::Event;
use quick_xml::name::PrefixDeclaration;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// The SVG namespace URI.
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// The XLink namespace URI, used by SVG 1.1 `href` attributes.
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Prefix-to-URI bindings collected from one document.
///
/// The empty prefix stands for the default namespace (`xmlns="…"`). When the
/// same prefix is declared more than once, the declaration appearing last in
/// document order wins; scoped redeclarations are rare in generated SVG and
/// not worth a full scope stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    bindings: BTreeMap<String, String>,
}

impl NamespaceMap {
    /// Collect every namespace declaration in `xml`.
    pub fn scan(xml: &str) -> Result<Self, DedupError> {
        let mut reader = Reader::from_str(xml);
        let mut bindings = BTreeMap::new();

        loop {
            match reader.read_event()? {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        if let Some(decl) = attr.key.as_namespace_binding() {
                            let prefix = match decl {
                                PrefixDeclaration::Default => String::new(),
                                PrefixDeclaration::Named(p) => {
                                    String::from_utf8_lossy(p).into_owned()
                                }
                            };
                            let uri = String::from_utf8_lossy(&attr.value).into_owned();
                            debug!(prefix = %prefix, uri = %uri, "registered namespace binding");
                            bindings.insert(prefix, uri);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Self { bindings })
    }

    /// Scan the document at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DedupError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DedupError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::scan(&text)
    }

    /// URI bound to `prefix`, with `""` meaning the default namespace.
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    /// Resolve an element name's namespace. Unprefixed elements fall back to
    /// the default namespace.
    pub fn element_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        self.get(prefix.unwrap_or(""))
    }

    /// Resolve an attribute name's namespace. Per the XML namespaces spec,
    /// unprefixed attributes are in no namespace at all, not the default one.
    pub fn attribute_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        prefix.and_then(|p| self.get(p))
    }

    /// Whether any binding points at the SVG namespace.
    pub fn declares_svg(&self) -> bool {
        self.bindings.values().any(|uri| uri == SVG_NS)
    }

    /// Number of distinct prefixes bound.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterate over `(prefix, uri)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(p, u)| (p.as_str(), u.as_str()))
    }
}
