//! In-memory SVG document with targeted element rewrites.
//!
//! The document is held as the verbatim stream of XML events. Untouched
//! events are written back byte for byte, so comments, entity references,
//! attribute order and formatting all survive the round trip; only the
//! elements the pipeline rewrites are re-serialised. Renames keep the
//! element's original prefix: `<svg:image>` becomes `<svg:use>`, a
//! default-namespace `<image>` becomes `<use>`.

use crate::error::DedupError;
use crate::pipeline::namespaces::{NamespaceMap, SVG_NS, XLINK_NS};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// One `<image>` element found in the document.
#[derive(Debug, Clone)]
pub struct ImageElement {
    start_event: usize,
    end_event: Option<usize>,
    name: Vec<u8>,
    id: Option<String>,
    href: Option<ImageHref>,
}

#[derive(Debug, Clone)]
struct ImageHref {
    key: Vec<u8>,
    value: String,
}

impl ImageElement {
    /// Value of the `id` attribute, when present.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Payload reference (`xlink:href`, or SVG 2 `href`), when present.
    pub fn href_value(&self) -> Option<&str> {
        self.href.as_ref().map(|h| h.value.as_str())
    }

    /// The element's qualified name as written in the document.
    pub fn qname(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// A parsed SVG document, ready for lookup and rewriting.
#[derive(Debug)]
pub struct SvgDocument {
    events: Vec<Event<'static>>,
    namespaces: NamespaceMap,
    images: Vec<ImageElement>,
    root: Option<String>,
}

impl SvgDocument {
    /// Parse `text` using the namespace bindings scanned from it.
    pub fn parse(text: &str, namespaces: NamespaceMap) -> Result<Self, DedupError> {
        let mut reader = Reader::from_str(text);
        let mut events: Vec<Event<'static>> = Vec::new();
        let mut images: Vec<ImageElement> = Vec::new();
        // One entry per open element: the image index when it is an
        // <image>, so its end tag can be linked back.
        let mut open: Vec<Option<usize>> = Vec::new();
        let mut root: Option<String> = None;

        loop {
            let ev = reader.read_event()?;
            match ev {
                Event::Eof => break,
                Event::Start(ref e) => {
                    if root.is_none() {
                        root = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    }
                    let mut image_idx = None;
                    if let Some(parts) = analyse_image(e, &namespaces)? {
                        image_idx = Some(images.len());
                        images.push(ImageElement {
                            start_event: events.len(),
                            end_event: None,
                            name: parts.name,
                            id: parts.id,
                            href: parts.href,
                        });
                    }
                    open.push(image_idx);
                    events.push(ev.into_owned());
                }
                Event::Empty(ref e) => {
                    if root.is_none() {
                        root = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    }
                    if let Some(parts) = analyse_image(e, &namespaces)? {
                        images.push(ImageElement {
                            start_event: events.len(),
                            end_event: None,
                            name: parts.name,
                            id: parts.id,
                            href: parts.href,
                        });
                    }
                    events.push(ev.into_owned());
                }
                Event::End(_) => {
                    if let Some(Some(image_idx)) = open.pop() {
                        images[image_idx].end_event = Some(events.len());
                    }
                    events.push(ev.into_owned());
                }
                other => events.push(other.into_owned()),
            }
        }

        Ok(Self {
            events,
            namespaces,
            images,
            root,
        })
    }

    /// The namespace bindings this document was parsed with.
    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    /// Local name of the root element, when the document has one.
    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Every `<image>` element in document order.
    pub fn images(&self) -> &[ImageElement] {
        &self.images
    }

    /// Rewrite image `image_idx` into a `<use>` element referencing
    /// `#target_id`. All attributes are kept verbatim except the payload
    /// reference, whose value becomes the fragment link; the attribute name
    /// itself (`xlink:href` or `href`) is preserved.
    pub fn rewrite_as_use(&mut self, image_idx: usize, target_id: &str) -> Result<(), DedupError> {
        let el = &self.images[image_idx];
        let href_key = match &el.href {
            Some(h) => h.key.clone(),
            None => {
                return Err(DedupError::MissingAttribute {
                    element: el.qname(),
                    attribute: "xlink:href".into(),
                })
            }
        };
        let new_name = with_prefix(&el.name, "use");
        let old_start = self.start_of(el.start_event)?;

        let mut new_start = BytesStart::new(new_name.clone());
        for attr in old_start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_ref() == href_key.as_slice() {
                let key = String::from_utf8_lossy(&href_key).into_owned();
                new_start.push_attribute((key.as_str(), format!("#{target_id}").as_str()));
            } else {
                new_start.push_attribute(attr);
            }
        }

        self.commit(image_idx, new_start, &new_name);
        Ok(())
    }

    /// Rewrite image `image_idx` into a `<rect>` with the given `style`.
    ///
    /// The payload reference, `transform` and `preserveAspectRatio` are
    /// dropped; each must be present, since a rect that kept an image
    /// transform (or lost a position it encoded) would render wrong. Any
    /// existing `style` is replaced.
    pub fn rewrite_as_rect(&mut self, image_idx: usize, style: &str) -> Result<(), DedupError> {
        let el = &self.images[image_idx];
        let href_key = match &el.href {
            Some(h) => h.key.clone(),
            None => {
                return Err(DedupError::MissingAttribute {
                    element: el.qname(),
                    attribute: "xlink:href".into(),
                })
            }
        };
        let element_name = el.qname();
        let new_name = with_prefix(&el.name, "rect");
        let old_start = self.start_of(el.start_event)?;

        let mut new_start = BytesStart::new(new_name.clone());
        let mut removed_transform = false;
        let mut removed_aspect = false;
        let mut replaced_style = false;
        for attr in old_start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = attr.key.as_ref();
            if key == href_key.as_slice() {
                continue;
            } else if key == b"transform" {
                removed_transform = true;
            } else if key == b"preserveAspectRatio" {
                removed_aspect = true;
            } else if key == b"style" {
                replaced_style = true;
                new_start.push_attribute(("style", style));
            } else {
                new_start.push_attribute(attr);
            }
        }
        if !removed_transform {
            return Err(DedupError::MissingAttribute {
                element: element_name,
                attribute: "transform".into(),
            });
        }
        if !removed_aspect {
            return Err(DedupError::MissingAttribute {
                element: element_name,
                attribute: "preserveAspectRatio".into(),
            });
        }
        if !replaced_style {
            new_start.push_attribute(("style", style));
        }

        self.commit(image_idx, new_start, &new_name);
        Ok(())
    }

    /// Serialise the document back to XML text.
    pub fn serialize(&self) -> Result<String, DedupError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        for ev in &self.events {
            writer
                .write_event(ev.clone())
                .map_err(|e| DedupError::Serialize {
                    detail: e.to_string(),
                })?;
        }
        String::from_utf8(writer.into_inner().into_inner()).map_err(|e| DedupError::Serialize {
            detail: e.to_string(),
        })
    }

    fn start_of(&self, event_idx: usize) -> Result<BytesStart<'static>, DedupError> {
        match &self.events[event_idx] {
            Event::Start(e) | Event::Empty(e) => Ok(e.clone()),
            _ => Err(DedupError::Serialize {
                detail: "image element index out of sync with event stream".into(),
            }),
        }
    }

    fn commit(&mut self, image_idx: usize, new_start: BytesStart<'static>, new_name: &str) {
        let el = &self.images[image_idx];
        let start_event = el.start_event;
        let end_event = el.end_event;
        self.events[start_event] = match end_event {
            None => Event::Empty(new_start),
            Some(_) => Event::Start(new_start),
        };
        if let Some(end_idx) = end_event {
            self.events[end_idx] = Event::End(BytesEnd::new(new_name.to_string()));
        }
    }
}

struct ImageParts {
    name: Vec<u8>,
    id: Option<String>,
    href: Option<ImageHref>,
}

/// Decide whether `e` is an SVG `<image>` element and pull out the bits the
/// pipeline cares about.
fn analyse_image(e: &BytesStart, ns: &NamespaceMap) -> Result<Option<ImageParts>, DedupError> {
    let name = e.name();
    if name.local_name().as_ref() != b"image" {
        return Ok(None);
    }
    let prefix = name
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    if ns.element_namespace(prefix.as_deref()) != Some(SVG_NS) {
        return Ok(None);
    }

    let mut id = None;
    let mut xlink_href = None;
    let mut plain_href = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key;
        let local = key.local_name();
        let key_prefix = key
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
        if key_prefix.is_none() && local.as_ref() == b"id" {
            id = Some(String::from_utf8_lossy(&attr.value).into_owned());
        } else if local.as_ref() == b"href" {
            let record = ImageHref {
                key: key.as_ref().to_vec(),
                value: String::from_utf8_lossy(&attr.value).into_owned(),
            };
            match key_prefix.as_deref() {
                Some(p) if ns.attribute_namespace(Some(p)) == Some(XLINK_NS) => {
                    xlink_href = Some(record);
                }
                // SVG 2 dropped the xlink prefix; accept a bare href too.
                None => plain_href = Some(record),
                Some(_) => {}
            }
        }
    }

    Ok(Some(ImageParts {
        name: name.as_ref().to_vec(),
        id,
        href: xlink_href.or(plain_href),
    }))
}

/// Join `new_local` with the prefix of `original` (`svg:image` → `svg:use`,
/// `image` → `use`).
fn with_prefix(original: &[u8], new_local: &str) -> String {
    match original.iter().position(|&b| b == b':') {
        Some(pos) => format!(
            "{}:{}",
            String::from_utf8_lossy(&original[..pos]),
            new_local
        ),
        None => new_local.to_string(),
    }
}
