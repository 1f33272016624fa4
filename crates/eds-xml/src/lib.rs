//! Decode the OWServer `details.xml` document into a tagged element tree using quick-xml.
//!
//! The decoder knows nothing about the OWServer schema. An element is a
//! [`XmlNode::Leaf`] when it has no child elements and a
//! [`XmlNode::Interior`] otherwise; that decision is made once, right after
//! decoding, so consumers never inspect raw trees again.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid document: {0}")]
    Invalid(String),
}

/// A single `name="value"` pair carried by an element start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Decoded element, classified as leaf or interior by the presence of child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Element without child elements; carries its trimmed text content.
    Leaf {
        tag: String,
        attributes: Vec<Attribute>,
        text: String,
    },
    /// Element with at least one child element. Mixed text is discarded.
    Interior {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<XmlNode>,
    },
}

impl XmlNode {
    /// Local name of the element (namespace prefix stripped).
    pub fn tag(&self) -> &str {
        match self {
            XmlNode::Leaf { tag, .. } | XmlNode::Interior { tag, .. } => tag,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        match self {
            XmlNode::Leaf { attributes, .. } | XmlNode::Interior { attributes, .. } => attributes,
        }
    }

    /// Look up an attribute value by its local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Text content of a leaf; interior elements report an empty string.
    pub fn text(&self) -> &str {
        match self {
            XmlNode::Leaf { text, .. } => text,
            XmlNode::Interior { .. } => "",
        }
    }

    pub fn children(&self) -> &[XmlNode] {
        match self {
            XmlNode::Leaf { .. } => &[],
            XmlNode::Interior { children, .. } => children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, XmlNode::Leaf { .. })
    }

    /// First direct child with the given tag.
    pub fn find_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children().iter().find(|child| child.tag() == tag)
    }

    pub fn find_child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        match self {
            XmlNode::Leaf { .. } => None,
            XmlNode::Interior { children, .. } => {
                children.iter_mut().find(|child| child.tag() == tag)
            }
        }
    }

    pub fn children_mut(&mut self) -> &mut [XmlNode] {
        match self {
            XmlNode::Leaf { .. } => &mut [],
            XmlNode::Interior { children, .. } => children,
        }
    }

    /// Replace the text of a leaf. Returns `false` for interior elements.
    pub fn set_text(&mut self, value: impl Into<String>) -> bool {
        match self {
            XmlNode::Leaf { text, .. } => {
                *text = value.into();
                true
            }
            XmlNode::Interior { .. } => false,
        }
    }
}

/// Element under construction while its end tag has not been seen yet.
struct Frame {
    tag: String,
    attributes: Vec<Attribute>,
    text: String,
    children: Vec<XmlNode>,
}

impl Frame {
    fn open(event: &BytesStart<'_>) -> Result<Self, XmlError> {
        Ok(Self {
            tag: String::from_utf8_lossy(event.local_name().as_ref()).into_owned(),
            attributes: collect_attributes(event)?,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn close(self) -> XmlNode {
        if self.children.is_empty() {
            XmlNode::Leaf {
                tag: self.tag,
                attributes: self.attributes,
                text: self.text.trim().to_string(),
            }
        } else {
            if !self.text.trim().is_empty() {
                trace!(tag = %self.tag, "discarding mixed text of interior element");
            }
            XmlNode::Interior {
                tag: self.tag,
                attributes: self.attributes,
                children: self.children,
            }
        }
    }
}

/// Decode a complete document. Malformed input never yields a partial tree.
pub fn parse_document(bytes: &[u8]) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            XmlError::Xml(format!("{err} at byte {}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => stack.push(Frame::open(&e)?),
            Event::Empty(e) => {
                let node = Frame::open(&e)?.close();
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(e) => {
                let frame = stack.pop().ok_or_else(|| {
                    XmlError::Invalid(format!(
                        "unexpected end tag </{}>",
                        String::from_utf8_lossy(e.local_name().as_ref())
                    ))
                })?;
                attach(&mut stack, &mut root, frame.close())?;
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|err| XmlError::Xml(format!("invalid UTF-8 in CDATA: {err}")))?;
                append_text(&mut stack, text)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Invalid(format!("unclosed element <{}>", open.tag)));
    }
    let root = root.ok_or_else(|| XmlError::Invalid("document has no root element".into()))?;
    trace!(tag = root.tag(), children = root.children().len(), "decoded document");
    Ok(root)
}

fn attach(
    stack: &mut [Frame],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_some() => Err(XmlError::Invalid(format!(
            "content after the root element: <{}>",
            node.tag()
        ))),
        None => {
            *root = Some(node);
            Ok(())
        }
    }
}

fn append_text(stack: &mut [Frame], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::Invalid("text outside of the root element".into())),
    }
}

fn collect_attributes(event: &BytesStart<'_>) -> Result<Vec<Attribute>, XmlError> {
    let mut attributes = Vec::new();
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Xml(err.to_string()))?
            .trim()
            .to_string();
        attributes.push(Attribute { name, value });
    }
    Ok(attributes)
}
