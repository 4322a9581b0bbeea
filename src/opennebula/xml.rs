//! Thin helpers over `xot` for reading the small XML documents OpenNebula
//! sends back.

use xot::{Node, Xot};

use crate::error::{Error, Result};

/// A parsed document plus the arena that owns its nodes.
pub struct XmlDocument {
    xot: Xot,
    root: Node,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut xot = Xot::new();
        let document = xot
            .parse(xml)
            .map_err(|e| Error::protocol(format!("invalid XML: {}", e)))?;
        let root = xot
            .document_element(document)
            .map_err(|e| Error::protocol(format!("no document element: {}", e)))?;
        Ok(Self { xot, root })
    }

    pub fn root(&self) -> Node {
        self.root
    }

    /// Local name of an element node.
    pub fn name(&self, node: Node) -> Option<&str> {
        self.xot
            .element(node)
            .map(|element| self.xot.local_name_str(element.name()))
    }

    /// Child elements of `node`, in document order.
    pub fn elements(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.xot
            .children(node)
            .filter(move |&child| self.xot.element(child).is_some())
    }

    /// Child elements of `node` called `name`.
    pub fn children_named<'a>(
        &'a self,
        node: Node,
        name: &'a str,
    ) -> impl Iterator<Item = Node> + 'a {
        self.elements(node)
            .filter(move |&child| self.name(child) == Some(name))
    }

    pub fn child(&self, node: Node, name: &str) -> Option<Node> {
        self.children_named(node, name).next()
    }

    /// Text of `node`; empty for elements without text.
    pub fn text(&self, node: Node) -> String {
        self.xot
            .children(node)
            .filter_map(|child| self.xot.text_str(child))
            .collect()
    }

    /// Text of the first child called `name`.
    pub fn child_text(&self, node: Node, name: &str) -> Option<String> {
        self.child(node, name).map(|child| self.text(child))
    }

    /// Text of the first child called `name`, which must be present.
    pub fn required_text(&self, node: Node, name: &str) -> Result<String> {
        self.child_text(node, name).ok_or_else(|| {
            Error::protocol(format!(
                "element <{}> lacks <{}>",
                self.name(node).unwrap_or("?"),
                name
            ))
        })
    }

    /// Integer in the first child called `name`.
    pub fn required_int(&self, node: Node, name: &str) -> Result<i64> {
        let text = self.required_text(node, name)?;
        text.trim()
            .parse()
            .map_err(|_| Error::protocol(format!("<{}> is not an integer: {:?}", name, text)))
    }
}

/// Escapes text for use inside an XML element.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
