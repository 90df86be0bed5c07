//! Small helpers over the XML tree library: qualified names, child grouping
//! and lookups.

use std::fmt;

use roxmltree::Node;

/// Qualified element name: namespace URI (if any) plus local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName<'a> {
    pub namespace: Option<&'a str>,
    pub local: &'a str,
}

impl fmt::Display for QName<'_> {
    /// Clark notation, `{namespace}local`, as used in messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

pub fn qname<'a>(node: Node<'a, '_>) -> QName<'a> {
    QName {
        namespace: node.tag_name().namespace(),
        local: node.tag_name().name(),
    }
}

/// Element children of a node, in document order.
pub fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// First child element with the given namespace and local name.
pub fn find_child<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    local: &str,
) -> Option<Node<'a, 'input>> {
    child_elements(node).find(|c| {
        c.tag_name().name() == local && c.tag_name().namespace() == Some(namespace)
    })
}

/// Group an element's children by qualified tag name. The children are
/// sorted by tag first (the input is not assumed to be pre-sorted), then
/// grouped into contiguous runs; document order is preserved within each
/// group.
pub fn sorted_tag_groups<'a, 'input>(
    node: Node<'a, 'input>,
) -> Vec<(QName<'a>, Vec<Node<'a, 'input>>)> {
    let mut children: Vec<Node<'a, 'input>> = child_elements(node).collect();
    children.sort_by_key(|c| (c.tag_name().namespace().unwrap_or(""), c.tag_name().name()));

    let mut groups: Vec<(QName<'a>, Vec<Node<'a, 'input>>)> = Vec::new();
    for child in children {
        let name = qname(child);
        match groups.last_mut() {
            Some((last, members)) if *last == name => members.push(child),
            _ => groups.push((name, vec![child])),
        }
    }
    groups
}
