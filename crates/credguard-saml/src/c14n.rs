//! Exclusive XML canonicalization (`xml-exc-c14n#`)
//!
//! Renders an element subtree the way a signer hashed it: namespace
//! declarations are emitted only where visibly utilized (or listed in an
//! `InclusiveNamespaces` prefix list), attributes are sorted, empty elements are
//! expanded and character data is re-escaped. One node may be excluded from
//! the output, which is how the enveloped-signature transform is applied.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Node, NodeId, NodeType};

/// `http://www.w3.org/2001/10/xml-exc-c14n#`
pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
pub const EXCLUSIVE_C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Pseudo-prefix naming the default namespace in a prefix list
const DEFAULT_PREFIX_TOKEN: &str = "#default";

/// Exclusive canonicalizer for a single element subtree
#[derive(Debug, Clone, Default)]
pub struct ExclusiveCanonicalizer {
    inclusive_prefixes: BTreeSet<String>,
    with_comments: bool,
    excluded: Option<NodeId>,
}

impl ExclusiveCanonicalizer {
    /// Canonicalizer without comments and without inclusive prefixes
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizer for an algorithm URI, `None` if the URI is not exclusive C14N
    pub fn for_algorithm(uri: &str) -> Option<Self> {
        match uri {
            EXCLUSIVE_C14N => Some(Self::new()),
            EXCLUSIVE_C14N_WITH_COMMENTS => Some(Self::new().with_comments()),
            _ => None,
        }
    }

    /// Keep comment nodes in the output
    pub fn with_comments(mut self) -> Self {
        self.with_comments = true;
        self
    }

    /// Treat the whitespace separated `PrefixList` entries as inclusive
    pub fn with_inclusive_prefixes(mut self, prefix_list: &str) -> Self {
        self.inclusive_prefixes
            .extend(prefix_list.split_ascii_whitespace().map(str::to_string));
        self
    }

    /// Leave `node` and its descendants out of the output
    pub fn excluding(mut self, node: NodeId) -> Self {
        self.excluded = Some(node);
        self
    }

    /// Canonical form of the subtree rooted at `apex`
    ///
    /// Namespace declarations on ancestors of `apex` are rendered on the apex
    /// when utilized there, as for any document subset.
    pub fn canonicalize(&self, apex: Node<'_, '_>) -> String {
        let mut out = String::new();
        if apex.is_element() {
            self.write_element(apex, &BTreeMap::new(), &mut out);
        }
        out
    }

    fn write_element(&self, node: Node<'_, '_>, rendered: &BTreeMap<String, String>, out: &mut String) {
        let (prefix, qname) = element_qname(node);

        // Prefixes whose declarations this element must carry ("" is the default namespace)
        let mut visible: BTreeSet<&str> = BTreeSet::new();
        visible.insert(prefix.unwrap_or(""));
        for attr in node.attributes() {
            if let Some(ns) = attr.namespace()
                && ns != XML_NAMESPACE
                && let Some(attr_prefix) = attribute_prefix(node, ns)
            {
                visible.insert(attr_prefix);
            }
        }
        for inclusive in &self.inclusive_prefixes {
            if inclusive == DEFAULT_PREFIX_TOKEN {
                visible.insert("");
            } else if node.lookup_namespace_uri(Some(inclusive.as_str())).is_some() {
                visible.insert(inclusive.as_str());
            }
        }

        let mut scope = rendered.clone();
        out.push('<');
        out.push_str(&qname);
        for declared in visible {
            if declared == "xml" {
                continue;
            }
            let uri = if declared.is_empty() {
                node.lookup_namespace_uri(None).unwrap_or("")
            } else {
                match node.lookup_namespace_uri(Some(declared)) {
                    Some(uri) => uri,
                    None => continue,
                }
            };
            let current = scope.get(declared).map(String::as_str);
            let already_rendered = if declared.is_empty() {
                current.unwrap_or("") == uri
            } else {
                current == Some(uri)
            };
            if already_rendered {
                continue;
            }
            if declared.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(declared);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
            scope.insert(declared.to_string(), uri.to_string());
        }

        let mut attributes: Vec<(&str, &str, String, &str)> = node
            .attributes()
            .map(|attr| {
                let ns = attr.namespace().unwrap_or("");
                let name = match attr.namespace() {
                    Some(XML_NAMESPACE) => format!("xml:{}", attr.name()),
                    Some(uri) => match attribute_prefix(node, uri) {
                        Some(p) => format!("{p}:{}", attr.name()),
                        None => attr.name().to_string(),
                    },
                    None => attr.name().to_string(),
                };
                (ns, attr.name(), name, attr.value())
            })
            .collect();
        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (_, _, name, value) in &attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for child in node.children() {
            match child.node_type() {
                NodeType::Element => {
                    if Some(child.id()) != self.excluded {
                        self.write_element(child, &scope, out);
                    }
                }
                NodeType::Text => escape_text(child.text().unwrap_or(""), out),
                NodeType::Comment => {
                    if self.with_comments {
                        out.push_str("<!--");
                        out.push_str(child.text().unwrap_or(""));
                        out.push_str("-->");
                    }
                }
                NodeType::PI => {
                    if let Some(pi) = child.pi() {
                        out.push_str("<?");
                        out.push_str(pi.target);
                        if let Some(value) = pi.value {
                            out.push(' ');
                            out.push_str(value);
                        }
                        out.push_str("?>");
                    }
                }
                NodeType::Root => {}
            }
        }

        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}

/// Prefix and qualified name as written in the source document
fn element_qname<'a>(node: Node<'a, '_>) -> (Option<&'a str>, String) {
    let source = node.document().input_text();
    let written = source
        .get(node.range().start..)
        .and_then(|rest| rest.strip_prefix('<'))
        .map(|rest| {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
                .unwrap_or(rest.len());
            &rest[..end]
        });

    let local = node.tag_name().name();
    if let Some(qname) = written {
        match qname.split_once(':') {
            Some((prefix, name)) if name == local => return (Some(prefix), qname.to_string()),
            None if qname == local => return (None, qname.to_string()),
            _ => {}
        }
    }

    // Fall back to any prefix bound to the element namespace
    match node.tag_name().namespace().and_then(|ns| attribute_prefix(node, ns)) {
        Some(prefix) if node.lookup_namespace_uri(None) != node.tag_name().namespace() => {
            (Some(prefix), format!("{prefix}:{local}"))
        }
        _ => (None, local.to_string()),
    }
}

/// A non-default prefix bound to `uri` in the scope of `node`
fn attribute_prefix<'a>(node: Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == XML_NAMESPACE {
        return Some("xml");
    }
    node.namespaces()
        .find(|ns| ns.name().is_some() && ns.uri() == uri)
        .and_then(|ns| ns.name())
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
