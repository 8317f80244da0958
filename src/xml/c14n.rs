//! Exclusive XML canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`),
//! without comments.
//!
//! Namespace declarations are emitted only on elements that visibly use them
//! and only when an output ancestor has not already rendered the same binding.

use super::document::{NamespaceScope, XmlDocument, XmlElement, XmlNode};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalize a whole document.
pub fn canonicalize(doc: &XmlDocument) -> String {
    let mut out = String::new();
    for node in &doc.prolog {
        if let XmlNode::ProcessingInstruction(pi) = node {
            out.push_str("<?");
            out.push_str(pi);
            out.push_str("?>\n");
        }
    }
    write_element(
        &doc.root,
        &NamespaceScope::default(),
        &NamespaceScope::default(),
        &mut out,
    );
    for node in &doc.epilog {
        if let XmlNode::ProcessingInstruction(pi) = node {
            out.push_str("\n<?");
            out.push_str(pi);
            out.push_str("?>");
        }
    }
    out
}

/// Canonicalize a subtree given the namespaces in scope at its parent.
pub fn canonicalize_element(element: &XmlElement, in_scope: &NamespaceScope) -> String {
    let mut out = String::new();
    write_element(element, in_scope, &NamespaceScope::default(), &mut out);
    out
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn attribute_prefix(name: &str) -> Option<&str> {
    name.split_once(':').map(|(p, _)| p)
}

fn local_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, l)| l)
}

fn write_element(
    element: &XmlElement,
    in_scope: &NamespaceScope,
    rendered: &NamespaceScope,
    out: &mut String,
) {
    let scope = in_scope.enter(element);

    let mut utilized = vec![element.prefix()];
    for (name, _) in &element.attributes {
        if is_namespace_decl(name) {
            continue;
        }
        if let Some(prefix) = attribute_prefix(name) {
            if prefix != "xml" {
                utilized.push(prefix);
            }
        }
    }
    utilized.sort_unstable();
    utilized.dedup();

    let mut rendered_here = rendered.clone();
    let mut declarations: Vec<(String, &str)> = Vec::new();
    for prefix in utilized {
        let uri = scope.lookup(prefix).unwrap_or("");
        if prefix.is_empty() {
            if rendered.lookup("").unwrap_or("") != uri {
                declarations.push(("xmlns".to_string(), uri));
                rendered_here.declare("", uri);
            }
        } else if !uri.is_empty() && rendered.lookup(prefix) != Some(uri) {
            declarations.push((format!("xmlns:{prefix}"), uri));
            rendered_here.declare(prefix, uri);
        }
    }

    let mut attributes: Vec<(&str, &str, &str, &str)> = element
        .attributes
        .iter()
        .filter(|(name, _)| !is_namespace_decl(name))
        .map(|(name, value)| {
            let ns = match attribute_prefix(name) {
                Some("xml") => XML_NAMESPACE,
                Some(prefix) => scope.lookup(prefix).unwrap_or(""),
                None => "",
            };
            (ns, local_name(name), name.as_str(), value.as_str())
        })
        .collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(b.1)));

    out.push('<');
    out.push_str(&element.name);
    for (name, uri) in &declarations {
        push_attribute(out, name, uri);
    }
    for (_, _, name, value) in &attributes {
        push_attribute(out, name, value);
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_element(el, &scope, &rendered_here, out),
            XmlNode::Text(text) => escape_text_into(text, out),
            XmlNode::ProcessingInstruction(pi) => {
                out.push_str("<?");
                out.push_str(pi);
                out.push_str("?>");
            }
            XmlNode::Comment(_) => {}
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn escape_text_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// Escape character data the way canonical XML renders it.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text_into(text, &mut out);
    out
}
