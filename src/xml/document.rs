use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::core::FatooraError;

/// A node of the ordered XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Character data, already unescaped.
    Text(String),
    Comment(String),
    /// Processing instruction body (`target data`).
    ProcessingInstruction(String),
}

/// An element with its attributes in document order.
///
/// Namespace declarations are kept as ordinary `xmlns`/`xmlns:*` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// In-scope namespace bindings, innermost last. The default namespace uses
/// the empty prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope(Vec<(String, String)>);

impl NamespaceScope {
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.0.push((prefix.into(), uri.into()));
    }

    /// Scope with the namespace declarations of `element` added.
    pub fn enter(&self, element: &XmlElement) -> Self {
        let mut scope = self.clone();
        for (key, value) in &element.attributes {
            if key == "xmlns" {
                scope.declare("", value.as_str());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.declare(prefix, value.as_str());
            }
        }
        scope
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Prefix part of the qualified name, empty when unprefixed.
    pub fn prefix(&self) -> &str {
        self.name.split_once(':').map_or("", |(p, _)| p)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    /// Follow a path of child names, taking the first match at each level.
    pub fn path(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Remove matching child elements, each together with the whitespace-only
    /// text node directly before it. Returns how many elements were removed.
    pub fn remove_children_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&XmlElement) -> bool,
    {
        let mut kept: Vec<XmlNode> = Vec::with_capacity(self.children.len());
        let mut removed = 0;
        for node in std::mem::take(&mut self.children) {
            if let XmlNode::Element(el) = &node {
                if predicate(el) {
                    if matches!(kept.last(), Some(XmlNode::Text(t)) if t.trim().is_empty()) {
                        kept.pop();
                    }
                    removed += 1;
                    continue;
                }
            }
            kept.push(node);
        }
        self.children = kept;
        removed
    }

    /// First descendant (depth-first, self excluded) with the given name,
    /// together with the namespaces in scope at that element's parent.
    pub fn find_descendant(
        &self,
        name: &str,
        scope: &NamespaceScope,
    ) -> Option<(&XmlElement, NamespaceScope)> {
        let inner = scope.enter(self);
        for child in self.elements() {
            if child.name == name {
                return Some((child, inner));
            }
            if let Some(found) = child.find_descendant(name, &inner) {
                return Some(found);
            }
        }
        None
    }
}

/// Parsed XML document: root element plus comments and processing
/// instructions outside it. The XML declaration and DOCTYPE are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    pub epilog: Vec<XmlNode>,
}

fn parse_error(position: u64, detail: impl std::fmt::Display) -> FatooraError {
    FatooraError::Xml(format!("XML parse error at byte {position}: {detail}"))
}

fn utf8(bytes: &[u8], position: u64) -> Result<String, FatooraError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| parse_error(position, e))
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, FatooraError> {
    let mut element = XmlElement::new(utf8(start.name().as_ref(), position)?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(position, e))?;
        let key = utf8(attr.key.as_ref(), position)?;
        // Attribute-value normalization: literal tab/newline become spaces.
        let raw = utf8(&attr.value, position)?.replace(['\t', '\n'], " ");
        let value = unescape(&raw)
            .map_err(|e| parse_error(position, e))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, FatooraError> {
        let normalized;
        let xml = if xml.contains('\r') {
            normalized = xml.replace("\r\n", "\n").replace('\r', "\n");
            normalized.as_str()
        } else {
            xml
        };

        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();

        loop {
            let position = reader.buffer_position() as u64;
            let node = match reader.read_event().map_err(|e| parse_error(position, e))? {
                Event::Start(e) => {
                    stack.push(element_from(&e, position)?);
                    continue;
                }
                Event::Empty(e) => XmlNode::Element(element_from(&e, position)?),
                Event::End(_) => match stack.pop() {
                    Some(el) => XmlNode::Element(el),
                    None => return Err(parse_error(position, "unexpected end tag")),
                },
                Event::Text(t) => {
                    if stack.is_empty() {
                        continue;
                    }
                    XmlNode::Text(
                        t.unescape()
                            .map_err(|e| parse_error(position, e))?
                            .into_owned(),
                    )
                }
                Event::CData(c) => XmlNode::Text(utf8(&c, position)?),
                Event::Comment(c) => XmlNode::Comment(utf8(&c, position)?),
                Event::PI(p) => XmlNode::ProcessingInstruction(utf8(&p, position)?),
                Event::Decl(_) | Event::DocType(_) => continue,
                Event::Eof => break,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match node {
                XmlNode::Element(el) => {
                    if root.is_some() {
                        return Err(parse_error(position, "more than one root element"));
                    }
                    root = Some(el);
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = stack.last() {
            return Err(FatooraError::Xml(format!(
                "XML parse error: element <{}> is not closed",
                open.name
            )));
        }
        let root = root.ok_or_else(|| FatooraError::Xml("XML document has no root element".into()))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }
}

/// Typed view over a UBL invoice with accessors for the fields the hash
/// chain and QR code read.
#[derive(Debug, Clone)]
pub struct UblDocument {
    doc: XmlDocument,
}

const SUPPLIER_PARTY: [&str; 2] = ["cac:AccountingSupplierParty", "cac:Party"];

impl UblDocument {
    pub fn parse(xml: &str) -> Result<Self, FatooraError> {
        let doc = XmlDocument::parse(xml)?;
        let local = doc.root.name.rsplit(':').next().unwrap_or_default();
        if local != "Invoice" {
            return Err(FatooraError::Xml(format!(
                "expected an Invoice root element, found <{}>",
                doc.root.name
            )));
        }
        Ok(Self { doc })
    }

    pub fn document(&self) -> &XmlDocument {
        &self.doc
    }

    pub fn into_document(self) -> XmlDocument {
        self.doc
    }

    fn text_at(&self, path: &[&str]) -> Option<String> {
        let text = self.doc.root.path(path)?.text();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn additional_reference(&self, id: &str) -> Option<&XmlElement> {
        self.doc
            .root
            .children_named("cac:AdditionalDocumentReference")
            .find(|r| r.child("cbc:ID").is_some_and(|i| i.text().trim() == id))
    }

    fn attachment_text(&self, id: &str) -> Option<String> {
        let el = self
            .additional_reference(id)?
            .path(&["cac:Attachment", "cbc:EmbeddedDocumentBinaryObject"])?;
        let text = el.text();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Invoice serial number (`cbc:ID`).
    pub fn serial_number(&self) -> Option<String> {
        self.text_at(&["cbc:ID"])
    }

    /// Device UUID (`cbc:UUID`).
    pub fn uuid(&self) -> Option<String> {
        self.text_at(&["cbc:UUID"])
    }

    pub fn issue_date(&self) -> Option<String> {
        self.text_at(&["cbc:IssueDate"])
    }

    pub fn issue_time(&self) -> Option<String> {
        self.text_at(&["cbc:IssueTime"])
    }

    pub fn invoice_type_code(&self) -> Option<String> {
        self.text_at(&["cbc:InvoiceTypeCode"])
    }

    /// `name` attribute of the type code (0100000 standard, 0200000 simplified).
    pub fn transaction_code(&self) -> Option<&str> {
        self.doc.root.child("cbc:InvoiceTypeCode")?.attribute("name")
    }

    pub fn seller_name(&self) -> Option<String> {
        self.text_at(&[
            SUPPLIER_PARTY[0],
            SUPPLIER_PARTY[1],
            "cac:PartyLegalEntity",
            "cbc:RegistrationName",
        ])
    }

    pub fn seller_vat_number(&self) -> Option<String> {
        self.text_at(&[
            SUPPLIER_PARTY[0],
            SUPPLIER_PARTY[1],
            "cac:PartyTaxScheme",
            "cbc:CompanyID",
        ])
    }

    pub fn tax_inclusive_amount(&self) -> Option<String> {
        self.text_at(&["cac:LegalMonetaryTotal", "cbc:TaxInclusiveAmount"])
    }

    /// VAT total from the first `cac:TaxTotal`.
    pub fn vat_total(&self) -> Option<String> {
        self.text_at(&["cac:TaxTotal", "cbc:TaxAmount"])
    }

    /// Invoice counter value (ICV).
    pub fn counter(&self) -> Option<u64> {
        self.additional_reference("ICV")?
            .child("cbc:UUID")?
            .text()
            .trim()
            .parse()
            .ok()
    }

    /// Previous invoice hash (PIH).
    pub fn previous_invoice_hash(&self) -> Option<String> {
        self.attachment_text("PIH")
    }

    /// Embedded QR payload, if already set.
    pub fn qr(&self) -> Option<String> {
        self.attachment_text("QR")
    }
}
