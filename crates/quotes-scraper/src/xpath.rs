//! XPath 1.0 queries over an HTML tree.
//!
//! HTML is parsed with html5ever then copied into an `sxd_document` package,
//! element and attribute names lose their namespaces so that `//div` matches
//! HTML elements directly.

use anyhow::anyhow;
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use sxd_document::{dom, Package};
use sxd_xpath::{nodeset, Context, Factory, Value};
use url::Url;

use crate::page::{Node, Page};

lazy_static! {
    static ref XP_FACTORY: Factory = Factory::new();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XPathNode<'d>(nodeset::Node<'d>);

impl<'d> Node for XPathNode<'d> {
    fn query(&self, query: &str) -> anyhow::Result<Vec<Self>> {
        let xpath = XP_FACTORY
            .build(query)
            .map_err(|e| anyhow!("Invalid XPath {query:?} got: {e}"))?
            .ok_or_else(|| anyhow!("Missing XPath"))?;

        let context = Context::new();
        let value = xpath
            .evaluate(&context, self.0)
            .map_err(|e| anyhow!("Couldn't evaluate XPath {query:?} got: {e}"))?;

        match value {
            Value::Nodeset(nodes) => Ok(nodes.document_order().into_iter().map(XPathNode).collect()),
            other => Err(anyhow!(
                "XPath {query:?} doesn't select nodes, got: {other:?}"
            )),
        }
    }

    fn value(&self) -> String {
        let mut html = String::new();
        match self.0 {
            nodeset::Node::Root(root) => {
                for child in root.children() {
                    if let dom::ChildOfRoot::Element(element) = child {
                        write_element(&mut html, element);
                    }
                }
            }
            nodeset::Node::Element(element) => write_element(&mut html, element),
            other => return other.string_value(),
        }
        html
    }
}

const VOID_ELEMENTS: [&str; 18] = [
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: [&str; 8] = [
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Serializes `element` the way html5ever does.
fn write_element(html: &mut String, element: dom::Element<'_>) {
    let name = element.name().local_part();
    html.push('<');
    html.push_str(name);
    for attr in element.attributes() {
        html.push(' ');
        html.push_str(attr.name().local_part());
        html.push_str("=\"");
        escape(html, attr.value(), true);
        html.push('"');
    }
    html.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    for child in element.children() {
        match child {
            dom::ChildOfElement::Element(child) => write_element(html, child),
            dom::ChildOfElement::Text(text) if RAW_TEXT_ELEMENTS.contains(&name) => {
                html.push_str(text.text())
            }
            dom::ChildOfElement::Text(text) => escape(html, text.text(), false),
            _ => (),
        }
    }

    html.push_str("</");
    html.push_str(name);
    html.push('>');
}

fn escape(html: &mut String, text: &str, attr_mode: bool) {
    for c in text.chars() {
        match c {
            '&' => html.push_str("&amp;"),
            '\u{00A0}' => html.push_str("&nbsp;"),
            '"' if attr_mode => html.push_str("&quot;"),
            '<' if !attr_mode => html.push_str("&lt;"),
            '>' if !attr_mode => html.push_str("&gt;"),
            c => html.push(c),
        }
    }
}

pub struct XPathPage {
    package: Package,
    location: Url,
}

impl Page for XPathPage {
    type Node<'a> = XPathNode<'a>;

    fn parse(body: &str, location: Url) -> anyhow::Result<Self> {
        let rcdom = html5ever::parse_document(RcDom::default(), Default::default()).one(body);

        let package = Package::new();
        {
            let document = package.as_document();
            for child in rcdom.document.children.borrow().iter() {
                if let Some(element) = copy_element(&document, child) {
                    document.root().append_child(element);
                }
            }
        }

        Ok(Self { package, location })
    }

    fn location(&self) -> &Url {
        &self.location
    }

    fn root(&self) -> XPathNode<'_> {
        XPathNode(self.package.as_document().root().into())
    }
}

fn copy_element<'d>(document: &dom::Document<'d>, handle: &Handle) -> Option<dom::Element<'d>> {
    let NodeData::Element {
        ref name,
        ref attrs,
        ..
    } = handle.data
    else {
        return None;
    };

    let element = document.create_element(&*name.local);
    for attr in attrs.borrow().iter() {
        element.set_attribute_value(&*attr.name.local, &attr.value);
    }

    for child in handle.children.borrow().iter() {
        match child.data {
            NodeData::Element { .. } => {
                if let Some(child) = copy_element(document, child) {
                    element.append_child(child);
                }
            }
            NodeData::Text { ref contents } => {
                let text = contents.borrow();
                element.append_child(document.create_text(&text));
            }
            _ => (),
        }
    }

    Some(element)
}
