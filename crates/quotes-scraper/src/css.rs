//! CSS selector queries over an HTML tree.
//!
//! A query is a selector group optionally followed by a `::text` or
//! `::attr(name)` pseudo-element, which selects the direct text children or
//! the named attribute of the matched elements instead of the elements.

use anyhow::anyhow;
use sws_scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::page::{Node, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pick {
    Element,
    Text,
    Attr(String),
}

struct CssQuery {
    selector: Selector,
    pick: Pick,
}

impl CssQuery {
    fn parse(query: &str) -> anyhow::Result<Self> {
        let query = query.trim();
        let (css, pick) = if let Some(css) = query.strip_suffix("::text") {
            (css, Pick::Text)
        } else if let Some((css, attr)) = query
            .strip_suffix(')')
            .and_then(|q| q.rsplit_once("::attr("))
        {
            (css, Pick::Attr(attr.trim().to_string()))
        } else {
            (query, Pick::Element)
        };

        let selector = Selector::parse(css)
            .map_err(|e| anyhow!("Invalid CSS selector {css:?} got: {e:?}"))?;

        Ok(Self { selector, pick })
    }

    fn apply(&self, element: ElementRef) -> Vec<CssNode> {
        match &self.pick {
            Pick::Element => vec![CssNode::Element(element)],
            Pick::Text => element
                .children()
                .filter_map(|child| {
                    child
                        .map_value(|v| match v {
                            sws_scraper::Node::Text(text) => Some(text.to_string()),
                            _ => None,
                        })
                        .flatten()
                })
                .map(CssNode::Text)
                .collect(),
            Pick::Attr(name) => element
                .map_value(|e| e.attr(name).map(String::from))
                .flatten()
                .map(CssNode::Attr)
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CssNode {
    Element(ElementRef),
    Text(String),
    Attr(String),
}

impl Node for CssNode {
    fn query(&self, query: &str) -> anyhow::Result<Vec<Self>> {
        let query = CssQuery::parse(query)?;
        match self {
            Self::Element(element) => Ok(element
                .select(query.selector.clone())
                .flat_map(|matched| query.apply(matched))
                .collect()),
            Self::Text(_) | Self::Attr(_) => Ok(vec![]),
        }
    }

    fn value(&self) -> String {
        match self {
            Self::Element(element) => element.html(),
            Self::Text(value) | Self::Attr(value) => value.clone(),
        }
    }
}

pub struct CssPage {
    html: Html,
    location: Url,
}

impl Page for CssPage {
    type Node<'a> = CssNode;

    fn parse(body: &str, location: Url) -> anyhow::Result<Self> {
        Ok(Self {
            html: Html::parse_document(body),
            location,
        })
    }

    fn location(&self) -> &Url {
        &self.location
    }

    fn root(&self) -> CssNode {
        CssNode::Element(self.html.root_element())
    }
}
