//! The query contract shared by every selector dialect.

use anyhow::Context;
use url::Url;

/// A query result: an element, a text node or an attribute.
pub trait Node: Sized {
    /// Returns the nodes matching `query`, scoped to this node, in document order.
    fn query(&self, query: &str) -> anyhow::Result<Vec<Self>>;

    /// Returns the outer HTML of an element, the text of a text node or the
    /// value of an attribute.
    fn value(&self) -> String;

    /// Returns the value of the first node matching `query`, if any.
    fn get(&self, query: &str) -> anyhow::Result<Option<String>> {
        Ok(self.query(query)?.first().map(Node::value))
    }

    /// Returns the values of all nodes matching `query`.
    fn get_all(&self, query: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.query(query)?.iter().map(Node::value).collect())
    }
}

/// A parsed HTML document queryable in a single selector dialect.
pub trait Page: Sized {
    type Node<'a>: Node
    where
        Self: 'a;

    fn parse(body: &str, location: Url) -> anyhow::Result<Self>;

    /// The URL the page was fetched from.
    fn location(&self) -> &Url;

    fn root(&self) -> Self::Node<'_>;

    fn query(&self, query: &str) -> anyhow::Result<Vec<Self::Node<'_>>> {
        self.root().query(query)
    }

    /// Resolves `href` against the page location.
    fn resolve(&self, href: &str) -> anyhow::Result<Url> {
        self.location()
            .join(href.trim())
            .with_context(|| format!("Couldn't resolve {href:?} against {}", self.location()))
    }
}
