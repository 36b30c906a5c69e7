//! HTML pages queryable with CSS selectors or XPath.

mod css;
mod page;
mod xpath;

pub use css::{CssNode, CssPage};
pub use page::{Node, Page};
pub use xpath::{XPathNode, XPathPage};
