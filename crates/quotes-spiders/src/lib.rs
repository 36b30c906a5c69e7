//! Spiders extracting quotes from <http://quotes.toscrape.com>.
//!
//! Two handlers do the same job in different selector dialects:
//! [`Handler::Css`] follows every pagination link of a page while
//! [`Handler::XPath`] only follows the first one.

pub mod css;
mod extract;
mod handler;
mod quote;
mod scraper;
pub mod writer;
pub mod xpath;

pub use extract::{scrape_quotes, PagerPolicy, Selectors};
pub use handler::{Handler, START_URL};
pub use quote::{Quote, Scraped};
pub use scraper::{QuotesConfig, QuotesScraper};
pub use writer::{FileMode, OutputFormat, RecordSink, WriterConfig};

pub use anyhow;
