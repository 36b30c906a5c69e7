use quotes_crawler::Request;
use quotes_scraper::{Node, Page};

use crate::handler::Handler;
use crate::quote::{Quote, Scraped};

/// How many pagination links a handler follows per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerPolicy {
    /// Every link matching the pager query.
    All,
    /// The first matching link only, if any.
    First,
}

/// Queries locating quotes and pagination in one selector dialect.
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub quote: &'static str,
    /// Scoped to a quote block.
    pub text: &'static str,
    /// Scoped to a quote block.
    pub author: &'static str,
    /// Scoped to a quote block.
    pub tags: &'static str,
    pub next_page: &'static str,
    pub pager: PagerPolicy,
}

pub fn scrape_quotes<P: Page>(
    page: &P,
    selectors: &Selectors,
    handler: Handler,
) -> anyhow::Result<Vec<Scraped>> {
    let mut scraped = vec![];

    for quote in page.query(selectors.quote)? {
        scraped.push(Scraped::Quote(Quote {
            text: quote.get(selectors.text)?,
            author: quote.get(selectors.author)?,
            tags: quote.get_all(selectors.tags)?,
        }));
    }

    let root = page.root();
    let hrefs = match selectors.pager {
        PagerPolicy::All => root.get_all(selectors.next_page)?,
        PagerPolicy::First => root.get(selectors.next_page)?.into_iter().collect(),
    };

    for href in hrefs {
        match page.resolve(&href) {
            Ok(url) => scraped.push(Scraped::Follow(Request::new(url, handler))),
            Err(e) => log::warn!("Skipping pagination link: {e:#}"),
        }
    }

    Ok(scraped)
}
