//! The `toscrape-css` spider.

use quotes_scraper::{CssPage, Page};
use url::Url;

use crate::extract::{scrape_quotes, PagerPolicy, Selectors};
use crate::handler::Handler;
use crate::quote::Scraped;

pub const SELECTORS: Selectors = Selectors {
    quote: "div.quote",
    text: "span.text::text",
    author: "span small::text",
    tags: "div.tags a.tag::text",
    next_page: "ul.pager a::attr(href)",
    pager: PagerPolicy::All,
};

pub fn parse(body: &str, url: Url) -> anyhow::Result<Vec<Scraped>> {
    let page = CssPage::parse(body, url)?;
    scrape_quotes(&page, &SELECTORS, Handler::Css)
}
