//! The `toscrape-xpath` spider.

use quotes_scraper::{Page, XPathPage};
use url::Url;

use crate::extract::{scrape_quotes, PagerPolicy, Selectors};
use crate::handler::Handler;
use crate::quote::Scraped;

pub const SELECTORS: Selectors = Selectors {
    quote: r#"//div[@class="quote"]"#,
    text: r#".//span[@class="text"]/text()"#,
    author: r#".//span//small[@class="author"]//text()"#,
    tags: r#".//div[@class="tags"]//a[@class="tag"]//text()"#,
    next_page: r#"//ul[@class="pager"]//a/@href"#,
    pager: PagerPolicy::First,
};

pub fn parse(body: &str, url: Url) -> anyhow::Result<Vec<Scraped>> {
    let page = XPathPage::parse(body, url)?;
    scrape_quotes(&page, &SELECTORS, Handler::XPath)
}
