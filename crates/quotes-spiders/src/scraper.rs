use quotes_crawler::{Request, Scrapable, ScrapingContext};
use url::Url;

use crate::handler::Handler;
use crate::quote::Scraped;
use crate::writer::RecordSink;

#[derive(Debug, Clone)]
pub struct QuotesConfig {
    pub handler: Handler,
    /// Overrides the handler's own start URLs when not empty
    pub start_urls: Vec<Url>,
    pub sink: RecordSink,
}

impl QuotesConfig {
    pub fn new(handler: Handler, sink: RecordSink) -> Self {
        Self {
            handler,
            start_urls: vec![],
            sink,
        }
    }
}

/// Runs the quote handlers inside a crawl, quotes go to the record sink and
/// follow-up requests back to the crawler.
pub struct QuotesScraper {
    config: QuotesConfig,
}

impl Scrapable for QuotesScraper {
    type Config = QuotesConfig;
    type Handler = Handler;

    fn new(config: &QuotesConfig) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
        })
    }

    fn seed(&self) -> Vec<Request<Handler>> {
        let urls = if self.config.start_urls.is_empty() {
            self.config.handler.start_urls()
        } else {
            self.config.start_urls.clone()
        };
        urls.into_iter()
            .map(|url| Request::new(url, self.config.handler))
            .collect()
    }

    fn scrap(&mut self, page: String, ctx: ScrapingContext<Handler>) -> anyhow::Result<()> {
        let scraped = ctx.handler().parse(&page, ctx.url().clone())?;
        for item in scraped {
            match item {
                Scraped::Quote(quote) => self.config.sink.send(quote),
                Scraped::Follow(request) => {
                    ctx.send_request(request);
                }
            }
        }
        Ok(())
    }

    fn finalizer(&mut self) {
        self.config.sink.flush();
        log::info!(
            "{}: {} quotes written",
            self.config.handler,
            self.config.sink.written()
        );
    }
}
