mod config;
mod crawler;
mod limiter;
mod robots;
mod scrapable;

pub use config::{CrawlerConfig, OnError, Throttle};
pub use crawler::crawl_site;
pub use scrapable::{Request, Scheduler, Scrapable, ScrapingContext};

pub use anyhow;
pub use url::Url;
