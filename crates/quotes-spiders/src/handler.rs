use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::extract::Selectors;
use crate::quote::Scraped;
use crate::{css, xpath};

pub const START_URL: &str = "http://quotes.toscrape.com/page/1/";

/// The page handlers a crawl can dispatch fetched pages to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    Css,
    XPath,
}

impl Handler {
    pub const ALL: [Handler; 2] = [Handler::Css, Handler::XPath];

    pub fn name(self) -> &'static str {
        match self {
            Self::Css => "toscrape-css",
            Self::XPath => "toscrape-xpath",
        }
    }

    pub fn start_urls(self) -> Vec<Url> {
        // Both spiders share the seed
        match Url::parse(START_URL) {
            Ok(url) => vec![url],
            Err(e) => {
                log::error!("Invalid start URL {START_URL}: {e}");
                vec![]
            }
        }
    }

    pub fn selectors(self) -> &'static Selectors {
        match self {
            Self::Css => &css::SELECTORS,
            Self::XPath => &xpath::SELECTORS,
        }
    }

    /// Parses `body` fetched from `url` and extracts its quotes and follow-ups.
    pub fn parse(self, body: &str, url: Url) -> anyhow::Result<Vec<Scraped>> {
        match self {
            Self::Css => css::parse(body, url),
            Self::XPath => xpath::parse(body, url),
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Handler {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|handler| handler.name() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown spider {s:?}, expected one of: {}",
                    Self::ALL.map(Handler::name).join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PagerPolicy;

    #[test]
    fn handler_names_round_trip() {
        for handler in Handler::ALL {
            assert_eq!(handler.name().parse::<Handler>().unwrap(), handler);
        }
        assert!("toscrape-json".parse::<Handler>().is_err());
    }

    #[test]
    fn spiders_share_the_seed() {
        assert_eq!(Handler::Css.start_urls(), Handler::XPath.start_urls());
        assert_eq!(Handler::Css.start_urls()[0].as_str(), START_URL);
    }

    #[test]
    fn pager_policies_differ() {
        assert_eq!(Handler::Css.selectors().pager, PagerPolicy::All);
        assert_eq!(Handler::XPath.selectors().pager, PagerPolicy::First);
    }
}
