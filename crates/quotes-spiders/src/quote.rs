use quotes_crawler::Request;
use serde::{Deserialize, Serialize};

use crate::handler::Handler;

/// One quote block of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

/// What a handler produces from a page, in document order: every quote then
/// the follow-up requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scraped {
    Quote(Quote),
    Follow(Request<Handler>),
}

impl Scraped {
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            Self::Quote(quote) => Some(quote),
            Self::Follow(_) => None,
        }
    }

    pub fn follow(&self) -> Option<&Request<Handler>> {
        match self {
            Self::Quote(_) => None,
            Self::Follow(request) => Some(request),
        }
    }
}
