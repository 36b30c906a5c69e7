use std::fs;

use quotes_crawler::{crawl_site, CrawlerConfig};
use quotes_spiders::{
    FileMode, Handler, OutputFormat, Quote, QuotesConfig, QuotesScraper, RecordSink, WriterConfig,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(quotes: &[(&str, &str)], prev: Option<&str>, next: Option<&str>) -> String {
    let mut body = String::from("<html><body>");
    for (text, author) in quotes {
        body.push_str(&format!(
            r#"<div class="quote"><span class="text">{text}</span>
<span>by <small class="author">{author}</small></span>
<div class="tags"><a class="tag">{author}</a></div></div>"#
        ));
    }
    body.push_str(r#"<ul class="pager">"#);
    if let Some(prev) = prev {
        body.push_str(&format!(r#"<li class="previous"><a href="{prev}">Previous</a></li>"#));
    }
    if let Some(next) = next {
        body.push_str(&format!(r#"<li class="next"><a href="{next}">Next</a></li>"#));
    }
    body.push_str("</ul></body></html>");
    body
}

async fn quotes_site() -> MockServer {
    let server = MockServer::start().await;
    let pages = [
        ("/page/1/", page(&[("One", "A"), ("Two", "B")], None, Some("/page/2/"))),
        (
            "/page/2/",
            page(&[("Three", "C")], Some("/page/1/"), Some("/page/3/")),
        ),
        ("/page/3/", page(&[("Four", "D")], Some("/page/2/"), None)),
    ];
    for (page, body) in pages {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;
    }
    server
}

async fn crawl(handler: Handler, server: &MockServer) -> Vec<Quote> {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("quotes.jsonl");

    let (sink, writer) = RecordSink::spawn(&WriterConfig {
        format: OutputFormat::JsonLines,
        file: Some(out.clone()),
        file_mode: FileMode::Create,
    })
    .unwrap();

    let mut config = QuotesConfig::new(handler, sink);
    config.start_urls = vec![Url::parse(&server.uri()).unwrap().join("/page/1/").unwrap()];

    let crawler_config = CrawlerConfig {
        num_workers: 2,
        handle_sigint: false,
        ..Default::default()
    };
    crawl_site::<QuotesScraper>(&crawler_config, &config)
        .await
        .unwrap();
    drop(config);
    writer.join().unwrap().unwrap();

    let mut quotes = fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<Quote>(line).unwrap())
        .collect::<Vec<_>>();
    quotes.sort_by(|a, b| a.author.cmp(&b.author));
    quotes
}

fn authors(quotes: &[Quote]) -> Vec<&str> {
    quotes
        .iter()
        .filter_map(|q| q.author.as_deref())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn css_spider_crawls_every_page() {
    let server = quotes_site().await;

    let quotes = crawl(Handler::Css, &server).await;

    assert_eq!(authors(&quotes), vec!["A", "B", "C", "D"]);
    assert_eq!(quotes[0].text.as_deref(), Some("One"));
    assert_eq!(quotes[0].tags, vec!["A"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn xpath_spider_stops_at_first_previous_link() {
    let server = quotes_site().await;

    // Page 2 lists "previous" first, which was already crawled
    let quotes = crawl(Handler::XPath, &server).await;

    assert_eq!(authors(&quotes), vec!["A", "B", "C"]);
}
