use std::io::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Error, Result};
use flate2::read::GzDecoder;
use futures::stream::LocalBoxStream;
use futures::{future, join, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use crate::config::{CrawlerConfig, OnError, Throttle};
use crate::limiter::{RateLimitedExt, RateLimiter};
use crate::robots::Robots;
use crate::scrapable::{Request, Scheduler, Scrapable, ScrapingContext};

const DONE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct Page<H> {
    body: String,
    url: Url,
    handler: H,
}

fn http_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::ClientBuilder::new()
        .user_agent(config.user_agent.as_str())
        .gzip(true)
        .deflate(true)
        .timeout(Duration::from_secs(config.download_timeout))
        .build()?;
    Ok(client)
}

async fn download<H>(client: &reqwest::Client, request: Request<H>) -> Result<Page<H>> {
    let Request { url, handler } = request;

    let resp = client
        .get(url.clone())
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("Couldn't download {url}"))?;

    let url = resp.url().clone();
    let body = match resp.headers().get(CONTENT_TYPE) {
        Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
            let compressed = resp.bytes().await?;
            let mut gz = GzDecoder::new(&compressed[..]);
            let mut body = String::new();
            gz.read_to_string(&mut body)
                .with_context(|| format!("Couldn't decompress {url}"))?;
            body
        }
        _ => resp.text().await?,
    };

    Ok(Page { body, url, handler })
}

/// Downloads `request` unless robots.txt disallows it, in which case `None` is returned.
async fn fetch<H>(
    client: &reqwest::Client,
    robots: Option<&Robots>,
    request: Request<H>,
) -> Result<Option<Page<H>>> {
    if let Some(robots) = robots {
        if !robots.allowed(client, &request.url).await {
            log::info!("Forbidden by robots.txt: {}", request.url);
            return Ok(None);
        }
    }
    download(client, request).await.map(Some)
}

pub async fn crawl_site<T>(
    crawler_conf: &CrawlerConfig,
    scraper_conf: &T::Config,
) -> anyhow::Result<()>
where
    T: Scrapable,
{
    crawler_conf.validate()?;

    let client = http_client(crawler_conf)?;
    let robots = crawler_conf
        .obey_robots
        .then(|| Robots::new(&crawler_conf.user_agent));

    let pages_in = Arc::new(AtomicUsize::new(0));
    let pages_out = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();
    let (tx_request, rx_request) = mpsc::unbounded_channel::<Request<T::Handler>>();
    let (tx_page, rx_page) =
        crossbeam_channel::bounded::<Page<T::Handler>>(crawler_conf.page_buffer);

    let scheduler = Scheduler::new(
        tx_request,
        pages_in.clone(),
        crawler_conf.dedup,
        crawler_conf.page_limit,
    );

    // Workers

    let mut workers = vec![];
    for id in 0..crawler_conf.num_workers {
        let rx_stop = rx_stop.clone();
        let rx_page = rx_page.clone();
        let scheduler = scheduler.clone();
        let pages_out = pages_out.clone();
        let scraper_conf = scraper_conf.clone();
        let on_scrap_error = crawler_conf.on_scrap_error;
        let stop = stop.clone();
        let worker = thread::Builder::new()
            .name(format!("{id}"))
            .spawn(move || {
                let mut scraper = <T as Scrapable>::new(&scraper_conf)?;
                loop {
                    crossbeam_channel::select! {
                        recv(rx_page) -> page => {
                            if let Ok(Page { body, url, handler }) = page {
                                let ctx = ScrapingContext::new(url.clone(), handler, scheduler.clone());
                                match scraper.scrap(body, ctx) {
                                    Ok(()) => (),
                                    Err(e) => match on_scrap_error {
                                        OnError::SkipAndLog => {
                                            log::error!("Skipping scrap for page {url} got: {e}");
                                        }
                                        OnError::Fail => {
                                            stop.store(true, Ordering::SeqCst);
                                            return Err(e.context(format!("Couldn't scrap {url}")));
                                        }
                                    },
                                }
                                pages_out.fetch_add(1, Ordering::SeqCst);
                            } else {
                                break
                            }
                        },
                        recv(rx_stop) -> _ => break
                    }
                }
                Ok::<(), Error>(())
            })?;
        workers.push(worker);
    }
    drop(rx_page);

    let workers = async move {
        tokio::task::spawn_blocking(|| {
            for w in workers {
                w.join()
                    .map_err(|_| anyhow!("Scraping worker panicked"))??;
            }
            Ok::<(), Error>(())
        })
        .await?
    };

    // Seed

    let seed = <T as Scrapable>::new(scraper_conf)?.seed();
    for request in seed {
        scheduler.schedule(request);
    }
    drop(scheduler);

    // Downloader

    let stop_c = stop.clone();
    let pages_in_c = pages_in.clone();
    let downloader = async {
        let client = &client;
        let robots = robots.as_ref();

        let downloads = UnboundedReceiverStream::new(rx_request)
            .take_while(move |_| future::ready(!stop_c.load(Ordering::SeqCst)))
            .map(move |request| {
                let pages_in = pages_in_c.clone();
                async move {
                    let page = fetch(client, robots, request).await;
                    if !matches!(page, Ok(Some(_))) {
                        pages_in.fetch_sub(1, Ordering::SeqCst);
                    }
                    page
                }
            });

        let mut downloads: LocalBoxStream<'_, Result<Option<Page<T::Handler>>>> =
            match crawler_conf.throttle {
                None => downloads
                    .buffer_unordered(crawler_conf.concurrent_downloads)
                    .boxed_local(),
                Some(Throttle::Concurrent(n)) => downloads.buffer_unordered(n.get()).boxed_local(),
                Some(Throttle::PerSecond(n)) => downloads
                    .rate_limited(RateLimiter::new(n.get()))
                    .boxed_local(),
                Some(Throttle::Delay(secs)) => {
                    let delay = Duration::from_secs_f32(secs);
                    downloads
                        .then(move |dl| async move {
                            tokio::time::sleep(delay).await;
                            dl.await
                        })
                        .boxed_local()
                }
            };

        while let Some(dl) = downloads.next().await {
            match dl {
                Ok(Some(page)) => {
                    if tx_page.send(page).is_err() {
                        break;
                    }
                }
                Ok(None) => (),
                Err(e) => match crawler_conf.on_dl_error {
                    OnError::SkipAndLog => log::warn!("Skipping URL: {e:#}"),
                    OnError::Fail => {
                        stop.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                },
            }
        }

        Ok::<(), Error>(())
    };

    // Completion

    let done = async {
        let stop_workers = || {
            for _ in 0..crawler_conf.num_workers {
                tx_stop.send(()).ok();
            }
        };
        loop {
            let interrupted = if crawler_conf.handle_sigint {
                timeout(DONE_POLL_INTERVAL, tokio::signal::ctrl_c())
                    .await
                    .is_ok()
            } else {
                tokio::time::sleep(DONE_POLL_INTERVAL).await;
                false
            };

            if interrupted {
                stop.store(true, Ordering::SeqCst);
                stop_workers();
                return Err::<(), _>(anyhow!("Interrupted"));
            }

            if stop.load(Ordering::SeqCst)
                || pages_out.load(Ordering::SeqCst) == pages_in.load(Ordering::SeqCst)
            {
                stop.store(true, Ordering::SeqCst);
                stop_workers();
                return Ok(());
            }
        }
    };

    // Run all tasks

    let (workers, downloader, done) = join!(workers, downloader, done);
    log::info!(
        "Crawl finished, {} pages scraped",
        pages_out.load(Ordering::SeqCst)
    );
    <T as Scrapable>::new(scraper_conf)?.finalizer();

    done.and(workers).and(downloader)
}
