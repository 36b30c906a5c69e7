use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use quotes_crawler::{crawl_site, CrawlerConfig, OnError};
use quotes_spiders::{
    FileMode, Handler, OutputFormat, QuotesConfig, QuotesScraper, RecordSink, Scraped,
    WriterConfig,
};
use tokio::runtime;
use url::Url;

/// Quotes to Scrape spiders
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    Crawl(CrawlArgs),
    Scrap(ScrapArgs),
    List,
    #[command(hide = true)]
    Completion,
}

/// Crawl quotes.toscrape.com and write every quote found
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Spider to run, see `quotes list`
    #[arg(long, short)]
    pub spider: Handler,
    /// Output file, stdout when missing
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Output records format
    #[arg(value_enum, long, default_value_t = OutputFormat::JsonLines)]
    pub format: OutputFormat,
    /// How to open the output file
    #[arg(value_enum, long, default_value_t = FileMode::Create)]
    pub file_mode: FileMode,
    /// Optional default crawler yaml configuration file
    #[arg(env = "QUOTES_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override the spider's start URLs
    #[arg(long)]
    pub start_url: Vec<Url>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's page buffer size
    #[arg(long)]
    pub page_buffer: Option<usize>,
    /// Override crawler's maximum concurrent page downloads
    #[arg(long)]
    pub concurrent_downloads: Option<usize>,
    /// Override crawler's number of CPU workers used to parse pages
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Stop scheduling pages once this many were queued
    #[arg(long)]
    pub page_limit: Option<usize>,
    /// Download pages again even if already seen
    #[arg(long)]
    pub no_dedup: bool,
    /// Skip pages disallowed by robots.txt
    #[arg(long)]
    pub obey_robots: bool,
    /// No SIGINT handling, the crawl can only be killed
    #[arg(long)]
    pub no_sigint: bool,
    /// Override crawler's download error handling strategy
    #[arg(value_enum, long)]
    pub on_dl_error: Option<OnError>,
    /// Override crawler's scrap error handling strategy
    #[arg(value_enum, long)]
    pub on_scrap_error: Option<OnError>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(path) = &args.crawler_config {
            let file = File::open(path)
                .with_context(|| format!("Couldn't open crawler config {}", path.display()))?;
            serde_yaml::from_reader(file)
                .with_context(|| format!("Invalid crawler config {}", path.display()))?
        } else {
            CrawlerConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(page_buffer) = args.page_buffer {
            conf.page_buffer = page_buffer;
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            conf.concurrent_downloads = concurrent_downloads;
        }
        if let Some(num_workers) = args.num_workers {
            conf.num_workers = num_workers;
        }
        if args.page_limit.is_some() {
            conf.page_limit = args.page_limit;
        }
        if args.no_dedup {
            conf.dedup = false;
        }
        if args.obey_robots {
            conf.obey_robots = true;
        }
        if let Some(on_dl_error) = args.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
        if let Some(on_scrap_error) = args.on_scrap_error {
            conf.on_scrap_error = on_scrap_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

impl From<&CrawlArgs> for WriterConfig {
    fn from(args: &CrawlArgs) -> Self {
        Self {
            format: args.format,
            file: args.output.clone(),
            file_mode: args.file_mode,
        }
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf = (&args).try_into()?;
    let (sink, writer) = RecordSink::spawn(&(&args).into())?;

    let mut scraper_conf = QuotesConfig::new(args.spider, sink);
    scraper_conf.start_urls = args.start_url;

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let res = rt.block_on(crawl_site::<QuotesScraper>(&crawler_conf, &scraper_conf));

    // Closes the last sink so the writer thread can exit
    drop(scraper_conf);
    let written = writer
        .join()
        .map_err(|_| anyhow::anyhow!("Record writer thread panicked"))??;
    log::info!("{written} quotes written by {}", args.spider);

    res
}

/// Scrap a single page and print its quotes and follow-ups to stdout
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// Spider to scrap the page with, see `quotes list`
    #[arg(long, short)]
    pub spider: Handler,
    /// A local html page to scrap
    #[arg(group = "page", long, requires = "base_url")]
    pub file: Option<PathBuf>,
    /// URL the local page is resolved against
    #[arg(long, requires = "file")]
    pub base_url: Option<Url>,
    /// A distant html page to scrap
    #[arg(group = "page", long)]
    pub url: Option<Url>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let (page, location) = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let resp = client
            .get(url.clone())
            .send()
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("Couldn't download {url}"))?;
        let location = resp.url().clone();
        (resp.text()?, location)
    } else if let (Some(path), Some(base_url)) = (args.file, args.base_url) {
        let page = fs::read_to_string(&path)
            .with_context(|| format!("Couldn't read {}", path.display()))?;
        (page, base_url)
    } else {
        anyhow::bail!("Missing `url` or `file` with `base-url`");
    };

    let scraped = args.spider.parse(&page, location)?;
    let mut out = io::stdout().lock();
    write_scraped(&mut out, &scraped)?;
    out.flush()?;
    Ok(())
}

fn write_scraped<W: Write>(out: &mut W, scraped: &[Scraped]) -> anyhow::Result<()> {
    for item in scraped {
        let line = match item {
            Scraped::Quote(quote) => serde_json::to_string(quote)?,
            Scraped::Follow(req) => serde_json::json!({
                "follow": req.url.as_str(),
                "spider": req.handler.name(),
            })
            .to_string(),
        };
        writeln!(out, "{line}")?;
    }
    Ok(())
}

pub fn list() {
    for handler in Handler::ALL {
        let seeds = handler
            .start_urls()
            .iter()
            .map(Url::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        println!("{handler}\t{seeds}");
    }
}

fn init_logger(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logger("quotes=info,quotes_spiders=info,quotes_crawler=warn");
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            init_logger("quotes_spiders=warn");
            scrap(args)
        }
        SubCommand::List => {
            list();
            Ok(())
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "quotes", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use quotes_crawler::{Request, Throttle};
    use quotes_spiders::Quote;

    fn parse(cmd: &[&str]) -> SubCommand {
        Args::try_parse_from(std::iter::once("quotes").chain(cmd.iter().copied()))
            .unwrap()
            .cmd
    }

    fn crawl_args(cmd: &[&str]) -> CrawlArgs {
        let mut full = vec!["crawl", "--spider", "toscrape-css"];
        full.extend_from_slice(cmd);
        match parse(&full) {
            SubCommand::Crawl(args) => args,
            other => panic!("Expected crawl, got {other:?}"),
        }
    }

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn crawl_flags_override_defaults() {
        let args = crawl_args(&[
            "--user-agent",
            "tester",
            "--num-workers",
            "3",
            "--page-limit",
            "5",
            "--no-dedup",
            "--obey-robots",
            "--no-sigint",
            "--on-dl-error",
            "fail",
        ]);
        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(conf.user_agent, "tester");
        assert_eq!(conf.num_workers, 3);
        assert_eq!(conf.page_limit, Some(5));
        assert!(!conf.dedup);
        assert!(conf.obey_robots);
        assert!(!conf.handle_sigint);
        assert_eq!(conf.on_dl_error, OnError::Fail);
        assert_eq!(conf.on_scrap_error, OnError::SkipAndLog);
    }

    #[test]
    fn crawl_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "userAgent: from-file\npageBuffer: 12\nnumWorkers: 4").unwrap();
        let path = file.path().to_str().unwrap();

        let args = crawl_args(&["--crawler-config", path, "--num-workers", "1"]);
        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(conf.user_agent, "from-file");
        assert_eq!(conf.page_buffer, 12);
        assert_eq!(conf.num_workers, 1);
    }

    #[test]
    fn crawl_config_file_sets_throttle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "throttle:\n  PerSecond: 2\nonDlError: Fail").unwrap();
        let path = file.path().to_str().unwrap();

        let args = crawl_args(&["--crawler-config", path]);
        let conf = CrawlerConfig::try_from(&args).unwrap();

        assert_eq!(
            conf.throttle,
            Some(Throttle::PerSecond(NonZeroUsize::new(2).unwrap()))
        );
        assert_eq!(conf.on_dl_error, OnError::Fail);
        assert!(conf.handle_sigint);
    }

    #[test]
    fn crawl_writer_config() {
        let args = crawl_args(&["--output", "out.csv", "--format", "csv", "--file-mode", "append"]);
        let conf = WriterConfig::from(&args);

        assert_eq!(conf.format, OutputFormat::Csv);
        assert_eq!(conf.file, Some(PathBuf::from("out.csv")));
        assert_eq!(conf.file_mode, FileMode::Append);
    }

    #[test]
    fn unknown_spider_is_rejected() {
        let res = Args::try_parse_from(["quotes", "crawl", "--spider", "toscrape-json"]);
        assert!(res.is_err());
    }

    #[test]
    fn scrap_file_needs_base_url() {
        let res = Args::try_parse_from([
            "quotes",
            "scrap",
            "--spider",
            "toscrape-xpath",
            "--file",
            "page.html",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn scraped_items_as_json_lines() {
        let url = Url::parse("http://quotes.toscrape.com/page/2/").unwrap();
        let scraped = vec![
            Scraped::Quote(Quote {
                text: Some("Life is...".into()),
                author: Some("Einstein".into()),
                tags: vec!["life".into()],
            }),
            Scraped::Follow(Request::new(url, Handler::XPath)),
        ];

        let mut out = vec![];
        write_scraped(&mut out, &scraped).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"text\":\"Life is...\",\"author\":\"Einstein\",\"tags\":[\"life\"]}\n\
             {\"follow\":\"http://quotes.toscrape.com/page/2/\",\"spider\":\"toscrape-xpath\"}\n"
        );
    }
}
