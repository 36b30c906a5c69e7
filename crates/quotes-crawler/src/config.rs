use std::cmp;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_page_buffer")]
    pub page_buffer: usize,

    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    #[serde(default = "default_throttle")]
    pub throttle: Option<Throttle>,

    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default = "default_dedup")]
    pub dedup: bool,

    #[serde(default)]
    pub page_limit: Option<usize>,

    #[serde(default)]
    pub obey_robots: bool,

    #[serde(default = "default_on_dl_error")]
    pub on_dl_error: OnError,

    #[serde(default = "default_on_scrap_error")]
    pub on_scrap_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            page_buffer: default_page_buffer(),
            concurrent_downloads: default_concurrent_downloads(),
            throttle: default_throttle(),
            download_timeout: default_download_timeout(),
            num_workers: default_num_workers(),
            dedup: default_dedup(),
            page_limit: None,
            obey_robots: false,
            on_dl_error: default_on_dl_error(),
            on_scrap_error: default_on_scrap_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl CrawlerConfig {
    /// Rejects settings the crawler cannot make progress with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_workers == 0 {
            anyhow::bail!("Invalid crawler config, `numWorkers` must be at least 1");
        }
        if self.concurrent_downloads == 0 {
            anyhow::bail!("Invalid crawler config, `concurrentDownloads` must be at least 1");
        }
        if let Some(Throttle::Delay(secs)) = self.throttle {
            if !secs.is_finite() || secs < 0. {
                anyhow::bail!("Invalid crawler config, throttle delay must be positive: {secs}");
            }
        }
        Ok(())
    }
}

fn default_user_agent() -> String {
    String::from("quotesbot")
}

fn default_page_buffer() -> usize {
    10_000
}

fn default_concurrent_downloads() -> usize {
    100
}

fn default_throttle() -> Option<Throttle> {
    None
}

fn default_download_timeout() -> u64 {
    180
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_dedup() -> bool {
    true
}

fn default_on_dl_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_scrap_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent(NonZeroUsize),
    /// The number of requests per second
    PerSecond(NonZeroUsize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Concurrent(NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_uses_defaults() {
        let conf: CrawlerConfig = serde_yaml::from_str(
            r#"
userAgent: test-agent
pageLimit: 3
throttle:
  PerSecond: 2
"#,
        )
        .unwrap();

        assert_eq!(conf.user_agent, "test-agent");
        assert_eq!(conf.page_limit, Some(3));
        assert_eq!(
            conf.throttle,
            Some(Throttle::PerSecond(NonZeroUsize::new(2).unwrap()))
        );
        assert_eq!(conf.page_buffer, 10_000);
        assert_eq!(conf.concurrent_downloads, 100);
        assert!(conf.dedup);
        assert!(!conf.obey_robots);
        assert!(conf.handle_sigint);
        assert_eq!(conf.on_dl_error, OnError::SkipAndLog);
        assert!(conf.num_workers >= 1);
    }

    #[test]
    fn empty_yaml_is_default() {
        let conf: CrawlerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(conf.user_agent, CrawlerConfig::default().user_agent);
        assert_eq!(conf.page_limit, None);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let conf = CrawlerConfig {
            num_workers: 0,
            ..Default::default()
        };
        assert!(conf.validate().is_err());

        let conf = CrawlerConfig {
            throttle: Some(Throttle::Delay(-1.)),
            ..Default::default()
        };
        assert!(conf.validate().is_err());
    }
}
