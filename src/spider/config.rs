use crate::spider::error::CrawlError;
use std::fs;
use std::path::Path;

/// Default configuration constants
pub mod defaults {
    /// Default delay between successive requests within one site, in milliseconds
    pub const CRAWL_DELAY_MS: u64 = 1000;

    /// Default maximum number of sites crawled in parallel
    pub const MAX_CONCURRENT_SITES: usize = 10;

    /// Default maximum BFS depth from the seed sites
    pub const DEPTH_LIMIT: usize = 10;

    /// Default per-site page budget (-1 means unlimited)
    pub const PAGE_LIMIT: i64 = 10;

    /// Default per-site cap on linked sites promoted to the frontier
    pub const LINKED_SITES_LIMIT: usize = 10;

    /// Default HTTP port
    pub const PORT: u16 = 80;

    /// Socket timeout applied to connect, send, and each read, in seconds
    pub const SOCKET_TIMEOUT_SECS: u64 = 10;

    /// Default hostname suffixes accepted by the link extractor
    pub const ALLOWED_TLD_SUFFIXES: &[&str] = &[
        ".com", ".net", ".org", ".edu", ".gov", ".io", ".info", ".biz", ".us", ".uk", ".ca",
        ".de", ".fr", ".nl", ".it", ".es", ".jp", ".cn", ".in", ".au", ".br", ".ru",
    ];

    /// Default URL substrings that disqualify a link from crawling
    pub const FORBIDDEN_EXTENSIONS: &[&str] = &[".css", ".pdf", ".png", ".jpeg", ".jpg", ".ico"];
}

/// Configuration for one crawl run, immutable once the scheduler starts
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Delay between successive requests within one site, in milliseconds
    pub crawl_delay_ms: u64,

    /// Global bound on concurrently crawled sites
    pub max_concurrent_sites: usize,

    /// Maximum BFS depth from any seed
    pub depth_limit: usize,

    /// Per-site cap on pages visited, -1 for unlimited
    pub page_limit: i64,

    /// Per-site cap on external hosts promoted to the scheduler
    pub linked_sites_limit: usize,

    /// Seed URLs, in order
    pub seed_urls: Vec<String>,

    /// TCP port used for every request
    pub port: u16,

    /// Hostname suffixes accepted by the link extractor
    pub allowed_tld_suffixes: Vec<String>,

    /// URL substrings that disqualify a link from crawling
    pub forbidden_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        use defaults::*;

        Self {
            crawl_delay_ms: CRAWL_DELAY_MS,
            max_concurrent_sites: MAX_CONCURRENT_SITES,
            depth_limit: DEPTH_LIMIT,
            page_limit: PAGE_LIMIT,
            linked_sites_limit: LINKED_SITES_LIMIT,
            seed_urls: Vec::new(),
            port: PORT,
            allowed_tld_suffixes: ALLOWED_TLD_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            forbidden_extensions: FORBIDDEN_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Parse the next whitespace token as a value for `name`
fn next_value<T: std::str::FromStr>(
    tokens: &mut std::str::SplitWhitespace<'_>,
    name: &str,
) -> Result<T, CrawlError> {
    let raw = tokens
        .next()
        .ok_or_else(|| CrawlError::Config(format!("missing value for {}", name)))?;
    raw.parse()
        .map_err(|_| CrawlError::Config(format!("invalid value for {}: {}", name, raw)))
}

impl CrawlerConfig {
    /// Create a builder for more granular configuration
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::default()
    }

    /// Load configuration from a key-value file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CrawlError> {
        let text = fs::read_to_string(&path).map_err(|e| {
            CrawlError::Config(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::parse(&text)
    }

    /// Parse the whitespace-separated `<name> <value>` config format.
    ///
    /// Pairs may appear in any order; `startUrls <N>` is followed by N URL
    /// tokens. Unknown keys and malformed values are configuration errors.
    pub fn parse(text: &str) -> Result<Self, CrawlError> {
        let mut config = Self::default();
        let mut tokens = text.split_whitespace();

        while let Some(name) = tokens.next() {
            match name {
                "crawlDelay" => config.crawl_delay_ms = next_value(&mut tokens, name)?,
                "maxThreads" => config.max_concurrent_sites = next_value(&mut tokens, name)?,
                "depthLimit" => config.depth_limit = next_value(&mut tokens, name)?,
                "pageLimit" => config.page_limit = next_value(&mut tokens, name)?,
                "linkedSitesLimit" => config.linked_sites_limit = next_value(&mut tokens, name)?,
                "startUrls" => {
                    let count: usize = next_value(&mut tokens, name)?;
                    for _ in 0..count {
                        match tokens.next() {
                            Some(url) => config.seed_urls.push(url.to_string()),
                            None => {
                                return Err(CrawlError::Config(format!(
                                    "startUrls announces {} URLs but the file ends early",
                                    count
                                )))
                            }
                        }
                    }
                }
                other => {
                    return Err(CrawlError::Config(format!(
                        "unrecognized config key: {}",
                        other
                    )))
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check numeric constraints; seed presence is checked where seeds can no
    /// longer be added.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.max_concurrent_sites == 0 {
            return Err(CrawlError::Config("maxThreads must be positive".to_string()));
        }
        if self.page_limit < -1 {
            return Err(CrawlError::Config(
                "pageLimit must be -1 or non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for CrawlerConfig to allow for more granular configuration
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl Default for CrawlerConfigBuilder {
    fn default() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }
}

impl CrawlerConfigBuilder {
    /// Set the delay between successive requests within one site
    pub fn crawl_delay_ms(mut self, delay: u64) -> Self {
        self.config.crawl_delay_ms = delay;
        self
    }

    /// Set the bound on concurrently crawled sites
    pub fn max_concurrent_sites(mut self, max: usize) -> Self {
        self.config.max_concurrent_sites = max;
        self
    }

    /// Set the maximum BFS depth from any seed
    pub fn depth_limit(mut self, limit: usize) -> Self {
        self.config.depth_limit = limit;
        self
    }

    /// Set the per-site page cap (-1 for unlimited)
    pub fn page_limit(mut self, limit: i64) -> Self {
        self.config.page_limit = limit;
        self
    }

    /// Set the per-site cap on promoted linked sites
    pub fn linked_sites_limit(mut self, limit: usize) -> Self {
        self.config.linked_sites_limit = limit;
        self
    }

    /// Set the TCP port used for every request
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Append one seed URL
    pub fn add_seed_url(mut self, url: &str) -> Self {
        self.config.seed_urls.push(url.to_string());
        self
    }

    /// Replace all seed URLs
    pub fn seed_urls(mut self, urls: &[&str]) -> Self {
        self.config.seed_urls = urls.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace the TLD allow-list
    pub fn allowed_tld_suffixes(mut self, suffixes: &[&str]) -> Self {
        self.config.allowed_tld_suffixes = suffixes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace the forbidden extension list
    pub fn forbidden_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.forbidden_extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Build the final CrawlerConfig
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}
