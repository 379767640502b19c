use crate::spider::config::CrawlerConfig;
use crate::spider::network::HttpClient;
use crate::spider::parser;
use crate::spider::report::{PageVisit, SiteStats};

use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// Crawls every reachable page of one site, one request at a time
///
/// The path frontier is FIFO, so pages are visited in breadth-first,
/// first-discovery order starting at `/`. Links to other hosts are not
/// followed here; they are collected into the site report for the scheduler
/// to promote.
pub struct SiteCrawler {
    /// The site's hostname, without scheme or path
    hostname: String,

    /// TCP port for every request
    port: u16,

    /// Cap on visited pages, -1 for unlimited
    page_limit: i64,

    /// Pause before every request except the first
    crawl_delay: Duration,

    /// Hostname suffixes accepted by the link extractor
    allowed_tlds: Vec<String>,

    /// URL substrings that disqualify a link
    forbidden_extensions: Vec<String>,

    /// HTTP client for page fetches
    client: HttpClient,
}

impl SiteCrawler {
    /// Create a crawler for one site from the run configuration
    pub fn new(hostname: &str, config: &CrawlerConfig) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: config.port,
            page_limit: config.page_limit,
            crawl_delay: Duration::from_millis(config.crawl_delay_ms),
            allowed_tlds: config.allowed_tld_suffixes.clone(),
            forbidden_extensions: config.forbidden_extensions.clone(),
            client: HttpClient::default(),
        }
    }

    fn page_budget_reached(&self, stats: &SiteStats) -> bool {
        self.page_limit >= 0 && stats.discovered_pages.len() as i64 >= self.page_limit
    }

    /// Visit pages breadth-first starting at `/` and collect site statistics.
    ///
    /// Transport failures are counted into `failed_queries` and never retried;
    /// this method cannot fail.
    pub async fn crawl(self) -> SiteStats {
        let mut pending: VecDeque<String> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut external_seen: HashSet<String> = HashSet::new();
        let mut stats = SiteStats::new(&self.hostname);

        pending.push_back("/".to_string());
        visited.insert("/".to_string());

        info!("crawling {} (page limit {})", self.hostname, self.page_limit);

        while let Some(path) = pending.pop_front() {
            if self.page_budget_reached(&stats) {
                debug!("{}: page limit reached", self.hostname);
                break;
            }

            // The very first request of a site is not delayed.
            if path != "/" {
                tokio::time::sleep(self.crawl_delay).await;
            }

            let page = match self.client.fetch(&self.hostname, self.port, &path).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("{}{}: {}", self.hostname, path, e);
                    stats.failed_queries += 1;
                    continue;
                }
            };

            stats.discovered_pages.push(PageVisit {
                url: format!("{}{}", self.hostname, path),
                response_time_ms: page.elapsed_ms,
            });

            let body = String::from_utf8_lossy(&page.body);
            let links = parser::extract_links(
                &body,
                &self.hostname,
                &self.allowed_tlds,
                &self.forbidden_extensions,
            );

            for (host, link_path) in links {
                if host.is_empty() || host == self.hostname {
                    if visited.insert(link_path.clone()) {
                        pending.push_back(link_path);
                    }
                } else if external_seen.insert(host.clone()) {
                    stats.linked_sites.push(host);
                }
            }
        }

        stats.finalize_response_times();

        info!(
            "{}: {} pages visited, {} failed, {} linked sites",
            self.hostname,
            stats.discovered_pages.len(),
            stats.failed_queries,
            stats.linked_sites.len()
        );

        stats
    }
}
