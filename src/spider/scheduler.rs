use crate::spider::config::CrawlerConfig;
use crate::spider::crawler::SiteCrawler;
use crate::spider::error::CrawlError;
use crate::spider::parser;
use crate::spider::report::{ReportSink, SiteStats};

use log::{debug, info};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;

/// A completed site crawl, reported back by a worker task
struct FinishedSite {
    depth: usize,
    stats: SiteStats,
}

/// Owns the site frontier and drives up to `max_concurrent_sites` workers
///
/// Each pending site is crawled by one spawned task running a
/// [`SiteCrawler`]. Workers report back over a completion channel; the
/// scheduler task is the only mutator of the frontier and the
/// discovered-sites set, which serializes report emission and site promotion
/// without any shared lock.
pub struct Scheduler {
    config: CrawlerConfig,
    sinks: Vec<Box<dyn ReportSink + Send>>,
}

impl Scheduler {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    /// Register a sink; every completed site is emitted to all sinks in
    /// registration order.
    pub fn add_sink(&mut self, sink: Box<dyn ReportSink + Send>) {
        self.sinks.push(sink);
    }

    /// Seed the frontier from the configured URLs.
    ///
    /// A hostname enters the frontier at most once; later duplicates keep the
    /// depth observed at first insertion (depth 0 here).
    fn seed_frontier(
        &self,
        frontier: &mut VecDeque<(String, usize)>,
        discovered_sites: &mut HashSet<String>,
    ) -> Result<(), CrawlError> {
        for url in &self.config.seed_urls {
            let hostname = parser::hostname_of(url);
            if hostname.is_empty() {
                return Err(CrawlError::InvalidUrl(format!(
                    "seed has no http:// or https:// scheme: {}",
                    url
                )));
            }
            if discovered_sites.insert(hostname.clone()) {
                frontier.push_back((hostname, 0));
            }
        }

        if frontier.is_empty() {
            return Err(CrawlError::Config("no seed URLs configured".to_string()));
        }

        Ok(())
    }

    /// Run the crawl until global quiescence: no pending sites, no live
    /// workers.
    ///
    /// Sites at `depth_limit` are still crawled, but their linked sites are
    /// not promoted. Returns once every enqueued site has been crawled and
    /// reported.
    pub async fn run(mut self) -> Result<(), CrawlError> {
        self.config.validate()?;

        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
        let mut discovered_sites: HashSet<String> = HashSet::new();
        self.seed_frontier(&mut frontier, &mut discovered_sites)?;

        info!(
            "scheduler starting: {} seed sites, {} concurrent workers, depth limit {}",
            frontier.len(),
            self.config.max_concurrent_sites,
            self.config.depth_limit
        );

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FinishedSite>();
        let mut in_flight = 0usize;

        loop {
            // Top up workers while there is capacity and pending work.
            while in_flight < self.config.max_concurrent_sites {
                let (hostname, depth) = match frontier.pop_front() {
                    Some(site) => site,
                    None => break,
                };

                debug!("spawning worker for {} at depth {}", hostname, depth);
                let crawler = SiteCrawler::new(&hostname, &self.config);
                let tx = done_tx.clone();
                in_flight += 1;

                tokio::spawn(async move {
                    let stats = crawler.crawl().await;
                    let _ = tx.send(FinishedSite { depth, stats });
                });
            }

            // Capacity is at least one, so an empty worker set here means the
            // frontier is empty too: the crawl has quiesced.
            if in_flight == 0 {
                break;
            }

            let finished = match done_rx.recv().await {
                Some(finished) => finished,
                None => break,
            };

            // Worker-finish protocol: report, promote linked sites, free the
            // slot. New frontier entries and the worker count change in the
            // same step, so quiescence is never observed while work is latent.
            for sink in &mut self.sinks {
                sink.emit(&finished.stats, finished.depth);
            }

            if finished.depth < self.config.depth_limit {
                let promoted = finished
                    .stats
                    .linked_sites
                    .iter()
                    .take(self.config.linked_sites_limit);
                for site in promoted {
                    if discovered_sites.insert(site.clone()) {
                        debug!("promoting {} at depth {}", site, finished.depth + 1);
                        frontier.push_back((site.clone(), finished.depth + 1));
                    }
                }
            }

            in_flight -= 1;
        }

        info!("crawl finished: {} sites discovered", discovered_sites.len());
        Ok(())
    }
}
