//! End-to-end crawl scenarios against a local HTTP fixture server.
//!
//! The server binds one listener on an ephemeral port and routes requests by
//! their `Host` header, so several "sites" (distinct loopback hostnames) can
//! be served at once. Responses are plain HTTP/1.1 with `Connection: close`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use sitehop::spider::config::CrawlerConfig;
use sitehop::spider::report::{ReportSink, SiteStats};
use sitehop::spider::Scheduler;

const HOST_A: &str = "127.0.0.1";
const HOST_B: &str = "127.0.0.2";
const HOST_C: &str = "127.0.0.3";

#[derive(Default)]
struct SiteRoutes {
    pages: HashMap<String, String>,
    fallback: Option<String>,
}

struct ServerState {
    sites: HashMap<String, SiteRoutes>,
    hits: Mutex<Vec<(String, String, Instant)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    response_delay: Duration,
}

struct TestServer {
    port: u16,
    state: Arc<ServerState>,
}

struct TestServerBuilder {
    sites: HashMap<String, SiteRoutes>,
    response_delay: Duration,
    max_accepts: Option<usize>,
}

impl TestServerBuilder {
    fn new() -> Self {
        Self {
            sites: HashMap::new(),
            response_delay: Duration::ZERO,
            max_accepts: None,
        }
    }

    /// Serve `body` for `path` requests carrying `Host: <host>`
    fn page(mut self, host: &str, path: &str, body: &str) -> Self {
        self.sites
            .entry(host.to_string())
            .or_default()
            .pages
            .insert(path.to_string(), body.to_string());
        self
    }

    /// Serve `body` for any un-routed path on `host`
    fn fallback(mut self, host: &str, body: &str) -> Self {
        self.sites.entry(host.to_string()).or_default().fallback = Some(body.to_string());
        self
    }

    /// Sleep this long before answering each request
    fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Close the listener after this many accepted connections; later
    /// connects are refused
    fn max_accepts(mut self, count: usize) -> Self {
        self.max_accepts = Some(count);
        self
    }

    async fn start(self) -> TestServer {
        // 0.0.0.0 so every 127.0.0.0/8 hostname reaches the same listener.
        let listener = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(ServerState {
            sites: self.sites,
            hits: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            response_delay: self.response_delay,
        });

        let accept_state = Arc::clone(&state);
        let max_accepts = self.max_accepts;
        tokio::spawn(async move {
            let mut accepted = 0usize;
            loop {
                if let Some(limit) = max_accepts {
                    if accepted >= limit {
                        break;
                    }
                }
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                accepted += 1;
                tokio::spawn(handle_connection(stream, Arc::clone(&accept_state)));
            }
        });

        TestServer { port, state }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<ServerState>) {
    let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active.fetch_max(active, Ordering::SeqCst);

    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request).to_string();
    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    let host = request
        .lines()
        .find_map(|line| line.strip_prefix("Host: "))
        .unwrap_or("")
        .trim()
        .to_string();

    state
        .hits
        .lock()
        .unwrap()
        .push((host.clone(), path.clone(), Instant::now()));

    if !state.response_delay.is_zero() {
        tokio::time::sleep(state.response_delay).await;
    }

    let body = state
        .sites
        .get(&host)
        .and_then(|site| site.pages.get(&path).cloned().or_else(|| site.fallback.clone()))
        .unwrap_or_else(|| "<html>not found</html>".to_string());

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n{}",
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;

    state.active.fetch_sub(1, Ordering::SeqCst);
}

impl TestServer {
    fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Arrival times of this host's requests, in arrival order
    fn arrivals_for(&self, host: &str) -> Vec<Instant> {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _, _)| h == host)
            .map(|(_, _, at)| *at)
            .collect()
    }
}

/// Captures emitted reports for assertions
#[derive(Clone, Default)]
struct CollectSink {
    reports: Arc<Mutex<Vec<(usize, SiteStats)>>>,
}

impl ReportSink for CollectSink {
    fn emit(&mut self, stats: &SiteStats, depth: usize) {
        self.reports.lock().unwrap().push((depth, stats.clone()));
    }
}

fn test_config(port: u16, seeds: &[&str]) -> CrawlerConfig {
    CrawlerConfig::builder()
        .port(port)
        .crawl_delay_ms(20)
        .page_limit(100)
        .depth_limit(0)
        .linked_sites_limit(10)
        .max_concurrent_sites(4)
        .allowed_tld_suffixes(&[".1", ".2", ".3"])
        .seed_urls(seeds)
        .build()
}

async fn run_crawl(config: CrawlerConfig) -> Vec<(usize, SiteStats)> {
    let sink = CollectSink::default();
    let mut scheduler = Scheduler::new(config);
    scheduler.add_sink(Box::new(sink.clone()));
    scheduler.run().await.unwrap();
    let reports = sink.reports.lock().unwrap().clone();
    reports
}

fn assert_consistent_times(stats: &SiteStats) {
    if stats.discovered_pages.is_empty() {
        assert_eq!(stats.min_response_time, -1.0);
        assert_eq!(stats.max_response_time, -1.0);
        assert_eq!(stats.average_response_time, -1.0);
    } else {
        assert!(stats.min_response_time >= 0.0);
        assert!(stats.min_response_time <= stats.average_response_time);
        assert!(stats.average_response_time <= stats.max_response_time);
    }
}

#[tokio::test]
async fn single_site_visits_internal_links_in_order() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html><a href=\"/x\">x</a></html>")
        .page(HOST_A, "/x", "<html>done</html>")
        .start()
        .await;

    let reports = run_crawl(test_config(server.port, &["http://127.0.0.1/"])).await;

    assert_eq!(reports.len(), 1);
    let (depth, stats) = &reports[0];
    assert_eq!(*depth, 0);
    assert_eq!(stats.hostname, HOST_A);
    let urls: Vec<_> = stats.discovered_pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["127.0.0.1/", "127.0.0.1/x"]);
    assert!(stats.linked_sites.is_empty());
    assert_eq!(stats.failed_queries, 0);
    assert_consistent_times(stats);
}

#[tokio::test]
async fn depth_zero_records_but_does_not_follow_linked_sites() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html><a href=\"http://127.0.0.2/\">b</a></html>")
        .page(HOST_B, "/", "<html>leaf</html>")
        .start()
        .await;

    let reports = run_crawl(test_config(server.port, &["http://127.0.0.1/"])).await;

    assert_eq!(reports.len(), 1);
    let (_, stats) = &reports[0];
    assert_eq!(stats.hostname, HOST_A);
    assert_eq!(stats.linked_sites, vec![HOST_B.to_string()]);
}

#[tokio::test]
async fn depth_one_follows_linked_site() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html><a href=\"http://127.0.0.2/\">b</a></html>")
        .page(HOST_B, "/", "<html>leaf</html>")
        .start()
        .await;

    let mut config = test_config(server.port, &["http://127.0.0.1/"]);
    config.depth_limit = 1;
    let reports = run_crawl(config).await;

    assert_eq!(reports.len(), 2);
    // The linked site can only be promoted once its referrer completed.
    assert_eq!(reports[0].0, 0);
    assert_eq!(reports[0].1.hostname, HOST_A);
    assert_eq!(reports[1].0, 1);
    assert_eq!(reports[1].1.hostname, HOST_B);
    assert_consistent_times(&reports[1].1);
}

#[tokio::test]
async fn cyclic_sites_are_crawled_exactly_once() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html><a href=\"http://127.0.0.2/\">b</a></html>")
        .page(HOST_B, "/", "<html><a href=\"http://127.0.0.1/\">a</a></html>")
        .start()
        .await;

    let mut config = test_config(server.port, &["http://127.0.0.1/", "http://127.0.0.2/"]);
    config.depth_limit = 5;
    let reports = run_crawl(config).await;

    assert_eq!(reports.len(), 2);
    let hostnames: HashSet<_> = reports.iter().map(|(_, s)| s.hostname.clone()).collect();
    assert_eq!(hostnames.len(), 2);
    assert!(hostnames.contains(HOST_A));
    assert!(hostnames.contains(HOST_B));
    for (depth, stats) in &reports {
        assert_eq!(*depth, 0);
        assert_eq!(stats.linked_sites.len(), 1);
    }
}

#[tokio::test]
async fn page_limit_caps_visits() {
    let links: String = (0..10).map(|i| format!("<a href=\"/p{}\">", i)).collect();
    let server = TestServerBuilder::new()
        .fallback(HOST_A, &links)
        .start()
        .await;

    let mut config = test_config(server.port, &["http://127.0.0.1/"]);
    config.page_limit = 5;
    let reports = run_crawl(config).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.discovered_pages.len(), 5);
}

#[tokio::test]
async fn connect_failures_are_counted_not_fatal() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html><a href=\"/x\">x</a></html>")
        .max_accepts(1)
        .start()
        .await;

    let reports = run_crawl(test_config(server.port, &["http://127.0.0.1/"])).await;

    assert_eq!(reports.len(), 1);
    let (_, stats) = &reports[0];
    let urls: Vec<_> = stats.discovered_pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["127.0.0.1/"]);
    assert_eq!(stats.failed_queries, 1);
    assert_consistent_times(stats);
}

#[tokio::test]
async fn requests_within_a_site_honor_the_crawl_delay() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<a href=\"/a\"><a href=\"/b\">")
        .fallback(HOST_A, "<html>leaf</html>")
        .start()
        .await;

    let mut config = test_config(server.port, &["http://127.0.0.1/"]);
    config.crawl_delay_ms = 150;
    run_crawl(config).await;

    let arrivals = server.arrivals_for(HOST_A);
    assert_eq!(arrivals.len(), 3);
    for pair in arrivals.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(150));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_site_workers_stay_bounded() {
    let server = TestServerBuilder::new()
        .page(HOST_A, "/", "<html>a</html>")
        .page(HOST_B, "/", "<html>b</html>")
        .page(HOST_C, "/", "<html>c</html>")
        .response_delay(Duration::from_millis(100))
        .start()
        .await;

    let mut config = test_config(
        server.port,
        &["http://127.0.0.1/", "http://127.0.0.2/", "http://127.0.0.3/"],
    );
    config.max_concurrent_sites = 2;
    let reports = run_crawl(config).await;

    assert_eq!(reports.len(), 3);
    assert!(server.max_active() <= 2);
}
