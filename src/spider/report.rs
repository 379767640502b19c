use crate::spider::error::CrawlError;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One successfully visited page and its measured response time
#[derive(Debug, Clone, Serialize)]
pub struct PageVisit {
    /// Hostname + path, without scheme
    pub url: String,

    /// Milliseconds from connect to first response byte
    pub response_time_ms: f64,
}

/// Statistics collected while crawling one site
///
/// Response-time aggregates hold the sentinel value `-1.0` until
/// [`SiteStats::finalize_response_times`] runs over a non-empty visit list.
#[derive(Debug, Clone, Serialize)]
pub struct SiteStats {
    /// The crawled site's hostname
    pub hostname: String,

    /// Visited pages, in visit order
    pub discovered_pages: Vec<PageVisit>,

    /// External hostnames seen in this site's bodies, in first-seen order
    pub linked_sites: Vec<String>,

    /// Pages whose connect or send step failed
    pub failed_queries: usize,

    /// Minimum response time in milliseconds, or -1
    pub min_response_time: f64,

    /// Maximum response time in milliseconds, or -1
    pub max_response_time: f64,

    /// Mean response time in milliseconds, or -1
    pub average_response_time: f64,
}

impl SiteStats {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            discovered_pages: Vec::new(),
            linked_sites: Vec::new(),
            failed_queries: 0,
            min_response_time: -1.0,
            max_response_time: -1.0,
            average_response_time: -1.0,
        }
    }

    /// Compute min/max/mean over the visited pages.
    ///
    /// Leaves the -1 sentinels in place when no page was visited.
    pub fn finalize_response_times(&mut self) {
        if self.discovered_pages.is_empty() {
            return;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for page in &self.discovered_pages {
            min = min.min(page.response_time_ms);
            max = max.max(page.response_time_ms);
            sum += page.response_time_ms;
        }

        self.min_response_time = min;
        self.max_response_time = max;
        self.average_response_time = sum / self.discovered_pages.len() as f64;
    }
}

/// Receives completed site reports.
///
/// The scheduler calls `emit` once per crawled site, from a single task, so
/// implementations never see concurrent calls.
pub trait ReportSink {
    fn emit(&mut self, stats: &SiteStats, depth: usize);
}

/// Renders a response-time aggregate, using `-` for the empty sentinel
fn format_ms(value: f64) -> String {
    if value < 0.0 {
        "-".to_string()
    } else {
        format!("{:.2}ms", value)
    }
}

/// Writes a human-readable report block per site to standard output
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&mut self, stats: &SiteStats, depth: usize) {
        println!("----------------------------------------------------------------------------");
        println!(" - Website: {}", stats.hostname);
        println!(" - Depth (distance from the starting pages): {}", depth);
        println!(" - Pages Discovered: {}", stats.discovered_pages.len());
        println!(" - Failed Queries: {}", stats.failed_queries);
        println!(" - Linked Sites: {}", stats.linked_sites.len());
        println!(" - Min. Response Time: {}", format_ms(stats.min_response_time));
        println!(" - Max. Response Time: {}", format_ms(stats.max_response_time));
        println!(" - Avg Response Time: {}", format_ms(stats.average_response_time));

        if !stats.discovered_pages.is_empty() {
            println!();
            println!(" [*] List of visited pages:");
            println!("    {:>15}    URL", "Response Time");
            for page in &stats.discovered_pages {
                println!("    {:>13.2}ms    {}", page.response_time_ms, page.url);
            }
        }
    }
}

/// Column headers of the CSV report
pub const CSV_HEADER: [&str; 9] = [
    "WEBSITE",
    "DEPTH",
    "PAGES DISCOVERED",
    "FAILED QUERIES",
    "LINKED SITES",
    "MIN RESPONSE TIME (ms)",
    "MAX RESPONSE TIME (ms)",
    "AVG RESPONSE TIME (ms)",
    "DISCOVERED PAGES",
];

/// Appends one CSV row per completed site
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Create the output file and write the header row
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, CrawlError> {
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    fn cell_ms(value: f64) -> String {
        if value < 0.0 {
            "-".to_string()
        } else {
            format!("{:.2}", value)
        }
    }
}

impl ReportSink for CsvSink {
    fn emit(&mut self, stats: &SiteStats, depth: usize) {
        let pages = if stats.discovered_pages.is_empty() {
            "None".to_string()
        } else {
            stats
                .discovered_pages
                .iter()
                .map(|page| page.url.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };

        let record = [
            stats.hostname.clone(),
            depth.to_string(),
            stats.discovered_pages.len().to_string(),
            stats.failed_queries.to_string(),
            stats.linked_sites.len().to_string(),
            Self::cell_ms(stats.min_response_time),
            Self::cell_ms(stats.max_response_time),
            Self::cell_ms(stats.average_response_time),
            pages,
        ];

        if let Err(e) = self.writer.write_record(&record) {
            warn!("failed to write CSV row for {}: {}", stats.hostname, e);
        }
        if let Err(e) = self.writer.flush() {
            warn!("failed to flush CSV report: {}", e);
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    depth: usize,
    site: &'a SiteStats,
}

/// Saves each site report as a JSON file in a directory
pub struct JsonDirSink {
    directory: PathBuf,
}

impl JsonDirSink {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Generate a filename from a hostname
    fn hostname_to_filename(hostname: &str) -> String {
        hostname.replace('.', "_").replace(':', "_") + ".json"
    }

    fn save(&self, stats: &SiteStats, depth: usize) -> Result<PathBuf, CrawlError> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::hostname_to_filename(&stats.hostname));
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, &JsonReport { depth, site: stats })?;
        Ok(path)
    }
}

impl ReportSink for JsonDirSink {
    fn emit(&mut self, stats: &SiteStats, depth: usize) {
        match self.save(stats, depth) {
            Ok(path) => info!("saved report for {} to {}", stats.hostname, path.display()),
            Err(e) => warn!("failed to save report for {}: {}", stats.hostname, e),
        }
    }
}
