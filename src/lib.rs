//! sitehop - a breadth-first site crawler
//!
//! Starting from a set of seed URLs, sitehop discovers the pages of each
//! site over raw HTTP/1.1, measures per-page response times, and follows
//! links to external sites up to a configurable depth, producing one
//! statistics report per site.

pub mod spider;

pub use spider::config::CrawlerConfig;
pub use spider::error::CrawlError;
pub use spider::report::{PageVisit, SiteStats};
pub use spider::scheduler::Scheduler;
