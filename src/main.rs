use anyhow::{bail, Context, Result};
use env_logger::Env;
use log::info;
use std::env;
use std::time::Instant;

use sitehop::spider::config::CrawlerConfig;
use sitehop::spider::report::{ConsoleSink, CsvSink, JsonDirSink};
use sitehop::spider::Scheduler;

/// Command-line flags overlaying the config file
#[derive(Default)]
struct CliArgs {
    config_file: Option<String>,
    max_threads: Option<usize>,
    crawl_depth: Option<usize>,
    page_limit: Option<i64>,
    linked_sites_limit: Option<usize>,
    crawl_delay: Option<u64>,
    csv_path: Option<String>,
    json_dir: Option<String>,
    seeds: Vec<String>,
}

fn usage(program: &str) {
    eprintln!("Usage: {} [flags] [seed URLs...]", program);
    eprintln!("  --configFile | -cfg <path>   key-value config file");
    eprintln!("  --maxThreads <n>             concurrent site workers");
    eprintln!("  --crawlDepth <n>             maximum distance from the seeds");
    eprintln!("  --pageLimit <n>              pages per site, -1 for unlimited");
    eprintln!("  --linkedSitesLimit <n>       linked sites promoted per site");
    eprintln!("  --crawlDelay <ms>            delay between requests within a site");
    eprintln!("  --csv <path>                 also write reports to a CSV file");
    eprintln!("  --jsonDir <dir>              also save one JSON report per site");
    eprintln!("  Positional seed URLs are appended to the config file's startUrls.");
}

fn flag_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a String> {
    iter.next()
        .with_context(|| format!("{} requires a value", flag))
}

fn parsed_flag_value<T>(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
{
    let raw = flag_value(iter, flag)?;
    match raw.parse() {
        Ok(value) => Ok(value),
        Err(_) => bail!("invalid value for {}: {}", flag, raw),
    }
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--configFile" | "-cfg" => {
                cli.config_file = Some(flag_value(&mut iter, arg)?.clone());
            }
            "--maxThreads" => cli.max_threads = Some(parsed_flag_value(&mut iter, arg)?),
            "--crawlDepth" => cli.crawl_depth = Some(parsed_flag_value(&mut iter, arg)?),
            "--pageLimit" => cli.page_limit = Some(parsed_flag_value(&mut iter, arg)?),
            "--linkedSitesLimit" => {
                cli.linked_sites_limit = Some(parsed_flag_value(&mut iter, arg)?);
            }
            "--crawlDelay" => cli.crawl_delay = Some(parsed_flag_value(&mut iter, arg)?),
            "--csv" => cli.csv_path = Some(flag_value(&mut iter, arg)?.clone()),
            "--jsonDir" => cli.json_dir = Some(flag_value(&mut iter, arg)?.clone()),
            flag if flag.starts_with('-') => bail!("unrecognized flag: {}", flag),
            url => cli.seeds.push(url.to_string()),
        }
    }

    Ok(cli)
}

/// Build the effective configuration: config file first, flags on top,
/// positional seeds appended.
fn build_config(cli: &CliArgs) -> Result<CrawlerConfig> {
    let mut config = match &cli.config_file {
        Some(path) => CrawlerConfig::from_file(path)?,
        None => CrawlerConfig::default(),
    };

    if let Some(value) = cli.max_threads {
        config.max_concurrent_sites = value;
    }
    if let Some(value) = cli.crawl_depth {
        config.depth_limit = value;
    }
    if let Some(value) = cli.page_limit {
        config.page_limit = value;
    }
    if let Some(value) = cli.linked_sites_limit {
        config.linked_sites_limit = value;
    }
    if let Some(value) = cli.crawl_delay {
        config.crawl_delay_ms = value;
    }
    config.seed_urls.extend(cli.seeds.iter().cloned());

    config.validate()?;
    if config.seed_urls.is_empty() {
        bail!("no seed URLs supplied (use a config file with startUrls or positional arguments)");
    }

    Ok(config)
}

async fn run(args: &[String]) -> Result<()> {
    let cli = parse_args(args)?;
    let config = build_config(&cli)?;

    let mut scheduler = Scheduler::new(config.clone());
    scheduler.add_sink(Box::new(ConsoleSink));
    if let Some(path) = &cli.csv_path {
        scheduler.add_sink(Box::new(CsvSink::create(path)?));
    }
    if let Some(dir) = &cli.json_dir {
        scheduler.add_sink(Box::new(JsonDirSink::new(dir)));
    }

    info!(
        "starting crawl of {} seed URL(s) with {} worker(s)",
        config.seed_urls.len(),
        config.max_concurrent_sites
    );
    let start = Instant::now();

    scheduler.run().await?;

    info!("crawl completed in {:?}", start.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    if let Err(e) = run(&args[1..]).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_flags_and_seeds() {
        let cli = parse_args(&args(&[
            "--maxThreads",
            "3",
            "--crawlDelay",
            "50",
            "http://a.com/",
            "http://b.net/",
        ]))
        .unwrap();
        assert_eq!(cli.max_threads, Some(3));
        assert_eq!(cli.crawl_delay, Some(50));
        assert_eq!(cli.seeds, vec!["http://a.com/", "http://b.net/"]);
    }

    #[test]
    fn test_parse_args_rejects_unknown_flag() {
        assert!(parse_args(&args(&["--politeness", "3"])).is_err());
    }

    #[test]
    fn test_parse_args_rejects_missing_value() {
        assert!(parse_args(&args(&["--maxThreads"])).is_err());
    }

    #[test]
    fn test_build_config_overlays_flags() {
        let cli = parse_args(&args(&["--pageLimit", "-1", "http://a.com/"])).unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.page_limit, -1);
        assert_eq!(config.seed_urls, vec!["http://a.com/"]);
    }

    #[test]
    fn test_build_config_requires_seeds() {
        let cli = parse_args(&args(&["--maxThreads", "2"])).unwrap();
        assert!(build_config(&cli).is_err());
    }
}
