use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use surfmap::{config::Config, crawl::Crawler, AdmissionCoordinator};
use tracing::{info, warn};
use url::Url;

pub async fn run_crawl(
    mut config: Config,
    seeds: Vec<String>,
    workers: Option<usize>,
    max_pages: Option<usize>,
    domains: Vec<String>,
    open_scope: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(workers) = workers {
        config.crawl.workers = workers;
    }
    if let Some(max_pages) = max_pages {
        config.crawl.max_pages = max_pages;
    }
    config.scope.include_domains.extend(domains);

    // Bare hosts are accepted as seeds
    let seeds: Vec<String> = seeds
        .into_iter()
        .map(|s| match Url::parse(&s) {
            Ok(_) => s,
            Err(_) => format!("https://{}", s),
        })
        .collect();

    if !open_scope {
        let hosts = config.scope.restrict_to_seed_hosts(&seeds);
        if !hosts.is_empty() {
            info!("No include domains configured, scope restricted to seed hosts {:?}", hosts);
        }
    } else if config.scope.include_domains.is_empty() {
        warn!("Scope is open: off-site links will be followed");
    }

    let coordinator =
        Arc::new(AdmissionCoordinator::new(&config).context("Invalid configuration")?);
    let crawler = Arc::new(Crawler::new(config.crawl.clone(), coordinator)?);
    let report = crawler.run(seeds).await?;

    info!("Status histogram: {:?}", report.status_histogram());
    match output {
        Some(path) => {
            report.write(&path)?;
            println!(
                "Wrote {} endpoints, {} POST endpoints, {} assets to {}",
                report.endpoints.len(),
                report.post_endpoints.len(),
                report.assets.len(),
                path.display()
            );
        }
        None => println!("{}", report.to_json()?),
    }
    Ok(())
}
