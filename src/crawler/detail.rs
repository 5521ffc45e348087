use tracing::{debug, error, info, warn};

use super::{BatchProcessor, CrawlReport};
use crate::config::CrawlerConfig;
use crate::models::{FailedItem, Webtoon};
use crate::repository::WebtoonRepository;
use crate::retry::RetryPolicy;
use crate::traits::{PageDriver, WebtoonScraper};

/// 詳細ページURLの一覧を直接巡回する
pub struct DetailCrawler<'a> {
    scraper: &'a dyn WebtoonScraper,
    driver: &'a dyn PageDriver,
    repository: &'a dyn WebtoonRepository,
    batch: BatchProcessor,
    policy: RetryPolicy,
}

impl<'a> DetailCrawler<'a> {
    pub fn new(
        scraper: &'a dyn WebtoonScraper,
        driver: &'a dyn PageDriver,
        repository: &'a dyn WebtoonRepository,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            scraper,
            driver,
            repository,
            batch: BatchProcessor::new(config.batch_size),
            policy: config.retry_policy(),
        }
    }

    pub async fn run(&self, urls: &[String]) -> CrawlReport {
        let mut report = CrawlReport::default();
        let total_batches = self.batch.total_batches(urls.len());

        for (n, window) in self.batch.ranges(urls.len()).into_iter().enumerate() {
            info!(
                "Batch {}/{} ({}..{} of {})",
                n + 1,
                total_batches,
                window.start,
                window.end,
                urls.len()
            );

            let mut succeeded: Vec<Webtoon> = Vec::new();
            let mut failed = Vec::new();
            for url in &urls[window] {
                let result = self
                    .policy
                    .run(url, |_| self.scraper.fetch_detail(self.driver, url))
                    .await;
                match result {
                    Ok(webtoon) => {
                        debug!("{} -> {}", url, webtoon.title);
                        succeeded.push(webtoon);
                    }
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", url, e);
                        failed.push(FailedItem::new(url, e.to_string()));
                    }
                }
            }

            if !succeeded.is_empty() {
                if let Err(e) = self.repository.append_success(&succeeded).await {
                    error!("Failed to save {} webtoons: {}", succeeded.len(), e);
                }
            }
            if !failed.is_empty() {
                if let Err(e) = self.repository.append_failure(&failed).await {
                    error!("Failed to save {} failures: {}", failed.len(), e);
                }
            }

            for webtoon in succeeded {
                report.merge_webtoon(webtoon);
            }
            report.failed.extend(failed);
        }

        info!(
            "Detail crawl finished: {} webtoons, {} failures",
            report.success_count(),
            report.failure_count()
        );
        report
    }
}
