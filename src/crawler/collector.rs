use tracing::{info, warn};

use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::models::ListingTab;
use crate::repository::UrlListStore;
use crate::retry::RetryPolicy;
use crate::traits::{PageDriver, WebtoonScraper};

/// 一覧ページから詳細ページURLを集める
pub struct UrlCollector<'a> {
    scraper: &'a dyn WebtoonScraper,
    driver: &'a dyn PageDriver,
    policy: RetryPolicy,
}

impl<'a> UrlCollector<'a> {
    pub fn new(
        scraper: &'a dyn WebtoonScraper,
        driver: &'a dyn PageDriver,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            scraper,
            driver,
            policy: config.retry_policy(),
        }
    }

    /// 新しく追加したURL数を返す。開けなかったタブは飛ばす
    pub async fn collect(
        &self,
        tabs: &[ListingTab],
        store: &mut UrlListStore,
    ) -> Result<usize, CrawlerError> {
        let mut added = 0;

        for &tab in tabs {
            let urls = self
                .policy
                .run(&format!("collect {}", tab), |_| async move {
                    self.scraper.open_listing(self.driver, tab).await?;
                    self.scraper.collect_detail_urls(self.driver).await
                })
                .await;

            match urls {
                Ok(urls) => {
                    let n = store.extend(urls);
                    info!("[{}] {} new URLs", tab, n);
                    added += n;
                }
                Err(e) => warn!("Skipping tab {}: {}", tab, e),
            }
        }

        Ok(added)
    }

    /// 保存済みのURL一覧があればそれを使い、無ければ集めて保存する
    pub async fn initialize(
        &self,
        tabs: &[ListingTab],
        store: &mut UrlListStore,
    ) -> Result<Vec<String>, CrawlerError> {
        if store.load()? {
            return Ok(store.urls());
        }

        info!("Collecting detail URLs into {}", store.path().display());
        self.collect(tabs, store).await?;
        store.save()?;
        Ok(store.urls())
    }
}
