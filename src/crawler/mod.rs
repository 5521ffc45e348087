//! バッチ単位のクロール処理

mod batch;
mod collector;
mod detail;
mod listing;

use serde::Serialize;

pub use batch::BatchProcessor;
pub use collector::UrlCollector;
pub use detail::DetailCrawler;
pub use listing::ListingCrawler;

use crate::models::{FailedItem, Webtoon};

/// クロール結果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub succeeded: Vec<Webtoon>,
    pub failed: Vec<FailedItem>,
    pub collected_urls: Vec<String>,
}

impl CrawlReport {
    /// 同じ作品が複数タブにあれば1件にまとめる
    pub fn merge_webtoon(&mut self, webtoon: Webtoon) {
        match self
            .succeeded
            .iter_mut()
            .find(|w| w.external_id == webtoon.external_id)
        {
            Some(existing) => existing.merge(&webtoon),
            None => self.succeeded.push(webtoon),
        }
    }

    pub fn extend(&mut self, other: CrawlReport) {
        for webtoon in other.succeeded {
            self.merge_webtoon(webtoon);
        }
        self.failed.extend(other.failed);
        for url in other.collected_urls {
            if !self.collected_urls.contains(&url) {
                self.collected_urls.push(url);
            }
        }
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}
