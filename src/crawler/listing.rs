use std::ops::Range;

use tracing::{debug, error, info, warn};

use super::{BatchProcessor, CrawlReport};
use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::models::{FailedItem, ListingTab, Webtoon};
use crate::repository::WebtoonRepository;
use crate::retry::RetryPolicy;
use crate::traits::{PageDriver, WebtoonScraper};

/// 一覧ページの各作品を順にクリックして詳細を取得する
pub struct ListingCrawler<'a> {
    scraper: &'a dyn WebtoonScraper,
    driver: &'a dyn PageDriver,
    repository: &'a dyn WebtoonRepository,
    batch: BatchProcessor,
    policy: RetryPolicy,
    max_items: Option<usize>,
}

impl<'a> ListingCrawler<'a> {
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
            max_items: config.max_items_per_listing,
        }
    }

    pub async fn run(&self, tabs: &[ListingTab]) -> Result<CrawlReport, CrawlerError> {
        let supported = self.scraper.default_tabs();
        if let Some(tab) = tabs.iter().find(|t| !supported.contains(t)) {
            return Err(CrawlerError::InvalidRequest(format!(
                "{} はタブ {} に対応していません",
                self.scraper.platform(),
                tab
            )));
        }

        let mut report = CrawlReport::default();
        for &tab in tabs {
            let tab_report = self.crawl_tab(tab).await;
            info!(
                "[{}] {} succeeded, {} failed",
                tab,
                tab_report.success_count(),
                tab_report.failure_count()
            );
            report.extend(tab_report);
        }

        info!(
            "Listing crawl finished: {} webtoons, {} failures",
            report.success_count(),
            report.failure_count()
        );
        Ok(report)
    }

    async fn crawl_tab(&self, tab: ListingTab) -> CrawlReport {
        let listing_url = self.scraper.listing_url(tab);
        let mut report = CrawlReport::default();

        let opened = self
            .policy
            .run(&format!("open {}", tab), |_| {
                self.scraper.open_listing(self.driver, tab)
            })
            .await;
        if let Err(e) = opened {
            warn!("Failed to open listing {}: {}", listing_url, e);
            let failure = FailedItem::new(&listing_url, e.to_string());
            self.flush(&[], std::slice::from_ref(&failure)).await;
            report.failed.push(failure);
            return report;
        }

        let mut start = 0;
        let mut live = 0;
        let mut batch_no = 0;
        loop {
            // 無限スクロールで増えるのでバッチごとに数え直す
            live = match self.recount(tab, &listing_url, live).await {
                Ok(live) => live,
                Err(e) => {
                    warn!("[{}] failed to count items from {}: {}", tab, start, e);
                    let failure = FailedItem::new(&listing_url, e.to_string()).at_index(start);
                    self.flush(&[], std::slice::from_ref(&failure)).await;
                    report.failed.push(failure);
                    break;
                }
            };
            let total = self.max_items.map_or(live, |max| live.min(max));
            let Some(window) = self.batch.next_window(start, total) else {
                break;
            };
            batch_no += 1;
            info!(
                "[{}] batch {} (items {}..{} of {})",
                tab, batch_no, window.start, window.end, total
            );

            start = window.end;
            let (succeeded, failed) = self.crawl_window(tab, &listing_url, window).await;
            self.flush(&succeeded, &failed).await;

            for webtoon in succeeded {
                report.merge_webtoon(webtoon);
            }
            report.failed.extend(failed);
        }

        report
    }

    /// 一覧に戻ってから件数を数える。前回より減っていれば開き直して数え直す
    async fn recount(
        &self,
        tab: ListingTab,
        listing_url: &str,
        known: usize,
    ) -> Result<usize, CrawlerError> {
        let selector = self.scraper.item_selector();
        self.policy
            .run(&format!("{} recount", tab), |_| async move {
                self.restore_listing(tab, listing_url, None).await?;
                let live = self.driver.count(selector).await?;
                if live >= known {
                    return Ok(live);
                }
                // 戻る操作で一覧が短く描画し直されることがある
                debug!("[{}] list shrank from {} to {}, reopening", tab, known, live);
                self.scraper.open_listing(self.driver, tab).await?;
                self.driver.count(selector).await
            })
            .await
    }

    async fn crawl_window(
        &self,
        tab: ListingTab,
        listing_url: &str,
        window: Range<usize>,
    ) -> (Vec<Webtoon>, Vec<FailedItem>) {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for index in window {
            let result = self
                .policy
                .run(&format!("{} item {}", tab, index), |attempt| async move {
                    if attempt > 0 {
                        self.restore_listing(tab, listing_url, Some(index)).await?;
                    }
                    self.scraper
                        .scrape_listing_item(self.driver, index, tab)
                        .await
                })
                .await;

            match result {
                Ok(mut webtoon) => {
                    if let Some(day) = tab.day() {
                        webtoon.add_day(day);
                    }
                    debug!("[{}] {}: {}", tab, index, webtoon.title);
                    succeeded.push(webtoon);
                }
                Err(e) => {
                    warn!("[{}] item {} failed: {}", tab, index, e);
                    failed.push(FailedItem::new(listing_url, e.to_string()).at_index(index));
                }
            }
        }

        (succeeded, failed)
    }

    /// 一覧以外のページにいるか、`index` 番目がまだ描画されていなければ開き直す
    async fn restore_listing(
        &self,
        tab: ListingTab,
        listing_url: &str,
        index: Option<usize>,
    ) -> Result<(), CrawlerError> {
        let current = self.driver.current_url().await?;
        if current.trim_end_matches('/') != listing_url.trim_end_matches('/') {
            debug!("Restoring listing {} (was on {})", listing_url, current);
            return self.scraper.open_listing(self.driver, tab).await;
        }

        if let Some(index) = index {
            let live = self.driver.count(self.scraper.item_selector()).await?;
            if index >= live {
                debug!(
                    "Reopening listing {}: item {} not rendered ({} items)",
                    listing_url, index, live
                );
                return self.scraper.open_listing(self.driver, tab).await;
            }
        }
        Ok(())
    }

    async fn flush(&self, succeeded: &[Webtoon], failed: &[FailedItem]) {
        if !succeeded.is_empty() {
            if let Err(e) = self.repository.append_success(succeeded).await {
                error!("Failed to save {} webtoons: {}", succeeded.len(), e);
            }
        }
        if !failed.is_empty() {
            if let Err(e) = self.repository.append_failure(failed).await {
                error!("Failed to save {} failures: {}", failed.len(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayOfWeek;
    use crate::platform::naver_fixtures::*;
    use crate::platform::{KakaoScraper, NaverScraper};
    use crate::test_support::{MockDriver, MockOp};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRepository {
        success_batches: Mutex<Vec<usize>>,
        failures: Mutex<Vec<FailedItem>>,
    }

    #[async_trait]
    impl WebtoonRepository for RecordingRepository {
        async fn append_success(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
            self.success_batches.lock().unwrap().push(webtoons.len());
            Ok(())
        }

        async fn append_failure(&self, failures: &[FailedItem]) -> Result<(), CrawlerError> {
            self.failures.lock().unwrap().extend_from_slice(failures);
            Ok(())
        }
    }

    fn test_config() -> CrawlerConfig {
        CrawlerConfig::default()
            .with_settle_delay(Duration::ZERO)
            .with_scroll_pause(Duration::ZERO)
            .with_initial_backoff(Duration::ZERO)
            .with_fetch_start_date(false)
    }

    fn driver_with(items: &[(u64, &str, &str)]) -> MockDriver {
        let driver = MockDriver::new().with_page(LISTING_MON, &listing_page(items));
        for (id, title, _) in items {
            driver.add_page(&detail_url(*id), &detail_page(title, "월요웹툰", false));
        }
        driver
    }

    #[tokio::test]
    async fn test_batches_are_flushed() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2"), (3, "C", "9.3")]);
        let config = test_config().with_batch_size(2);
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 3);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(*repo.success_batches.lock().unwrap(), vec![2, 1]);
        assert_eq!(report.succeeded[1].platform_rating, Some(9.2));
    }

    #[tokio::test]
    async fn test_stale_element_is_retried() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2")]);
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        // 1回目は一覧の再描画で失敗、2回目で成功
        driver.fail_next(MockOp::OuterHtml, CrawlerError::StaleElement("li.item".into()));

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 2);
        assert!(repo.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_restored_before_retry() {
        let driver = driver_with(&[(1, "A", "9.1")]);
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        // 詳細ページの待機がタイムアウトし、戻る操作も失敗して詳細ページに残る
        driver.fail_after(MockOp::WaitFor, 1, CrawlerError::Timeout("title".into()));
        driver.fail_next(MockOp::Back, CrawlerError::Navigation("back".into()));

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 1);
        let listing_visits = driver
            .visits()
            .iter()
            .filter(|url| url.as_str() == LISTING_MON)
            .count();
        assert_eq!(listing_visits, 2);
        assert_eq!(driver.current_url().await.unwrap(), LISTING_MON);
    }

    #[tokio::test]
    async fn test_listing_reopened_when_back_fails_after_failure() {
        let driver = driver_with(&[(9, "성인", "9.0"), (2, "B", "9.2"), (3, "C", "9.3")])
            .with_redirect(&detail_url(9), "https://nid.naver.com/nidlogin.login");
        let config = test_config().with_batch_size(1);
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        // ログインページから戻れずに残る
        driver.fail_next(MockOp::Back, CrawlerError::Navigation("back".into()));

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        let ids: Vec<u64> = report.succeeded.iter().map(|w| w.external_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].index, Some(0));
        assert!(report.failed[0].reason.starts_with("成人認証が必要です"));
    }

    #[tokio::test]
    async fn test_shrunken_listing_is_reopened_on_retry() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2"), (3, "C", "9.3")])
            .with_page_after_back(LISTING_MON, &listing_page(&[(1, "A", "9.1")]));
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 3);
        assert_eq!(report.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_count_failure_moves_to_next_tab() {
        let tue = "https://comic.naver.com/webtoon?tab=tue";
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2")]);
        driver.add_page(tue, &listing_page(&[(3, "C", "9.3")]));
        driver.add_page(&detail_url(3), &detail_page("C", "화요웹툰", false));
        let config = test_config().with_batch_size(1);
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        // 数え直し・ジャンル展開ボタンの確認の後、月曜の2回目の数え直しで失敗する
        driver.fail_after(
            MockOp::Count,
            2,
            CrawlerError::JavaScript("Execution context was destroyed".into()),
        );

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[
                ListingTab::Day(DayOfWeek::Monday),
                ListingTab::Day(DayOfWeek::Tuesday),
            ])
            .await
            .unwrap();

        let ids: Vec<u64> = report.succeeded.iter().map(|w| w.external_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].url, LISTING_MON);
        assert_eq!(report.failed[0].index, Some(1));
        assert_eq!(repo.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_count_failure_is_retried() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2")]);
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        driver.fail_next(MockOp::Count, CrawlerError::StaleElement("context".into()));

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted_records_failure() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2")]);
        let config = test_config().with_max_retries(3);
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        for _ in 0..3 {
            driver.fail_next(MockOp::Click, CrawlerError::StaleElement("a".into()));
        }

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failure_count(), 1);
        let failure = &report.failed[0];
        assert_eq!(failure.url, LISTING_MON);
        assert_eq!(failure.index, Some(0));
        assert!(failure.reason.starts_with("3回リトライしても失敗"));
        assert_eq!(repo.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adult_gate_is_not_retried() {
        let driver = MockDriver::new()
            .with_page(LISTING_MON, &listing_page(&[(9, "성인", "9.0")]))
            .with_redirect(&detail_url(9), "https://nid.naver.com/nidlogin.login");
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday)])
            .await
            .unwrap();

        assert_eq!(report.failure_count(), 1);
        assert_eq!(driver.clicks().len(), 1);
    }

    #[tokio::test]
    async fn test_same_title_on_two_tabs_is_merged() {
        let tue = "https://comic.naver.com/webtoon?tab=tue";
        let driver = driver_with(&[(1, "A", "9.1")]);
        driver.add_page(tue, &listing_page(&[(1, "A", "9.1")]));
        let config = test_config();
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[
                ListingTab::Day(DayOfWeek::Monday),
                ListingTab::Day(DayOfWeek::Tuesday),
            ])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 1);
        assert_eq!(
            report.succeeded[0].days_of_week,
            vec![DayOfWeek::Monday, DayOfWeek::Tuesday]
        );
    }

    #[tokio::test]
    async fn test_max_items_and_unopenable_listing() {
        let driver = driver_with(&[(1, "A", "9.1"), (2, "B", "9.2"), (3, "C", "9.3")]);
        let config = test_config().with_max_items_per_listing(Some(2));
        let scraper = NaverScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let report = crawler
            .run(&[ListingTab::Day(DayOfWeek::Monday), ListingTab::Finished])
            .await
            .unwrap();

        assert_eq!(report.success_count(), 2);
        // 完結タブのページが無いので一覧ごと失敗
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].index, None);
    }

    #[tokio::test]
    async fn test_unsupported_tab_rejected() {
        let driver = MockDriver::new();
        let config = test_config();
        let scraper = KakaoScraper::new(config.clone());
        let repo = RecordingRepository::default();

        let crawler = ListingCrawler::new(&scraper, &driver, &repo, &config);
        let err = crawler.run(&[ListingTab::DailyPlus]).await.unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidRequest(_)));
    }
}
