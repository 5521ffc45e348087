use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{info, warn};

use crate::browser::ChromeDriver;
use crate::config::CrawlerConfig;
use crate::crawler::{CrawlReport, DetailCrawler, ListingCrawler, UrlCollector};
use crate::error::CrawlerError;
use crate::models::{ListingTab, Platform};
use crate::platform::create_scraper;
use crate::repository::{UrlListStore, WebtoonRepository};
use crate::traits::PageDriver;

/// クロールリクエスト。タブが空ならプラットフォームの全タブ
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlRequest {
    Listing {
        platform: Platform,
        tabs: Vec<ListingTab>,
    },
    Details {
        platform: Platform,
        urls: Vec<String>,
    },
    CollectUrls {
        platform: Platform,
        tabs: Vec<ListingTab>,
    },
}

impl CrawlRequest {
    pub fn listing(platform: Platform) -> Self {
        CrawlRequest::Listing {
            platform,
            tabs: Vec::new(),
        }
    }

    pub fn details(platform: Platform, urls: Vec<String>) -> Self {
        CrawlRequest::Details { platform, urls }
    }

    pub fn collect_urls(platform: Platform) -> Self {
        CrawlRequest::CollectUrls {
            platform,
            tabs: Vec::new(),
        }
    }

    /// 対象タブを指定（Details では無視）
    pub fn with_tabs(mut self, new_tabs: Vec<ListingTab>) -> Self {
        match &mut self {
            CrawlRequest::Listing { tabs, .. } | CrawlRequest::CollectUrls { tabs, .. } => {
                *tabs = new_tabs;
            }
            CrawlRequest::Details { .. } => {}
        }
        self
    }

    pub fn platform(&self) -> Platform {
        match self {
            CrawlRequest::Listing { platform, .. }
            | CrawlRequest::Details { platform, .. }
            | CrawlRequest::CollectUrls { platform, .. } => *platform,
        }
    }
}

/// tower::Serviceを実装したクローラーサービス
#[derive(Clone)]
pub struct CrawlerService {
    config: CrawlerConfig,
    repository: Arc<dyn WebtoonRepository>,
    url_list_path: Option<PathBuf>,
}

impl CrawlerService {
    pub fn new(config: CrawlerConfig, repository: Arc<dyn WebtoonRepository>) -> Self {
        Self {
            config,
            repository,
            url_list_path: None,
        }
    }

    /// CollectUrls の結果を保存するファイル
    pub fn with_url_list_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.url_list_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// 起動済みのドライバでリクエストを処理する
    pub async fn execute(
        &self,
        driver: &dyn PageDriver,
        request: CrawlRequest,
    ) -> Result<CrawlReport, CrawlerError> {
        let scraper = create_scraper(request.platform(), &self.config);
        let repository = self.repository.as_ref();
        let resolve = |tabs: Vec<ListingTab>| {
            if tabs.is_empty() {
                scraper.default_tabs()
            } else {
                tabs
            }
        };

        match request {
            CrawlRequest::Listing { tabs, .. } => {
                ListingCrawler::new(scraper.as_ref(), driver, repository, &self.config)
                    .run(&resolve(tabs))
                    .await
            }
            CrawlRequest::Details { urls, .. } => {
                Ok(
                    DetailCrawler::new(scraper.as_ref(), driver, repository, &self.config)
                        .run(&urls)
                        .await,
                )
            }
            CrawlRequest::CollectUrls { tabs, .. } => {
                let mut store =
                    UrlListStore::new(self.url_list_path.clone().unwrap_or_default());
                UrlCollector::new(scraper.as_ref(), driver, &self.config)
                    .collect(&resolve(tabs), &mut store)
                    .await?;
                if self.url_list_path.is_some() {
                    store.save()?;
                }
                Ok(CrawlReport {
                    collected_urls: store.urls(),
                    ..Default::default()
                })
            }
        }
    }
}

impl Service<CrawlRequest> for CrawlerService {
    type Response = CrawlReport;
    type Error = CrawlerError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CrawlRequest) -> Self::Future {
        info!("Crawl request received: {:?}", req);
        let service = self.clone();

        Box::pin(async move {
            let driver = ChromeDriver::launch(&service.config).await?;
            let result = service.execute(&driver, req).await;

            if let Err(e) = driver.close().await {
                warn!("Failed to close browser: {}", e);
            }

            let report = result?;
            info!(
                "Crawl finished: succeeded={}, failed={}, urls={}",
                report.success_count(),
                report.failure_count(),
                report.collected_urls.len()
            );
            Ok(report)
        })
    }
}
