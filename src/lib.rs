//! ウェブトゥーンクローラーライブラリ
//!
//! - NAVER / KAKAO の曜日別一覧から各作品の詳細ページを巡回
//! - 一覧の再描画やタイムアウトはバッチ単位でリトライ
//! - 結果をJSON / CSVに保存、またはAPIへ送信
//!
//! # 使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tower::Service;
//! use webtoon_crawler::{CrawlRequest, CrawlerConfig, CrawlerService, JsonRepository, Platform};
//!
//! #[tokio::main]
//! async fn main() {
//!     let repository = Arc::new(JsonRepository::new("webtoons.json", "failed.json"));
//!     let config = CrawlerConfig::new().with_headless(false).with_batch_size(20);
//!     let mut service = CrawlerService::new(config, repository);
//!
//!     let report = service.call(CrawlRequest::listing(Platform::Naver)).await.unwrap();
//!     println!("succeeded: {}", report.succeeded.len());
//! }
//! ```

pub mod api;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod parse;
pub mod platform;
pub mod repository;
pub mod request;
pub mod retry;
pub mod service;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// 主要な型をリエクスポート
pub use api::{ApiClient, ApiConfig, ApiSink};
pub use browser::ChromeDriver;
pub use config::CrawlerConfig;
pub use crawler::{BatchProcessor, CrawlReport, DetailCrawler, ListingCrawler, UrlCollector};
pub use error::CrawlerError;
pub use models::{
    AgeRating, Author, AuthorRole, DayOfWeek, FailedItem, ListingTab, Platform,
    SerializationStatus, Webtoon,
};
pub use platform::{create_scraper, KakaoScraper, NaverScraper};
pub use repository::{CsvRepository, JsonRepository, NullRepository, UrlListStore, WebtoonRepository};
pub use request::{UpdateRequest, UpdateResult, UpdateSummary, UpdateTarget};
pub use retry::RetryPolicy;
pub use service::{CrawlRequest, CrawlerService};
pub use traits::{PageDriver, WebtoonScraper};
