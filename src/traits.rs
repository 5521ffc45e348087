use std::time::Duration;

use async_trait::async_trait;

use crate::error::CrawlerError;
use crate::models::{ListingTab, Platform, Webtoon};

/// 実ブラウザのページ操作
///
/// 要素は毎回セレクタで取り直す。前回数えた件数を超える添字は
/// `CrawlerError::StaleElement` になる。
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError>;

    async fn current_url(&self) -> Result<String, CrawlerError>;

    /// セレクタに一致する要素が現れるまで待機
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), CrawlerError>;

    async fn count(&self, selector: &str) -> Result<usize, CrawlerError>;

    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), CrawlerError>;

    async fn attribute_nth(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, CrawlerError>;

    async fn outer_html_nth(&self, selector: &str, index: usize) -> Result<String, CrawlerError>;

    /// ページ全体のHTML
    async fn content(&self) -> Result<String, CrawlerError>;

    async fn back(&self) -> Result<(), CrawlerError>;

    /// 最下部までスクロールし、新しいスクロール高さを返す
    async fn scroll_to_bottom(&self) -> Result<u64, CrawlerError>;

    /// 失敗調査用のスナップショット（対応していなければNone）
    async fn debug_snapshot(&self) -> Option<String> {
        None
    }
}

/// プラットフォームごとのスクレイパー
#[async_trait]
pub trait WebtoonScraper: Send + Sync {
    fn platform(&self) -> Platform;

    /// 全件取得時に巡回するタブ
    fn default_tabs(&self) -> Vec<ListingTab>;

    fn listing_url(&self, tab: ListingTab) -> String;

    /// 一覧の作品要素
    fn item_selector(&self) -> &str;

    /// 一覧ページを開き、作品要素が揃うまで待機
    async fn open_listing(
        &self,
        driver: &dyn PageDriver,
        tab: ListingTab,
    ) -> Result<(), CrawlerError>;

    /// 一覧の `index` 番目の作品に入って情報を取得し、一覧に戻る
    async fn scrape_listing_item(
        &self,
        driver: &dyn PageDriver,
        index: usize,
        tab: ListingTab,
    ) -> Result<Webtoon, CrawlerError>;

    /// 開いている一覧から詳細ページURLを集める
    async fn collect_detail_urls(
        &self,
        driver: &dyn PageDriver,
    ) -> Result<Vec<String>, CrawlerError>;

    /// 詳細ページURLから直接取得
    async fn fetch_detail(
        &self,
        driver: &dyn PageDriver,
        url: &str,
    ) -> Result<Webtoon, CrawlerError>;
}
