//! 카카오웹툰 (webtoon.kakao.com) スクレイパー

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::models::{
    Author, AuthorRole, DayOfWeek, ListingTab, Platform, SerializationStatus, Webtoon,
};
use crate::parse::{
    absolutize, attr_of, clean_title, element_text, first_number, require, selector, text_of,
    texts_of,
};
use crate::traits::{PageDriver, WebtoonScraper};

use super::{log_debug_snapshot, return_to_listing, scroll_until_stable};

const BASE_URL: &str = "https://webtoon.kakao.com";

// 一覧
const ALL_TOGGLE: &str = ".w-fit.flex.overflow-x-scroll button";
const ITEM: &str = ".flex.flex-wrap.gap-4.content-start > div";
const ITEM_LINK: &str = ".flex.flex-wrap.gap-4.content-start > div a";

// 作品ページ
const TITLE: &str = "p.s22-semibold-white";
const EPISODE_COUNT: &str = "p.s12-regular-white";
const THUMBNAIL: &str = "meta[property='og:image']";

// 情報タブ
const STORY: &str = "p.s13-regular-white";
const DAY_BADGE: &str = "p.s10-bold-black";
const GENRE: &str = "p.s14-medium-white";
const AUTHOR_ROW: &str = "dl div.flex.mb-8";

pub struct KakaoScraper {
    config: CrawlerConfig,
}

impl KakaoScraper {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }

    /// `/content/<slug>/<id>` の末尾の数値
    pub fn content_id(url: &str) -> Option<u64> {
        let parsed = Url::parse(url).ok()?;
        parsed
            .path_segments()?
            .rev()
            .find(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }

    fn profile_url(url: &str) -> String {
        if url.contains('?') {
            format!("{}&tab=profile", url)
        } else {
            format!("{}?tab=profile", url)
        }
    }

    /// 作品ページ（エピソードタブ）を解析
    pub fn parse_main(html: &str, url: &str) -> Result<Webtoon, CrawlerError> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let title = clean_title(&require(text_of(root, TITLE)?, "タイトル")?);
        let external_id = require(Self::content_id(url), "作品ID")?;

        Ok(Webtoon {
            external_id,
            platform: Platform::Kakao,
            title,
            days_of_week: Vec::new(),
            thumbnail_url: attr_of(root, THUMBNAIL, "content")?,
            link: url.split('?').next().unwrap_or(url).to_string(),
            age_rating: None,
            description: String::new(),
            serialization_status: SerializationStatus::Ongoing,
            episode_count: text_of(root, EPISODE_COUNT)?.and_then(|t| first_number(&t)),
            platform_rating: None,
            publish_start_date: None,
            last_updated_date: None,
            authors: Vec::new(),
            genres: Vec::new(),
        })
    }

    /// 情報タブを解析して `webtoon` を補完
    pub fn parse_profile(html: &str, webtoon: &mut Webtoon) -> Result<(), CrawlerError> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        webtoon.description = text_of(root, STORY)?.unwrap_or_default();

        let badge = text_of(root, DAY_BADGE)?.unwrap_or_default();
        webtoon.days_of_week = DayOfWeek::parse_all(&badge);
        webtoon.serialization_status = if badge.contains("완결") {
            SerializationStatus::Completed
        } else if badge.contains("휴재") {
            SerializationStatus::Hiatus
        } else {
            SerializationStatus::Ongoing
        };

        webtoon.genres = texts_of(root, GENRE)?
            .into_iter()
            .map(|g| g.replace('#', "").trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        let row = selector(AUTHOR_ROW)?;
        let dt = selector("dt")?;
        let dd = selector("dd")?;
        let mut authors = Vec::new();
        for element in root.select(&row) {
            let role = element.select(&dt).next().map(element_text);
            let Some(names) = element.select(&dd).next().map(element_text) else {
                continue;
            };
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                authors.push(Author {
                    id: None,
                    name: name.to_string(),
                    role: role.as_deref().and_then(AuthorRole::from_korean),
                    link: None,
                });
            }
        }
        webtoon.authors = authors;

        Ok(())
    }

    /// 作品ページを開いた状態から情報タブまで読む
    async fn read_detail(
        &self,
        driver: &dyn PageDriver,
        url: &str,
        depth: &mut u32,
    ) -> Result<Webtoon, CrawlerError> {
        if let Err(e) = driver.wait_for(TITLE, self.config.page_timeout).await {
            log_debug_snapshot(driver, &self.config, "kakao detail").await;
            return Err(e);
        }
        let html = driver.content().await?;
        let mut webtoon = Self::parse_main(&html, url)?;

        driver.goto(&Self::profile_url(&webtoon.link)).await?;
        *depth += 1;
        driver.wait_for(TITLE, self.config.page_timeout).await?;
        let html = driver.content().await?;
        Self::parse_profile(&html, &mut webtoon)?;

        debug!("Kakao webtoon: {} ({})", webtoon.title, webtoon.external_id);
        Ok(webtoon)
    }
}

#[async_trait]
impl WebtoonScraper for KakaoScraper {
    fn platform(&self) -> Platform {
        Platform::Kakao
    }

    fn default_tabs(&self) -> Vec<ListingTab> {
        let mut tabs = ListingTab::weekdays();
        tabs.push(ListingTab::Finished);
        tabs
    }

    fn listing_url(&self, tab: ListingTab) -> String {
        let key = match tab {
            ListingTab::Day(day) => day.tab_key(),
            // DailyPlusはカカオに無いので完結タブ扱い
            ListingTab::DailyPlus | ListingTab::Finished => "complete",
        };
        format!("{}/?tab={}", BASE_URL, key)
    }

    fn item_selector(&self) -> &str {
        ITEM
    }

    async fn open_listing(
        &self,
        driver: &dyn PageDriver,
        tab: ListingTab,
    ) -> Result<(), CrawlerError> {
        let url = self.listing_url(tab);
        info!("Opening listing: {}", url);
        driver.goto(&url).await?;

        // 「전체」トグルを押さないと一部しか表示されない
        match driver.wait_for(ALL_TOGGLE, self.config.page_timeout).await {
            Ok(()) => driver.click_nth(ALL_TOGGLE, 0).await?,
            Err(e) => warn!("All-toggle not found on {}: {}", url, e),
        }

        driver.wait_for(ITEM, self.config.page_timeout).await?;

        // 完結タブは無限スクロール
        if tab == ListingTab::Finished {
            scroll_until_stable(driver, &self.config).await?;
        }
        Ok(())
    }

    async fn scrape_listing_item(
        &self,
        driver: &dyn PageDriver,
        index: usize,
        _tab: ListingTab,
    ) -> Result<Webtoon, CrawlerError> {
        let href = driver
            .attribute_nth(ITEM_LINK, index, "href")
            .await?
            .ok_or_else(|| CrawlerError::ElementNotFound(format!("{}[{}] href", ITEM_LINK, index)))?;
        let url = absolutize(BASE_URL, &href)?;

        driver.goto(&url).await?;
        let mut depth = 1;
        let result = self.read_detail(driver, &url, &mut depth).await;
        return_to_listing(driver, depth, &self.config).await;
        result
    }

    async fn collect_detail_urls(
        &self,
        driver: &dyn PageDriver,
    ) -> Result<Vec<String>, CrawlerError> {
        let count = driver.count(ITEM_LINK).await?;
        let mut urls: Vec<String> = Vec::with_capacity(count);

        for index in 0..count {
            match driver.attribute_nth(ITEM_LINK, index, "href").await {
                Ok(Some(href)) if href.contains("/content/") => {
                    let url = absolutize(BASE_URL, &href)?;
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read item link {}: {}", index, e),
            }
        }

        info!("Collected {} detail URLs", urls.len());
        Ok(urls)
    }

    async fn fetch_detail(
        &self,
        driver: &dyn PageDriver,
        url: &str,
    ) -> Result<Webtoon, CrawlerError> {
        info!("Opening detail page: {}", url);
        driver.goto(url).await?;
        let mut depth = 0;
        self.read_detail(driver, url, &mut depth).await
    }
}
