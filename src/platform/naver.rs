//! 네이버 웹툰 (comic.naver.com) スクレイパー

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::models::{
    AgeRating, Author, AuthorRole, DayOfWeek, ListingTab, Platform, SerializationStatus, Webtoon,
};
use crate::parse::{
    absolutize, attr_of, clean_title, element_text, first_decimal, first_number,
    parse_short_date, query_param, remove_query_param, require, selector, text_of, texts_of,
};
use crate::traits::{PageDriver, WebtoonScraper};

use super::{log_debug_snapshot, return_to_listing, scroll_until_stable};

const BASE_URL: &str = "https://comic.naver.com";
const LISTING_URL: &str = "https://comic.naver.com/webtoon";
/// 成人向け作品はログインページに飛ばされる
const ADULT_GATE_HOST: &str = "nid.naver.com";

// 一覧
const ITEM: &str = ".ContentList__content_list--q5KXY li.item";
const ITEM_TITLE_LINK: &str =
    ".ContentList__content_list--q5KXY li.item a.ContentTitle__title_area--x24vt";
const ITEM_POSTER_LINK: &str =
    ".ContentList__content_list--q5KXY li.item a.Poster__link--sopnC";
const ITEM_TITLE: &str = ".ContentTitle__title--e3qXt";
const ITEM_RATING: &str = ".Rating__star_area--dFzsb";

// 詳細
const TITLE: &str = "h2.EpisodeListInfo__title--mYLjC";
const THUMBNAIL: &str = ".Poster__thumbnail_area--gviWY img";
const SUMMARY: &str = ".EpisodeListInfo__summary_wrap--ZWNW5 p";
const META_INFO_ITEM: &str = ".ContentMetaInfo__meta_info--GbTg4 .ContentMetaInfo__info_item--utGrf";
const AUTHOR_CATEGORY: &str = ".ContentMetaInfo__category--WwrCp";
const GENRE_TAG: &str = ".TagGroup__tag_group--uUJza .TagGroup__tag--xu0OH";
const GENRE_FOLD: &str = ".EpisodeListInfo__button_fold--ZKgEw";
const EPISODE_COUNT: &str = ".EpisodeListView__count--fTMc5";
const HIATUS_MARKER: &str = ".EpisodeListInfo__icon_hiatus--kbQXO, .EpisodeListInfo__info_text--MO6kz";
const EPISODE_DATE: &str = ".EpisodeListList__item--M8zq4 .date";

static COMMUNITY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/u/([^?/]+)").expect("valid regex"));

/// 一覧の作品カードから取れる情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListItemSummary {
    pub title: Option<String>,
    pub rating: Option<f64>,
}

pub struct NaverScraper {
    config: CrawlerConfig,
}

impl NaverScraper {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }

    /// 一覧の作品カード（outerHTML）を解析
    pub fn parse_list_item(fragment: &str) -> Result<ListItemSummary, CrawlerError> {
        let doc = Html::parse_fragment(fragment);
        let root = doc.root_element();
        Ok(ListItemSummary {
            title: text_of(root, ITEM_TITLE)?.map(|t| clean_title(&t)),
            rating: text_of(root, ITEM_RATING)?.and_then(|t| first_decimal(&t)),
        })
    }

    /// 詳細（エピソード一覧）ページを解析
    pub fn parse_detail(html: &str, url: &str) -> Result<Webtoon, CrawlerError> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let title = clean_title(&require(text_of(root, TITLE)?, "タイトル")?);
        let external_id = require(
            query_param(url, "titleId").and_then(|id| id.parse::<u64>().ok()),
            "titleId",
        )?;

        let meta = texts_of(root, META_INFO_ITEM)?.join(" ");
        let hiatus = texts_of(root, HIATUS_MARKER)?
            .iter()
            .any(|t| t.trim() == "휴재");
        let serialization_status = if hiatus {
            SerializationStatus::Hiatus
        } else if meta.contains("완결") {
            SerializationStatus::Completed
        } else {
            SerializationStatus::Ongoing
        };

        let genres = texts_of(root, GENRE_TAG)?
            .into_iter()
            .map(|g| g.replace('#', "").trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        let last_updated_date = text_of(root, EPISODE_DATE)?.and_then(|d| parse_short_date(&d));

        Ok(Webtoon {
            external_id,
            platform: Platform::Naver,
            title,
            days_of_week: DayOfWeek::parse_all(&meta),
            thumbnail_url: attr_of(root, THUMBNAIL, "src")?,
            link: remove_query_param(url, "tab")?,
            age_rating: AgeRating::from_label(&meta),
            description: text_of(root, SUMMARY)?.unwrap_or_default(),
            serialization_status,
            episode_count: text_of(root, EPISODE_COUNT)?.and_then(|t| first_number(&t)),
            platform_rating: None,
            publish_start_date: None,
            last_updated_date,
            authors: Self::parse_authors(&doc)?,
            genres,
        })
    }

    fn parse_authors(doc: &Html) -> Result<Vec<Author>, CrawlerError> {
        let category = selector(AUTHOR_CATEGORY)?;
        let link = selector("a")?;
        let mut authors = Vec::new();

        for element in doc.select(&category) {
            let Some(anchor) = element.select(&link).next() else {
                continue;
            };
            let name = element_text(anchor);
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = absolutize(BASE_URL, href)?;

            let (id, link) = if href.contains("artistTitle") {
                (query_param(&href, "id"), href.clone())
            } else if href.contains("community") {
                let id = COMMUNITY_ID
                    .captures(&href)
                    .map(|c| c[1].to_string());
                let link = href.split('?').next().unwrap_or_default().to_string();
                (id, link)
            } else {
                warn!("Unknown author link structure: {}", href);
                continue;
            };

            // 「작가명 글」のように役割は末尾
            let role = element_text(element)
                .split_whitespace()
                .last()
                .and_then(AuthorRole::from_korean);

            debug!("Author: {} id={:?} role={:?}", name, id, role);
            authors.push(Author {
                id,
                name,
                role,
                link: Some(link),
            });
        }

        Ok(authors)
    }

    /// 第1話の日付（昇順ソートした一覧の先頭）
    pub fn parse_first_episode_date(html: &str) -> Result<Option<chrono::NaiveDate>, CrawlerError> {
        let doc = Html::parse_document(html);
        Ok(text_of(doc.root_element(), EPISODE_DATE)?.and_then(|d| parse_short_date(&d)))
    }

    /// 開いている詳細ページを読む。追加で遷移した回数を `depth` に加算する
    async fn read_detail(
        &self,
        driver: &dyn PageDriver,
        depth: &mut u32,
    ) -> Result<Webtoon, CrawlerError> {
        if let Err(e) = driver.wait_for(TITLE, self.config.page_timeout).await {
            // 待機中にログインページへ飛ばされることがある
            let url = driver.current_url().await?;
            if url.contains(ADULT_GATE_HOST) {
                return Err(CrawlerError::AdultVerification(url));
            }
            log_debug_snapshot(driver, &self.config, "naver detail").await;
            return Err(e);
        }

        // タイトルが出るまではクライアント側の遷移が終わっていない
        let url = driver.current_url().await?;
        if url.contains(ADULT_GATE_HOST) {
            return Err(CrawlerError::AdultVerification(url));
        }

        // 折りたたまれたジャンルタグを展開
        if driver.count(GENRE_FOLD).await.unwrap_or(0) > 0 {
            if let Err(e) = driver.click_nth(GENRE_FOLD, 0).await {
                debug!("Genre fold button not clickable: {}", e);
            }
        }

        let html = driver.content().await?;
        let mut webtoon = Self::parse_detail(&html, &url)?;

        if self.config.fetch_start_date {
            let ascending = format!("{}&page=1&sort=ASC", webtoon.link);
            driver.goto(&ascending).await?;
            *depth += 1;

            match driver.wait_for(EPISODE_DATE, self.config.page_timeout).await {
                Ok(()) => {
                    let html = driver.content().await?;
                    webtoon.publish_start_date = Self::parse_first_episode_date(&html)?;
                }
                Err(e) => warn!("Start date not found for {}: {}", webtoon.title, e),
            }
        }

        Ok(webtoon)
    }
}

#[async_trait]
impl WebtoonScraper for NaverScraper {
    fn platform(&self) -> Platform {
        Platform::Naver
    }

    fn default_tabs(&self) -> Vec<ListingTab> {
        let mut tabs = ListingTab::weekdays();
        tabs.push(ListingTab::DailyPlus);
        tabs.push(ListingTab::Finished);
        tabs
    }

    fn listing_url(&self, tab: ListingTab) -> String {
        format!("{}?tab={}", LISTING_URL, tab)
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
        let fragment = driver.outer_html_nth(ITEM, index).await?;
        let summary = Self::parse_list_item(&fragment)?;
        debug!("Item {}: {:?}", index, summary);

        driver.click_nth(ITEM_TITLE_LINK, index).await?;
        let mut depth = 1;
        let result = self.read_detail(driver, &mut depth).await;
        return_to_listing(driver, depth, &self.config).await;

        let mut webtoon = result?;
        webtoon.platform_rating = summary.rating;
        Ok(webtoon)
    }

    async fn collect_detail_urls(
        &self,
        driver: &dyn PageDriver,
    ) -> Result<Vec<String>, CrawlerError> {
        let count = driver.count(ITEM_POSTER_LINK).await?;
        let mut urls: Vec<String> = Vec::with_capacity(count);

        for index in 0..count {
            let href = match driver.attribute_nth(ITEM_POSTER_LINK, index, "href").await {
                Ok(Some(href)) => href,
                Ok(None) => {
                    warn!("Poster link without href at {}", index);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read poster link {}: {}", index, e);
                    continue;
                }
            };
            if !href.contains("/webtoon/list") {
                continue;
            }
            let url = remove_query_param(&absolutize(BASE_URL, &href)?, "tab")?;
            if !urls.contains(&url) {
                urls.push(url);
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
        self.read_detail(driver, &mut depth).await
    }
}
