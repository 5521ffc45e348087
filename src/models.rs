//! ウェブトゥーン関連の型定義

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CrawlerError;

/// 配信プラットフォーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Naver,
    Kakao,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Naver => "naver",
            Platform::Kakao => "kakao",
        }
    }

    /// このプラットフォームのホストか
    pub fn owns_host(&self, host: &str) -> bool {
        match self {
            Platform::Naver => host == "comic.naver.com" || host == "m.comic.naver.com",
            Platform::Kakao => host == "webtoon.kakao.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naver" => Ok(Platform::Naver),
            "kakao" => Ok(Platform::Kakao),
            other => Err(CrawlerError::InvalidRequest(format!(
                "未対応のプラットフォーム: {}",
                other
            ))),
        }
    }
}

/// 連載曜日
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn from_korean(day: &str) -> Option<Self> {
        match day.trim() {
            "월" => Some(DayOfWeek::Monday),
            "화" => Some(DayOfWeek::Tuesday),
            "수" => Some(DayOfWeek::Wednesday),
            "목" => Some(DayOfWeek::Thursday),
            "금" => Some(DayOfWeek::Friday),
            "토" => Some(DayOfWeek::Saturday),
            "일" => Some(DayOfWeek::Sunday),
            _ => None,
        }
    }

    /// `월요웹툰 ∙ 15세 이용가` や `토, 일` のようなメタ文字列から曜日を拾う
    pub fn parse_all(text: &str) -> Vec<Self> {
        let mut days: Vec<DayOfWeek> = text
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | '∙' | '·' | '/' | '|'))
            .filter_map(|token| {
                let mut chars = token.chars();
                let first = chars.next()?;
                let rest = chars.as_str();
                if rest.is_empty() || rest.starts_with('요') {
                    Self::from_korean(first.encode_utf8(&mut [0u8; 4]))
                } else {
                    None
                }
            })
            .collect();
        days.sort();
        days.dedup();
        days
    }

    /// 一覧ページの `tab=` に使うキー
    pub fn tab_key(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "mon",
            DayOfWeek::Tuesday => "tue",
            DayOfWeek::Wednesday => "wed",
            DayOfWeek::Thursday => "thu",
            DayOfWeek::Friday => "fri",
            DayOfWeek::Saturday => "sat",
            DayOfWeek::Sunday => "sun",
        }
    }

    pub fn from_tab_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.tab_key() == key)
    }
}

/// 年齢制限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRating {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "AGE_12")]
    Age12,
    #[serde(rename = "AGE_15")]
    Age15,
    #[serde(rename = "ADULT")]
    Adult,
}

impl AgeRating {
    /// メタ情報の文字列中のラベルから判定
    pub fn from_label(text: &str) -> Option<Self> {
        if text.contains("전체연령가") {
            Some(AgeRating::All)
        } else if text.contains("12세") {
            Some(AgeRating::Age12)
        } else if text.contains("15세") {
            Some(AgeRating::Age15)
        } else if text.contains("19세") {
            Some(AgeRating::Adult)
        } else {
            None
        }
    }
}

/// 連載状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerializationStatus {
    #[default]
    Ongoing,
    Hiatus,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorRole {
    Writer,
    Artist,
    Both,
    Original,
}

impl AuthorRole {
    pub fn from_korean(role: &str) -> Option<Self> {
        match role.trim().trim_end_matches('.') {
            "글" => Some(AuthorRole::Writer),
            "그림" => Some(AuthorRole::Artist),
            "글/그림" | "글∙그림" => Some(AuthorRole::Both),
            "원작" => Some(AuthorRole::Original),
            _ => None,
        }
    }
}

/// 作者情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<String>,
    pub name: String,
    pub role: Option<AuthorRole>,
    pub link: Option<String>,
}

/// 作品レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webtoon {
    pub external_id: u64,
    pub platform: Platform,
    pub title: String,
    #[serde(default)]
    pub days_of_week: Vec<DayOfWeek>,
    pub thumbnail_url: Option<String>,
    pub link: String,
    pub age_rating: Option<AgeRating>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub serialization_status: SerializationStatus,
    pub episode_count: Option<u32>,
    pub platform_rating: Option<f64>,
    pub publish_start_date: Option<NaiveDate>,
    pub last_updated_date: Option<NaiveDate>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl Webtoon {
    /// 曜日を追加（重複なし・曜日順）
    pub fn add_day(&mut self, day: DayOfWeek) {
        if !self.days_of_week.contains(&day) {
            self.days_of_week.push(day);
            self.days_of_week.sort();
        }
    }

    /// 別の曜日タブで見つかった同じ作品をまとめる
    pub fn merge(&mut self, other: &Webtoon) {
        for day in &other.days_of_week {
            self.add_day(*day);
        }
        if self.thumbnail_url.is_none() {
            self.thumbnail_url = other.thumbnail_url.clone();
        }
        if self.age_rating.is_none() {
            self.age_rating = other.age_rating;
        }
        if self.episode_count.is_none() {
            self.episode_count = other.episode_count;
        }
        if self.platform_rating.is_none() {
            self.platform_rating = other.platform_rating;
        }
        if self.publish_start_date.is_none() {
            self.publish_start_date = other.publish_start_date;
        }
        if self.last_updated_date.is_none() {
            self.last_updated_date = other.last_updated_date;
        }
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.genres.is_empty() {
            self.genres = other.genres.clone();
        }
    }
}

/// 一覧ページのタブ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingTab {
    Day(DayOfWeek),
    DailyPlus,
    Finished,
}

impl ListingTab {
    pub fn day(&self) -> Option<DayOfWeek> {
        match self {
            ListingTab::Day(day) => Some(*day),
            _ => None,
        }
    }

    pub fn weekdays() -> Vec<ListingTab> {
        DayOfWeek::ALL.into_iter().map(ListingTab::Day).collect()
    }
}

impl fmt::Display for ListingTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingTab::Day(day) => f.write_str(day.tab_key()),
            ListingTab::DailyPlus => f.write_str("dailyPlus"),
            ListingTab::Finished => f.write_str("finish"),
        }
    }
}

impl FromStr for ListingTab {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        if let Some(day) = DayOfWeek::from_tab_key(&key.to_ascii_lowercase()) {
            return Ok(ListingTab::Day(day));
        }
        match key {
            "dailyPlus" | "dailyplus" => Ok(ListingTab::DailyPlus),
            "finish" | "complete" | "finished" => Ok(ListingTab::Finished),
            other => Err(CrawlerError::InvalidRequest(format!("不明なタブ: {}", other))),
        }
    }
}

/// 取得に失敗した項目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub reason: String,
}

impl FailedItem {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: None,
            reason: reason.into(),
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

#[cfg(test)]
pub(crate) fn sample_webtoon(external_id: u64, title: &str) -> Webtoon {
    Webtoon {
        external_id,
        platform: Platform::Naver,
        title: title.to_string(),
        days_of_week: Vec::new(),
        thumbnail_url: None,
        link: format!("https://comic.naver.com/webtoon/list?titleId={}", external_id),
        age_rating: None,
        description: String::new(),
        serialization_status: SerializationStatus::Ongoing,
        episode_count: None,
        platform_rating: None,
        publish_start_date: None,
        last_updated_date: None,
        authors: Vec::new(),
        genres: Vec::new(),
    }
}
