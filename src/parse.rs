//! HTML断片の解析ヘルパー

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::CrawlerError;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+").expect("valid regex"));

pub fn selector(css: &str) -> Result<Selector, CrawlerError> {
    Selector::parse(css).map_err(|e| CrawlerError::InvalidSelector(format!("{}: {}", css, e)))
}

/// 要素内のテキストノードを改行でつなぐ（空白のみのノードは除外）
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn select_first<'a>(
    root: ElementRef<'a>,
    css: &str,
) -> Result<Option<ElementRef<'a>>, CrawlerError> {
    let sel = selector(css)?;
    Ok(root.select(&sel).next())
}

pub fn text_of(root: ElementRef<'_>, css: &str) -> Result<Option<String>, CrawlerError> {
    Ok(select_first(root, css)?.map(element_text))
}

pub fn texts_of(root: ElementRef<'_>, css: &str) -> Result<Vec<String>, CrawlerError> {
    let sel = selector(css)?;
    Ok(root
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect())
}

pub fn attr_of(
    root: ElementRef<'_>,
    css: &str,
    attr: &str,
) -> Result<Option<String>, CrawlerError> {
    Ok(select_first(root, css)?.and_then(|el| el.value().attr(attr).map(str::to_string)))
}

/// 必須項目の欠落を解析エラーにする
pub fn require<T>(value: Option<T>, what: &str) -> Result<T, CrawlerError> {
    value.ok_or_else(|| CrawlerError::Parse(format!("{} が見つかりません", what)))
}

pub fn first_number(text: &str) -> Option<u32> {
    NUMBER.find(text).and_then(|m| m.as_str().parse().ok())
}

pub fn first_decimal(text: &str) -> Option<f64> {
    DECIMAL.find(text).and_then(|m| m.as_str().parse().ok())
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn remove_query_param(url: &str, name: &str) -> Result<String, CrawlerError> {
    let mut parsed =
        Url::parse(url).map_err(|e| CrawlerError::Parse(format!("URL {}: {}", url, e)))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok(parsed.to_string())
}

/// 相対リンクを絶対URLにする
pub fn absolutize(base: &str, href: &str) -> Result<String, CrawlerError> {
    let base = Url::parse(base).map_err(|e| CrawlerError::Parse(format!("URL {}: {}", base, e)))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| CrawlerError::Parse(format!("URL {}: {}", href, e)))
}

/// `24.03.15` 形式の日付
pub fn parse_short_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%y.%m.%d").ok()
}

/// タイトル要素の2行目以降（休載バッジ等）を除く
pub fn clean_title(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
