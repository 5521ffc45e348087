//! 更新リクエスト（キューのメッセージ形式）

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CrawlerError;
use crate::models::{Platform, Webtoon};

fn default_action() -> String {
    "update".to_string()
}

/// 更新対象の作品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub id: String,
    pub platform: Platform,
    pub url: String,
}

/// 作品更新リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub request_id: String,
    pub requests: Vec<UpdateTarget>,
    #[serde(default = "default_action")]
    pub request_action: String,
}

/// 対象とクロール結果の組
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub webtoon_id: String,
    pub platform: Platform,
    pub webtoon_data: Webtoon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateStatus {
    Success,
    Failed,
}

/// 1リクエストの処理結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub request_id: String,
    pub status: UpdateStatus,
    pub error: Option<String>,
    pub updated_count: usize,
    pub browser_ok: bool,
}

impl UpdateSummary {
    pub fn success(request_id: impl Into<String>, updated_count: usize) -> Self {
        Self {
            request_id: request_id.into(),
            status: UpdateStatus::Success,
            error: None,
            updated_count,
            browser_ok: true,
        }
    }

    pub fn failed(request_id: impl Into<String>, error: impl ToString, browser_ok: bool) -> Self {
        Self {
            request_id: request_id.into(),
            status: UpdateStatus::Failed,
            error: Some(error.to_string()),
            updated_count: 0,
            browser_ok,
        }
    }
}

/// 比較用にURLを正規化する（`titleId` 以外のクエリとフラグメントを落とす）
pub fn normalize_link(link: &str) -> String {
    let Ok(mut url) = Url::parse(link.trim()) else {
        return link.trim().trim_end_matches('/').to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k == "titleId")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_fragment(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    url.to_string().trim_end_matches('/').to_string()
}

impl UpdateRequest {
    pub fn parse(json: &str) -> Result<Self, CrawlerError> {
        let request: UpdateRequest = serde_json::from_str(json)
            .map_err(|e| CrawlerError::InvalidRequest(format!("メッセージ形式が不正: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), CrawlerError> {
        if self.request_id.trim().is_empty() {
            return Err(CrawlerError::InvalidRequest("requestId が空です".into()));
        }
        if self.requests.is_empty() {
            return Err(CrawlerError::InvalidRequest("requests が空です".into()));
        }

        for target in &self.requests {
            let url = Url::parse(&target.url).map_err(|e| {
                CrawlerError::InvalidRequest(format!("URLが不正: {} ({})", target.url, e))
            })?;
            let host = url.host_str().unwrap_or_default();
            if !target.platform.owns_host(host) {
                return Err(CrawlerError::InvalidRequest(format!(
                    "{} は {} のURLではありません",
                    target.url, target.platform
                )));
            }
        }
        Ok(())
    }

    /// 単一プラットフォームのみ対応
    pub fn platform(&self) -> Result<Platform, CrawlerError> {
        let first = self
            .requests
            .first()
            .map(|t| t.platform)
            .ok_or_else(|| CrawlerError::InvalidRequest("requests が空です".into()))?;
        if self.requests.iter().any(|t| t.platform != first) {
            return Err(CrawlerError::InvalidRequest(
                "複数プラットフォームの混在はできません".into(),
            ));
        }
        Ok(first)
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.iter().map(|t| t.url.clone()).collect()
    }

    /// クロール結果を対象と突き合わせる。対応が無い結果は捨てる
    pub fn match_results(&self, webtoons: &[Webtoon]) -> Vec<UpdateResult> {
        webtoons
            .iter()
            .filter_map(|webtoon| {
                let link = normalize_link(&webtoon.link);
                self.requests
                    .iter()
                    .find(|t| t.platform == webtoon.platform && normalize_link(&t.url) == link)
                    .map(|t| UpdateResult {
                        webtoon_id: t.id.clone(),
                        platform: t.platform,
                        webtoon_data: webtoon.clone(),
                    })
            })
            .collect()
    }
}
