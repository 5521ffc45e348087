use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::WebtoonRepository;
use crate::error::CrawlerError;
use crate::models::{FailedItem, Webtoon};

/// 成功・失敗をそれぞれJSON配列ファイルに追記する
pub struct JsonRepository {
    success_path: PathBuf,
    failure_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonRepository {
    pub fn new(success_path: impl Into<PathBuf>, failure_path: impl Into<PathBuf>) -> Self {
        Self {
            success_path: success_path.into(),
            failure_path: failure_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn success_path(&self) -> &Path {
        &self.success_path
    }

    pub fn failure_path(&self) -> &Path {
        &self.failure_path
    }

    /// 保存済みの作品一覧を読む
    pub async fn load_webtoons(&self) -> Vec<Webtoon> {
        load_array(&self.success_path).await
    }

    pub async fn load_failures(&self) -> Vec<FailedItem> {
        load_array(&self.failure_path).await
    }
}

/// 無い・空・壊れたファイルは空配列として扱う
async fn load_array<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(&text) {
        Ok(items) => items,
        Err(e) => {
            warn!("Ignoring invalid JSON in {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

async fn write_array<T: Serialize>(path: &Path, items: &[T]) -> Result<(), CrawlerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(items)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[async_trait]
impl WebtoonRepository for JsonRepository {
    async fn append_success(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
        if webtoons.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;

        let mut stored: Vec<Webtoon> = load_array(&self.success_path).await;
        for webtoon in webtoons {
            match stored
                .iter_mut()
                .find(|w| w.external_id == webtoon.external_id)
            {
                Some(existing) => existing.merge(webtoon),
                None => stored.push(webtoon.clone()),
            }
        }

        write_array(&self.success_path, &stored).await?;
        debug!(
            "Saved {} webtoons to {} ({} total)",
            webtoons.len(),
            self.success_path.display(),
            stored.len()
        );
        Ok(())
    }

    async fn append_failure(&self, failures: &[FailedItem]) -> Result<(), CrawlerError> {
        if failures.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;

        let mut stored: Vec<FailedItem> = load_array(&self.failure_path).await;
        for failure in failures {
            // 一覧URL + インデックスで区別する
            if !stored
                .iter()
                .any(|f| f.url == failure.url && f.index == failure.index)
            {
                stored.push(failure.clone());
            }
        }

        write_array(&self.failure_path, &stored).await?;
        debug!(
            "Saved {} failures to {}",
            failures.len(),
            self.failure_path.display()
        );
        Ok(())
    }
}
