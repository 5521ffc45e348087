use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::CrawlerError;

/// 詳細ページURLの一覧ファイル（1行1URL）
#[derive(Debug, Clone)]
pub struct UrlListStore {
    path: PathBuf,
    urls: BTreeSet<String>,
}

impl UrlListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            urls: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルを読み込む。存在して1件以上あれば true
    pub fn load(&mut self) -> Result<bool, CrawlerError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        self.urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );

        if self.urls.is_empty() {
            warn!("URL list {} is empty", self.path.display());
            return Ok(false);
        }
        info!("Loaded {} URLs from {}", self.urls.len(), self.path.display());
        Ok(true)
    }

    /// 追加した件数を返す
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, urls: I) -> usize {
        let before = self.urls.len();
        self.urls.extend(urls);
        self.urls.len() - before
    }

    pub fn save(&self) -> Result<(), CrawlerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut body = self.urls.iter().cloned().collect::<Vec<_>>().join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        std::fs::write(&self.path, body)?;
        info!("Saved {} URLs to {}", self.urls.len(), self.path.display());
        Ok(())
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
