use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::WebtoonRepository;
use crate::error::CrawlerError;
use crate::models::{FailedItem, Webtoon};

/// CSV一行分
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebtoonRow {
    external_id: u64,
    platform: String,
    title: String,
    days_of_week: String,
    link: String,
    thumbnail_url: String,
    age_rating: String,
    serialization_status: String,
    episode_count: String,
    platform_rating: String,
    publish_start_date: String,
    last_updated_date: String,
    authors: String,
    genres: String,
    description: String,
}

fn to_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn opt_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl From<&Webtoon> for WebtoonRow {
    fn from(w: &Webtoon) -> Self {
        let authors = w
            .authors
            .iter()
            .map(|a| match &a.role {
                Some(role) => format!("{}({})", a.name, to_label(role)),
                None => a.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(";");

        Self {
            external_id: w.external_id,
            platform: to_label(&w.platform),
            title: w.title.clone(),
            days_of_week: w
                .days_of_week
                .iter()
                .map(to_label)
                .collect::<Vec<_>>()
                .join(";"),
            link: w.link.clone(),
            thumbnail_url: w.thumbnail_url.clone().unwrap_or_default(),
            age_rating: w.age_rating.as_ref().map(to_label).unwrap_or_default(),
            serialization_status: to_label(&w.serialization_status),
            episode_count: opt_string(w.episode_count),
            platform_rating: opt_string(w.platform_rating),
            publish_start_date: opt_string(w.publish_start_date),
            last_updated_date: opt_string(w.last_updated_date),
            authors,
            genres: w.genres.join(";"),
            description: w.description.clone(),
        }
    }
}

/// 作品をCSVに追記する。既に同じexternalIdの行があれば書かない
pub struct CsvRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn existing_ids(&self) -> Result<HashSet<u64>, CrawlerError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut ids = HashSet::new();
        for row in reader.deserialize::<WebtoonRow>() {
            match row {
                Ok(row) => {
                    ids.insert(row.external_id);
                }
                Err(e) => warn!("Skipping unreadable row in {}: {}", self.path.display(), e),
            }
        }
        Ok(ids)
    }

    fn write_rows(&self, webtoons: &[Webtoon]) -> Result<usize, CrawlerError> {
        let mut seen = self.existing_ids()?;
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        let mut written = 0;
        for webtoon in webtoons {
            if !seen.insert(webtoon.external_id) {
                continue;
            }
            writer.serialize(WebtoonRow::from(webtoon))?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }
}

#[async_trait]
impl WebtoonRepository for CsvRepository {
    async fn append_success(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
        let _guard = self.lock.lock().await;
        let written = self.write_rows(webtoons)?;
        debug!(
            "Wrote {} of {} rows to {}",
            written,
            webtoons.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn append_failure(&self, failures: &[FailedItem]) -> Result<(), CrawlerError> {
        for failure in failures {
            warn!("Not saved to CSV: {} ({})", failure.url, failure.reason);
        }
        Ok(())
    }
}
