//! 取得結果の保存先

mod csv;
mod json;
mod url_list;

use async_trait::async_trait;

pub use self::csv::CsvRepository;
pub use self::json::JsonRepository;
pub use self::url_list::UrlListStore;

use crate::error::CrawlerError;
use crate::models::{FailedItem, Webtoon};

/// バッチごとに呼ばれる保存先
#[async_trait]
pub trait WebtoonRepository: Send + Sync {
    async fn append_success(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError>;

    async fn append_failure(&self, failures: &[FailedItem]) -> Result<(), CrawlerError>;
}

/// 何も保存しない（URL収集のみの実行など）
pub struct NullRepository;

#[async_trait]
impl WebtoonRepository for NullRepository {
    async fn append_success(&self, _webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
        Ok(())
    }

    async fn append_failure(&self, _failures: &[FailedItem]) -> Result<(), CrawlerError> {
        Ok(())
    }
}
