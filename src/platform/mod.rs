//! プラットフォーム別スクレイパー

mod kakao;
mod naver;

use tokio::time::sleep;
use tracing::{debug, warn};

pub use kakao::KakaoScraper;
pub use naver::NaverScraper;

#[cfg(test)]
pub(crate) use naver::fixtures as naver_fixtures;

use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::models::Platform;
use crate::traits::{PageDriver, WebtoonScraper};

/// プラットフォームに応じたスクレイパーを生成
pub fn create_scraper(platform: Platform, config: &CrawlerConfig) -> Box<dyn WebtoonScraper> {
    match platform {
        Platform::Naver => Box::new(NaverScraper::new(config.clone())),
        Platform::Kakao => Box::new(KakaoScraper::new(config.clone())),
    }
}

/// 高さが変わらなくなるまでスクロールして遅延読み込みを出し切る
pub(crate) async fn scroll_until_stable(
    driver: &dyn PageDriver,
    config: &CrawlerConfig,
) -> Result<u64, CrawlerError> {
    let mut last_height = driver.scroll_to_bottom().await?;

    for round in 0..config.max_scroll_rounds {
        sleep(config.scroll_pause).await;
        let height = driver.scroll_to_bottom().await?;
        if height == last_height {
            debug!("Scroll height stable at {} after {} rounds", height, round + 1);
            return Ok(height);
        }
        last_height = height;
    }

    warn!(
        "Scroll height still growing after {} rounds",
        config.max_scroll_rounds
    );
    Ok(last_height)
}

/// 詳細ページから `depth` 回戻って一覧に復帰する。失敗してもログのみ
pub(crate) async fn return_to_listing(driver: &dyn PageDriver, depth: u32, config: &CrawlerConfig) {
    for _ in 0..depth {
        if let Err(e) = driver.back().await {
            warn!("Failed to navigate back: {}", e);
        }
    }
    sleep(config.settle_delay).await;
}

/// デバッグモード時、失敗したページのスナップショットをログに残す
pub(crate) async fn log_debug_snapshot(
    driver: &dyn PageDriver,
    config: &CrawlerConfig,
    context: &str,
) {
    if !config.debug {
        return;
    }
    if let Some(snapshot) = driver.debug_snapshot().await {
        debug!("{} snapshot: {}", context, snapshot);
    }
}
