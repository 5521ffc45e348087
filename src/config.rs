use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// ヘッドレスモード
    pub headless: bool,
    /// Chrome実行ファイル（未指定ならchromiumoxideの自動検出）
    pub chrome_path: Option<String>,
    /// 要素待機のタイムアウト
    pub page_timeout: Duration,
    /// 戻る操作の後の待機
    pub settle_delay: Duration,
    /// 無限スクロールの読み込み待機
    pub scroll_pause: Duration,
    pub max_scroll_rounds: u32,
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// 一覧ごとの取得上限（デバッグ用）
    pub max_items_per_listing: Option<usize>,
    /// 第1話の日付を取得するため昇順ページを追加で開くか
    pub fetch_start_date: bool,
    /// デバッグモード（失敗時にスクリーンショットをログ出力）
    pub debug: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: std::env::var("CHROME_PATH")
                .or_else(|_| std::env::var("CHROMIUM_PATH"))
                .ok(),
            page_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(500),
            scroll_pause: Duration::from_millis(1500),
            max_scroll_rounds: 50,
            batch_size: 10,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_items_per_listing: None,
            fetch_start_date: true,
            debug: false,
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_scroll_pause(mut self, pause: Duration) -> Self {
        self.scroll_pause = pause;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_items_per_listing(mut self, limit: Option<usize>) -> Self {
        self.max_items_per_listing = limit;
        self
    }

    pub fn with_fetch_start_date(mut self, fetch: bool) -> Self {
        self.fetch_start_date = fetch;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff)
    }
}
