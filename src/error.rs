use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    /// 一覧が再描画され、取得済みの要素が無効になった
    #[error("要素が無効になりました: {0}")]
    StaleElement(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("HTML解析エラー: {0}")]
    Parse(String),

    #[error("成人認証が必要です: {0}")]
    AdultVerification(String),

    #[error("不正なセレクタ: {0}")]
    InvalidSelector(String),

    #[error("不正なリクエスト: {0}")]
    InvalidRequest(String),

    #[error("API送信エラー: {0}")]
    Api(String),

    #[error("APIエラー応答: status={status}, body={body}")]
    ApiStatus { status: u16, body: String },

    #[error("{attempts}回リトライしても失敗: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),
}

impl CrawlerError {
    /// リトライで回復し得るエラーか
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlerError::StaleElement(_)
            | CrawlerError::Timeout(_)
            | CrawlerError::Navigation(_) => true,
            CrawlerError::ApiStatus { status, .. } => *status == 429 || *status >= 500,
            CrawlerError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
