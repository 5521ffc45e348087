//! 外部APIへの送信

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CrawlerError;
use crate::models::{FailedItem, Webtoon};
use crate::repository::WebtoonRepository;
use crate::request::UpdateResult;
use crate::retry::RetryPolicy;

/// API設定
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub webtoons_path: String,
    pub updates_path: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            webtoons_path: "/api/admin/webtoons".to_string(),
            updates_path: "/api/admin/webtoons/updates".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
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

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// 2xx 以外は `ApiStatus`
fn check_status(status: u16, body: String) -> Result<(), CrawlerError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(CrawlerError::ApiStatus { status, body })
    }
}

pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, CrawlerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let policy = RetryPolicy::new(config.max_retries, config.initial_backoff);
        Ok(Self {
            client,
            config,
            policy,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn post_json<T: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), CrawlerError> {
        let url = self.config.endpoint(path);
        let url = url.as_str();

        self.policy
            .run(&format!("POST {}", url), |_| async move {
                let response = self.client.post(url).json(body).send().await?;
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                check_status(status, text)
            })
            .await
    }

    pub async fn post_webtoons(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
        if webtoons.is_empty() {
            return Ok(());
        }
        self.post_json(&self.config.webtoons_path, webtoons).await?;
        info!("Sent {} webtoons to API", webtoons.len());
        Ok(())
    }

    pub async fn post_update_results(&self, results: &[UpdateResult]) -> Result<(), CrawlerError> {
        if results.is_empty() {
            return Ok(());
        }
        self.post_json(&self.config.updates_path, results).await?;
        info!("Sent {} update results to API", results.len());
        Ok(())
    }

    /// 保存済みJSONファイルの作品をまとめて送る
    pub async fn push_file(&self, path: &Path) -> Result<usize, CrawlerError> {
        let text = tokio::fs::read_to_string(path).await?;
        let webtoons: Vec<Webtoon> = serde_json::from_str(&text)?;
        debug!("Loaded {} webtoons from {}", webtoons.len(), path.display());

        self.post_webtoons(&webtoons).await?;
        Ok(webtoons.len())
    }
}

/// バッチごとにAPIへ送る保存先
pub struct ApiSink {
    client: ApiClient,
}

impl ApiSink {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebtoonRepository for ApiSink {
    async fn append_success(&self, webtoons: &[Webtoon]) -> Result<(), CrawlerError> {
        self.client.post_webtoons(webtoons).await
    }

    async fn append_failure(&self, failures: &[FailedItem]) -> Result<(), CrawlerError> {
        for failure in failures {
            warn!("Not sent: {} ({})", failure.url, failure.reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_webtoon;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// リクエスト1件（ヘッダとボディ）を読む
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// `statuses` を順に1接続ずつ返すサーバー。受け取ったリクエストを記録する
    async fn stub_server(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);

                let body = "{}";
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), requests)
    }

    fn client_for(base_url: &str) -> ApiClient {
        ApiClient::new(
            ApiConfig::new(base_url)
                .with_timeout(Duration::from_secs(5))
                .with_initial_backoff(Duration::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint() {
        let config = ApiConfig::new("http://localhost:8080/");
        assert_eq!(
            config.endpoint(&config.webtoons_path),
            "http://localhost:8080/api/admin/webtoons"
        );
        assert_eq!(
            config.endpoint("api/admin/webtoons/updates"),
            "http://localhost:8080/api/admin/webtoons/updates"
        );
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(201, String::new()).is_ok());

        let err = check_status(503, "busy".into()).unwrap_err();
        assert!(err.is_retryable());
        let err = check_status(400, "bad".into()).unwrap_err();
        assert!(!err.is_retryable());
        assert!(matches!(err, CrawlerError::ApiStatus { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_empty_batches_skip_network() {
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:9")).unwrap();
        client.post_webtoons(&[]).await.unwrap();
        client.post_update_results(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_file_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webtoons.json");
        std::fs::write(&path, "[{").unwrap();

        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:9")).unwrap();
        let err = client.push_file(&path).await.unwrap_err();
        assert!(matches!(err, CrawlerError::Json(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (base_url, requests) = stub_server(vec![503, 429, 201]).await;
        let client = client_for(&base_url);

        client
            .post_webtoons(&[sample_webtoon(1, "A")])
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].starts_with("POST /api/admin/webtoons HTTP/1.1"));
        assert!(requests[2].contains("\"externalId\":1"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base_url, requests) = stub_server(vec![400]).await;
        let client = client_for(&base_url);

        let err = client
            .post_webtoons(&[sample_webtoon(1, "A")])
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlerError::ApiStatus { status: 400, .. }));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_on_persistent_errors() {
        let (base_url, requests) = stub_server(vec![503, 503]).await;
        let client = ApiClient::new(
            ApiConfig::new(&base_url)
                .with_max_retries(2)
                .with_initial_backoff(Duration::ZERO),
        )
        .unwrap();

        let err = client
            .post_webtoons(&[sample_webtoon(1, "A")])
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlerError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_forwards_batches() {
        let (base_url, requests) = stub_server(vec![201]).await;
        let sink = ApiSink::new(client_for(&base_url));

        sink.append_success(&[sample_webtoon(7, "A"), sample_webtoon(8, "B")])
            .await
            .unwrap();
        sink.append_failure(&[FailedItem::new("https://x", "timeout")])
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let body = &requests[0][requests[0].find("\r\n\r\n").unwrap() + 4..];
        let sent: Vec<Webtoon> = serde_json::from_str(body).unwrap();
        assert_eq!(
            sent.iter().map(|w| w.external_id).collect::<Vec<_>>(),
            vec![7, 8]
        );
    }
}
