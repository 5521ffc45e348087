//! chromiumoxide による `PageDriver` 実装

use std::fmt::Display;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::traits::PageDriver;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// CDPエラーを分類する。ノード消失は再描画による無効化とみなす
fn cdp_error(context: &str, e: impl Display) -> CrawlerError {
    let message = format!("{}: {}", context, e);
    let lower = message.to_lowercase();
    if lower.contains("detached")
        || lower.contains("no node")
        || lower.contains("could not find node")
        || lower.contains("cannot find context")
        || lower.contains("execution context was destroyed")
    {
        CrawlerError::StaleElement(message)
    } else {
        CrawlerError::JavaScript(message)
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// `index` 番目の要素に対して `body` を評価するスクリプト。要素が無ければ `{stale: true}`
fn nth_script(selector: &str, index: usize, body: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({sel})[{index}]; \
         if (!el) return {{ stale: true, value: null }}; \
         return {{ stale: false, value: ({body}) }}; }})()",
        sel = js_string(selector),
    )
}

#[derive(serde::Deserialize)]
struct NthResult<T> {
    stale: bool,
    value: Option<T>,
}

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    config: CrawlerConfig,
}

impl ChromeDriver {
    /// ブラウザを起動して空のページを1枚開く
    pub async fn launch(config: &CrawlerConfig) -> Result<Self, CrawlerError> {
        info!("Launching browser...");

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("webtoon-crawler-{}", unique_id));

        let mut builder = BrowserConfig::builder().user_data_dir(&user_data_dir);
        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=ko-KR");

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder.build().map_err(CrawlerError::BrowserInit)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CrawlerError::BrowserInit(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlerError::BrowserInit(e.to_string()))?;

        info!("Browser launched");
        Ok(Self {
            browser,
            page,
            handler,
            config: config.clone(),
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, CrawlerError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| cdp_error("evaluate", e))?;
        result
            .into_value::<T>()
            .map_err(|e| CrawlerError::JavaScript(e.to_string()))
    }

    async fn eval_nth<T: DeserializeOwned>(
        &self,
        selector: &str,
        index: usize,
        body: &str,
    ) -> Result<Option<T>, CrawlerError> {
        let result: NthResult<T> = self.eval(&nth_script(selector, index, body)).await?;
        if result.stale {
            return Err(CrawlerError::StaleElement(format!("{}[{}]", selector, index)));
        }
        Ok(result.value)
    }

    /// `document.readyState` が complete になるまで待つ
    async fn wait_ready(&self) -> Result<(), CrawlerError> {
        let started = Instant::now();
        loop {
            let state: String = self
                .eval("document.readyState")
                .await
                .unwrap_or_default();
            if state == "complete" {
                return Ok(());
            }
            if started.elapsed() > self.config.page_timeout {
                return Err(CrawlerError::Timeout(format!(
                    "readyState={} ({:?})",
                    state, self.config.page_timeout
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn close(mut self) -> Result<(), CrawlerError> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError> {
        debug!("goto {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| CrawlerError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, CrawlerError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| cdp_error("url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), CrawlerError> {
        let started = Instant::now();
        loop {
            if self.count(selector).await.unwrap_or(0) > 0 {
                return Ok(());
            }
            if started.elapsed() > timeout {
                return Err(CrawlerError::Timeout(format!(
                    "{} ({:?})",
                    selector, timeout
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize, CrawlerError> {
        self.eval(&format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        ))
        .await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), CrawlerError> {
        self.eval_nth::<bool>(
            selector,
            index,
            "(el.scrollIntoView({block: 'center'}), el.click(), true)",
        )
        .await?;
        sleep(self.config.settle_delay).await;
        self.wait_ready().await
    }

    async fn attribute_nth(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, CrawlerError> {
        self.eval_nth(
            selector,
            index,
            &format!("el.getAttribute({})", js_string(name)),
        )
        .await
    }

    async fn outer_html_nth(&self, selector: &str, index: usize) -> Result<String, CrawlerError> {
        let html: Option<String> = self.eval_nth(selector, index, "el.outerHTML").await?;
        Ok(html.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, CrawlerError> {
        self.page
            .content()
            .await
            .map_err(|e| cdp_error("content", e))
    }

    async fn back(&self) -> Result<(), CrawlerError> {
        let _: bool = self.eval("(history.back(), true)").await?;
        sleep(POLL_INTERVAL).await;
        self.wait_ready().await
    }

    async fn scroll_to_bottom(&self) -> Result<u64, CrawlerError> {
        let height: f64 = self
            .eval(
                "(window.scrollTo(0, document.body.scrollHeight), document.body.scrollHeight)",
            )
            .await?;
        Ok(height as u64)
    }

    async fn debug_snapshot(&self) -> Option<String> {
        match self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(png) => Some(format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&png)
            )),
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                None
            }
        }
    }
}
