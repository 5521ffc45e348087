//! テスト用のインメモリブラウザ
//!
//! ページHTMLを `scraper` で評価し、リンクのクリック・戻る操作・障害注入を再現する。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html};

use crate::error::CrawlerError;
use crate::parse::{absolutize, selector};
use crate::traits::PageDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Goto,
    WaitFor,
    Click,
    OuterHtml,
    Back,
    Count,
}

#[derive(Default)]
struct MockState {
    pages: HashMap<String, String>,
    // 戻る操作で着いたときだけ表示するHTML（次の goto で元に戻る）
    pages_after_back: HashMap<String, String>,
    shown: HashMap<String, String>,
    lagging_url: bool,
    previous_url: Option<String>,
    redirects: HashMap<String, String>,
    history: Vec<String>,
    failures: HashMap<MockOp, VecDeque<Option<CrawlerError>>>,
    scroll_heights: VecDeque<u64>,
    last_height: u64,
    scrolls: usize,
    visits: Vec<String>,
    clicks: Vec<(String, usize)>,
}

#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.add_page(url, html);
        self
    }

    pub fn add_page(&self, url: &str, html: &str) {
        let mut state = self.state.lock().unwrap();
        state.pages.insert(url.to_string(), html.to_string());
    }

    pub fn with_redirect(self, from: &str, to: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.redirects.insert(from.to_string(), to.to_string());
        }
        self
    }

    /// 次の `op` 呼び出しを `error` で失敗させる
    pub fn fail_next(&self, op: MockOp, error: CrawlerError) {
        self.fail_after(op, 0, error);
    }

    /// `skip` 回成功させた後の `op` 呼び出しを失敗させる
    pub fn fail_after(&self, op: MockOp, skip: usize, error: CrawlerError) {
        let mut state = self.state.lock().unwrap();
        let queue = state.failures.entry(op).or_default();
        queue.extend((0..skip).map(|_| None));
        queue.push_back(Some(error));
    }

    /// 戻る操作で `url` に着いたとき `html` を表示する
    pub fn with_page_after_back(self, url: &str, html: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .pages_after_back
                .insert(url.to_string(), html.to_string());
        }
        self
    }

    /// クリックで遷移した直後は `wait_for` が呼ばれるまで遷移前のURLを返す
    pub fn with_lagging_url(self) -> Self {
        self.state.lock().unwrap().lagging_url = true;
        self
    }

    pub fn with_scroll_heights(self, heights: &[u64]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.scroll_heights = heights.iter().copied().collect();
        }
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().unwrap().visits.clone()
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    fn take_failure(&self, op: MockOp) -> Result<(), CrawlerError> {
        let mut state = self.state.lock().unwrap();
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn navigate(state: &mut MockState, url: &str) {
        let target = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        state.shown.remove(&target);
        state.visits.push(target.clone());
        state.history.push(target);
    }

    fn current_html(state: &MockState) -> String {
        state
            .history
            .last()
            .and_then(|url| state.shown.get(url).or_else(|| state.pages.get(url)))
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }

    fn count_now(&self, css: &str) -> Result<usize, CrawlerError> {
        let html = {
            let state = self.state.lock().unwrap();
            Self::current_html(&state)
        };
        let doc = Html::parse_document(&html);
        let sel = selector(css)?;
        let count = doc.select(&sel).count();
        Ok(count)
    }

    fn with_nth<T>(
        &self,
        css: &str,
        index: usize,
        f: impl FnOnce(ElementRef<'_>) -> T,
    ) -> Result<T, CrawlerError> {
        let html = {
            let state = self.state.lock().unwrap();
            Self::current_html(&state)
        };
        let doc = Html::parse_document(&html);
        let sel = selector(css)?;
        let element = doc
            .select(&sel)
            .nth(index)
            .ok_or_else(|| CrawlerError::StaleElement(format!("{}[{}]", css, index)))?;
        Ok(f(element))
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn goto(&self, url: &str) -> Result<(), CrawlerError> {
        self.take_failure(MockOp::Goto)?;
        let mut state = self.state.lock().unwrap();
        state.previous_url = None;
        Self::navigate(&mut state, url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, CrawlerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .previous_url
            .clone()
            .or_else(|| state.history.last().cloned())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), CrawlerError> {
        self.state.lock().unwrap().previous_url = None;
        self.take_failure(MockOp::WaitFor)?;
        if self.count_now(selector)? > 0 {
            Ok(())
        } else {
            Err(CrawlerError::Timeout(selector.to_string()))
        }
    }

    async fn count(&self, css: &str) -> Result<usize, CrawlerError> {
        self.take_failure(MockOp::Count)?;
        self.count_now(css)
    }

    async fn click_nth(&self, css: &str, index: usize) -> Result<(), CrawlerError> {
        self.take_failure(MockOp::Click)?;
        let href = self.with_nth(css, index, |el| {
            el.value().attr("href").map(str::to_string).or_else(|| {
                let a = scraper::Selector::parse("a[href]").ok()?;
                el.select(&a)
                    .next()
                    .and_then(|link| link.value().attr("href"))
                    .map(str::to_string)
            })
        })?;

        let mut state = self.state.lock().unwrap();
        state.clicks.push((css.to_string(), index));
        if let Some(href) = href {
            let base = state
                .history
                .last()
                .cloned()
                .unwrap_or_else(|| "https://localhost/".to_string());
            let target = absolutize(&base, &href)?;
            if state.lagging_url {
                state.previous_url = Some(base);
            }
            Self::navigate(&mut state, &target);
        }
        Ok(())
    }

    async fn attribute_nth(
        &self,
        css: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, CrawlerError> {
        self.with_nth(css, index, |el| el.value().attr(name).map(str::to_string))
    }

    async fn outer_html_nth(&self, css: &str, index: usize) -> Result<String, CrawlerError> {
        self.take_failure(MockOp::OuterHtml)?;
        self.with_nth(css, index, |el| el.html())
    }

    async fn content(&self) -> Result<String, CrawlerError> {
        let state = self.state.lock().unwrap();
        Ok(Self::current_html(&state))
    }

    async fn back(&self) -> Result<(), CrawlerError> {
        self.take_failure(MockOp::Back)?;
        let mut state = self.state.lock().unwrap();
        if state.history.len() > 1 {
            state.history.pop();
        }
        if let Some(url) = state.history.last().cloned() {
            if let Some(html) = state.pages_after_back.get(&url).cloned() {
                state.shown.insert(url, html);
            }
        }
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<u64, CrawlerError> {
        let mut state = self.state.lock().unwrap();
        state.scrolls += 1;
        if let Some(height) = state.scroll_heights.pop_front() {
            state.last_height = height;
        }
        Ok(state.last_height)
    }
}
