use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tower::Service;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webtoon_crawler::{
    create_scraper, ApiClient, ApiConfig, ChromeDriver, CrawlRequest, CrawlerConfig,
    CrawlerService, CsvRepository, JsonRepository, ListingTab, NullRepository, Platform,
    UpdateRequest, UpdateSummary, UrlCollector, UrlListStore, WebtoonRepository,
};

#[derive(Parser, Debug)]
#[command(name = "webtoon-crawler")]
#[command(about = "NAVER / KAKAO ウェブトゥーンのクローラー", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// naver | kakao
    #[arg(long, global = true, default_value = "naver")]
    platform: Platform,

    /// ブラウザを表示する
    #[arg(long, global = true)]
    show_browser: bool,

    #[arg(long, global = true, default_value_t = 10)]
    batch_size: usize,

    #[arg(long, global = true, default_value_t = 3)]
    max_retries: u32,

    /// タブごとの最大件数
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// 失敗時のスクリーンショットをログに出す
    #[arg(long, global = true)]
    debug: bool,
}

impl From<&GlobalArgs> for CrawlerConfig {
    fn from(args: &GlobalArgs) -> Self {
        CrawlerConfig::new()
            .with_headless(!args.show_browser)
            .with_batch_size(args.batch_size)
            .with_max_retries(args.max_retries)
            .with_max_items_per_listing(args.max_items)
            .with_debug(args.debug)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 曜日別一覧から作品をクリックして取得
    Listing {
        /// mon,tue,...,dailyPlus,finish（省略時は全タブ）
        #[arg(long, value_delimiter = ',')]
        tabs: Vec<ListingTab>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "failed_webtoons.json")]
        failures: PathBuf,
    },

    /// 一覧から詳細ページURLを集めて保存
    CollectUrls {
        #[arg(long, value_delimiter = ',')]
        tabs: Vec<ListingTab>,

        #[arg(short, long, default_value = "webtoon_urls.txt")]
        output: PathBuf,
    },

    /// URL一覧の詳細ページを取得（ファイルが無ければ先に集める）
    Details {
        #[arg(long, default_value = "webtoon_urls.txt")]
        urls_file: PathBuf,

        #[arg(short, long, default_value = "webtoons.json")]
        output: PathBuf,

        #[arg(long, default_value = "failed_webtoons.json")]
        failures: PathBuf,
    },

    /// 更新リクエストを処理して結果を送信
    Update {
        #[arg(long)]
        request: PathBuf,

        #[arg(long, env = "WEBTOON_API_URL")]
        api_url: Option<String>,
    },

    /// 保存済みJSONをAPIへ送信
    Push {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, env = "WEBTOON_API_URL")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,webtoon_crawler=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = CrawlerConfig::from(&cli.global);
    let platform = cli.global.platform;

    match cli.command {
        Command::Listing {
            tabs,
            format,
            output,
            failures,
        } => {
            let repository: Arc<dyn WebtoonRepository> = match format {
                OutputFormat::Json => Arc::new(JsonRepository::new(
                    output.unwrap_or_else(|| PathBuf::from("webtoons.json")),
                    failures,
                )),
                OutputFormat::Csv => Arc::new(CsvRepository::new(
                    output.unwrap_or_else(|| PathBuf::from("webtoons.csv")),
                )),
            };
            let mut service = CrawlerService::new(config, repository);
            let report = service
                .call(CrawlRequest::listing(platform).with_tabs(tabs))
                .await?;
            info!(
                "Done: {} webtoons, {} failures",
                report.success_count(),
                report.failure_count()
            );
        }

        Command::CollectUrls { tabs, output } => {
            let mut service =
                CrawlerService::new(config, Arc::new(NullRepository)).with_url_list_path(&output);
            let report = service
                .call(CrawlRequest::collect_urls(platform).with_tabs(tabs))
                .await?;
            info!(
                "Saved {} URLs to {}",
                report.collected_urls.len(),
                output.display()
            );
        }

        Command::Details {
            urls_file,
            output,
            failures,
        } => {
            let repository = Arc::new(JsonRepository::new(output, failures));
            let service = CrawlerService::new(config.clone(), repository);
            let driver = ChromeDriver::launch(&config).await?;

            let result = async {
                let scraper = create_scraper(platform, &config);
                let mut store = UrlListStore::new(&urls_file);
                let urls = UrlCollector::new(scraper.as_ref(), &driver, &config)
                    .initialize(&scraper.default_tabs(), &mut store)
                    .await?;
                service
                    .execute(&driver, CrawlRequest::details(platform, urls))
                    .await
            }
            .await;
            driver.close().await?;

            let report = result?;
            info!(
                "Done: {} webtoons, {} failures",
                report.success_count(),
                report.failure_count()
            );
        }

        Command::Update { request, api_url } => {
            let summary = run_update(config, &request, api_url).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Push { input, api_url } => {
            let client = ApiClient::new(ApiConfig::new(api_url))?;
            let sent = client
                .push_file(&input)
                .await
                .with_context(|| format!("failed to push {}", input.display()))?;
            info!("Pushed {} webtoons", sent);
        }
    }

    Ok(())
}

/// 更新リクエストを1件処理する。失敗も要約として返す
async fn run_update(
    config: CrawlerConfig,
    path: &Path,
    api_url: Option<String>,
) -> UpdateSummary {
    let request = match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|text| UpdateRequest::parse(&text).map_err(anyhow::Error::from))
    {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid update request {}: {}", path.display(), e);
            return UpdateSummary::failed("", e, false);
        }
    };

    let request_id = request.request_id.clone();
    match process_update(config, request, api_url).await {
        Ok(count) => UpdateSummary::success(request_id, count),
        Err((e, browser_ok)) => {
            error!("Update {} failed: {:#}", request_id, e);
            UpdateSummary::failed(request_id, format!("{:#}", e), browser_ok)
        }
    }
}

async fn process_update(
    config: CrawlerConfig,
    request: UpdateRequest,
    api_url: Option<String>,
) -> std::result::Result<usize, (anyhow::Error, bool)> {
    let platform = request.platform().map_err(|e| (anyhow::Error::from(e), false))?;
    let driver = ChromeDriver::launch(&config)
        .await
        .map_err(|e| (anyhow::Error::from(e), false))?;

    let service = CrawlerService::new(config, Arc::new(NullRepository));
    let result = service
        .execute(&driver, CrawlRequest::details(platform, request.urls()))
        .await;
    if let Err(e) = driver.close().await {
        error!("Failed to close browser: {}", e);
    }
    let report = result.map_err(|e| (anyhow::Error::from(e), true))?;

    let results = request.match_results(&report.succeeded);
    info!(
        "Update {}: {} matched, {} failed",
        request.request_id,
        results.len(),
        report.failure_count()
    );

    match api_url {
        Some(url) => {
            let client = ApiClient::new(ApiConfig::new(url))
                .map_err(|e| (anyhow::Error::from(e), true))?;
            client
                .post_update_results(&results)
                .await
                .context("failed to send update results")
                .map_err(|e| (e, true))?;
        }
        None => {
            let json = serde_json::to_string_pretty(&results)
                .map_err(|e| (anyhow::Error::from(e), true))?;
            println!("{}", json);
        }
    }

    Ok(results.len())
}
