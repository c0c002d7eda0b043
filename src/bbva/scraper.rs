//! BBVA オンラインバンキング スクレイパー実装

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::ScraperError;
use crate::statement::Statement;
use crate::traits::Scraper;

use super::scripts;
use super::types::{PdfPayload, StateSearch};

const LOGIN_URL: &str = "https://online.bbva.com.ar/fnetcore/login/index.html";
/// ログイン後のランディング画面
const LANDING_ROUTE: &str = "#!/inicio";

const FIELD_ID_NUMBER: &str = "Número de documento";
const FIELD_USERNAME: &str = "Usuario";
const FIELD_PASSWORD: &str = "Clave digital";
const LOGIN_BUTTON: &str = "Ingresar";

const MENU_ENTRY: &str = "Tarjetas";
const STATEMENTS_LINK: &str = "Resúmenes";
/// 明細画面にだけ存在する要素（AngularJSコントローラのルート）
const STATEMENTS_MARKER: &str = "[ng-controller*='Resumenes']";

const PDF_ENDPOINT: &str = "/fnetcore/servicios/tarjetas/resumenes/pdf";

/// スコープ探索の深さ上限
const STATE_SEARCH_MAX_DEPTH: u32 = 6;
const POLL_INTERVAL_MS: u64 = 500;

pub struct BbvaScraper {
    config: DownloaderConfig,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    user_data_dir: Option<PathBuf>,
}

impl BbvaScraper {
    pub fn new(config: DownloaderConfig) -> Self {
        Self {
            config,
            browser: None,
            page: None,
            handler: None,
            user_data_dir: None,
        }
    }

    fn get_page(&self) -> Result<&Page, ScraperError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    async fn eval_bool(page: &Page, script: &str) -> Result<bool, ScraperError> {
        page.evaluate(script)
            .await
            .map_err(map_cdp_error)?
            .into_value::<bool>()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn eval_string(page: &Page, script: &str) -> Result<String, ScraperError> {
        page.evaluate(script)
            .await
            .map_err(map_cdp_error)?
            .into_value::<String>()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    /// スクリプトが true を返すまで待機（上限 config.timeout）
    async fn wait_until(&self, page: &Page, script: &str, what: &str) -> Result<(), ScraperError> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            match Self::eval_bool(page, script).await {
                Ok(true) => {
                    debug!("{} after {:?}", what, start.elapsed());
                    return Ok(());
                }
                Ok(false) => {}
                // 画面遷移中は評価に失敗することがある
                Err(e) => debug!("Check for '{}' failed: {}", what, e),
            }

            if start.elapsed() >= self.config.timeout {
                return Err(ScraperError::Timeout(format!(
                    "{} ({:?}以内に完了しませんでした)",
                    what, self.config.timeout
                )));
            }

            attempt += 1;
            if attempt % 10 == 0 {
                info!("Still waiting: {} ({:?} elapsed)", what, start.elapsed());
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// ラベルで入力欄を探して値を入力
    async fn fill_field(
        &self,
        page: &Page,
        label: &str,
        tag: &str,
        value: &str,
    ) -> Result<(), ScraperError> {
        self.wait_until(page, &scripts::tag_field(label, tag), label)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", label, e)))?;

        let element = page
            .find_element(scripts::tagged_selector(tag))
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", label, e)))?;
        element
            .click()
            .await
            .map_err(|e| ScraperError::Login(format!("{} クリック: {}", label, e)))?;
        element
            .type_str(value)
            .await
            .map_err(|e| ScraperError::Login(format!("{} 入力: {}", label, e)))?;

        debug!("Filled field '{}'", label);
        Ok(())
    }

    /// アクセシブル名でクリック（表示されるまで待機）
    async fn click_named(&self, page: &Page, name: &str) -> Result<(), ScraperError> {
        self.wait_until(page, &scripts::click_by_name(name), name)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", name, e)))?;
        debug!("Clicked '{}'", name);
        Ok(())
    }
}

/// ページ内の例外は明細単位のエラー、それ以外（通信断・応答なし）はセッション切れ
fn map_cdp_error(e: CdpError) -> ScraperError {
    match &e {
        CdpError::JavascriptException(_) => ScraperError::JavaScript(e.to_string()),
        _ => ScraperError::Session(e.to_string()),
    }
}

#[async_trait]
impl Scraper for BbvaScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing browser...");

        // 実行ごとに独立したプロファイル
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("bbva-statements-{}", unique_id));
        // 起動失敗・中断時も close で削除できるよう先に記録
        self.user_data_dir = Some(user_data_dir.clone());

        let mut builder = BrowserConfig::builder()
            .window_size(1280, 900)
            .user_data_dir(&user_data_dir);

        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(self.config.timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=es-AR");

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        self.browser = Some(browser);
        self.handler = Some(handler_task);

        let page = self
            .browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが起動していません".into()))?
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;
        self.page = Some(page);

        info!("Browser initialized (headless={})", self.config.headless);
        Ok(())
    }

    async fn login(&mut self) -> Result<(), ScraperError> {
        let page = self.get_page()?.clone();
        info!("Opening login page...");

        page.goto(LOGIN_URL)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        self.fill_field(&page, FIELD_ID_NUMBER, "id-number", &self.config.id_number)
            .await?;
        self.fill_field(&page, FIELD_USERNAME, "username", &self.config.username)
            .await?;
        self.fill_field(&page, FIELD_PASSWORD, "password", &self.config.password)
            .await?;

        self.click_named(&page, LOGIN_BUTTON).await?;
        info!("Credentials submitted, waiting for landing page...");

        self.wait_until(&page, &scripts::location_contains(LANDING_ROUTE), "landing page")
            .await
            .map_err(|e| ScraperError::Login(e.to_string()))?;

        info!("Login successful");
        Ok(())
    }

    async fn open_statements(&mut self) -> Result<(), ScraperError> {
        let page = self.get_page()?.clone();
        info!("Navigating to statements page...");

        self.click_named(&page, MENU_ENTRY).await?;
        // サブメニューの展開待ち
        sleep(Duration::from_secs(1)).await;
        self.click_named(&page, STATEMENTS_LINK).await?;

        self.wait_until(
            &page,
            &scripts::element_exists(STATEMENTS_MARKER),
            "statements page",
        )
        .await
        .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        info!("Statements page ready");
        Ok(())
    }

    async fn list_statements(&mut self) -> Result<Vec<Statement>, ScraperError> {
        let page = self.get_page()?.clone();

        let script = scripts::find_statements(STATEMENTS_MARKER, STATE_SEARCH_MAX_DEPTH);
        let start = Instant::now();

        // 一覧はマーカー表示後に非同期で読み込まれる。空の間は待ち続ける
        let statements = loop {
            let json = Self::eval_string(&page, &script).await?;
            let search = StateSearch::parse(&json)?;
            debug!(
                "State search finished at depth {} (found={}, empty={})",
                search.depth, search.found, search.empty
            );

            let timed_out = start.elapsed() >= self.config.timeout;
            if search.empty && timed_out {
                warn!(
                    "Statements collection '{}' still empty after {:?}",
                    search.key.as_deref().unwrap_or("?"),
                    self.config.timeout
                );
                break Vec::new();
            }

            match search.into_statements() {
                Ok(statements) => break statements,
                Err(e @ ScraperError::StateNotFound { .. }) if !timed_out => {
                    debug!("Statements not available yet: {}", e);
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => return Err(e),
            }
        };
        for s in &statements {
            debug!("Statement: {} / {} (id={})", s.label, s.closing_date, s.id);
        }
        Ok(statements)
    }

    async fn fetch_statement(&mut self, statement: &Statement) -> Result<Vec<u8>, ScraperError> {
        let page = self.get_page()?.clone();

        // CDPのリクエストタイムアウトより先にページ側で打ち切る
        let timeout_ms = u64::try_from(self.config.timeout.as_millis() * 3 / 4).unwrap_or(u64::MAX);
        let script = scripts::fetch_statement_pdf(PDF_ENDPOINT, &statement.id, timeout_ms);
        let json = Self::eval_string(&page, &script).await?;

        PdfPayload::parse(&json)?.into_bytes()
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if self.browser.is_none() && self.handler.is_none() && self.user_data_dir.is_none() {
            return Ok(());
        }
        info!("Closing browser...");

        self.page = None;

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait failed: {}", e);
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!("Failed to remove profile dir {:?}: {}", dir, e);
            }
        }

        info!("Browser closed");
        Ok(())
    }
}

impl Drop for BbvaScraper {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("BbvaScraper dropped without close()");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
