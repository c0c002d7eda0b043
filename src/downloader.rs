//! 明細ダウンロードのパイプライン
//!
//! initialize → login → open_statements → list_statements → ダウンロードループ → close
//!
//! 中断トークンがキャンセルされると新しい取得は開始せず、`close` は
//! どの経路でもちょうど1回だけ呼ばれる。

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::statement::Statement;
use crate::traits::Scraper;

/// 実行結果の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// 見つかった明細数
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// 失敗したファイル名
    pub failed: Vec<String>,
    pub interrupted: bool,
}

impl DownloadSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Default::default()
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// 中断により処理されなかった件数
    pub fn not_attempted(&self) -> usize {
        self.total
            .saturating_sub(self.downloaded + self.skipped + self.failed_count())
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} downloaded={} skipped={} failed={}",
            self.total,
            self.downloaded,
            self.skipped,
            self.failed_count()
        )?;
        if self.interrupted {
            write!(f, " interrupted (not attempted={})", self.not_attempted())?;
        }
        Ok(())
    }
}

/// 明細ダウンローダー
#[derive(Debug, Clone)]
pub struct StatementDownloader {
    download_path: PathBuf,
    download_delay: Duration,
    cancel: CancellationToken,
}

impl StatementDownloader {
    pub fn new(download_path: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            download_path: download_path.into(),
            download_delay: Duration::from_secs(2),
            cancel,
        }
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    /// パイプライン全体を実行
    ///
    /// 致命的エラーはクリーンアップ後に返す。クリーンアップ自体の失敗はログのみ。
    pub async fn run<S: Scraper>(&self, scraper: &mut S) -> Result<DownloadSummary, ScraperError> {
        tokio::fs::create_dir_all(&self.download_path).await?;

        let result = self.run_inner(scraper).await;

        if let Err(e) = scraper.close().await {
            warn!("Failed to close browser: {}", e);
        }

        match &result {
            Ok(summary) => info!("Run finished: {}", summary),
            Err(e) => warn!("Run aborted: {}", e),
        }
        result
    }

    async fn run_inner<S: Scraper>(&self, scraper: &mut S) -> Result<DownloadSummary, ScraperError> {
        let Some(()) = self.until_cancelled(scraper.initialize()).await? else {
            return Ok(DownloadSummary::interrupted());
        };
        let Some(()) = self.until_cancelled(scraper.login()).await? else {
            return Ok(DownloadSummary::interrupted());
        };
        let Some(()) = self.until_cancelled(scraper.open_statements()).await? else {
            return Ok(DownloadSummary::interrupted());
        };
        let Some(statements) = self.until_cancelled(scraper.list_statements()).await? else {
            return Ok(DownloadSummary::interrupted());
        };

        info!("Found {} statements", statements.len());
        self.download_all(scraper, &statements).await
    }

    /// 中断されたら `Ok(None)`
    async fn until_cancelled<T, F>(&self, fut: F) -> Result<Option<T>, ScraperError>
    where
        F: Future<Output = Result<T, ScraperError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Interrupted, stopping before next step");
                Ok(None)
            }
            res = fut => res.map(Some),
        }
    }

    /// 明細を順番にダウンロード
    ///
    /// 既存ファイルはスキップ（取得しない）。明細単位の失敗ではループを止めず、
    /// セッション切れなど `is_fatal` なエラーでは残りを処理せずエラーを返す。
    pub async fn download_all<S: Scraper>(
        &self,
        scraper: &mut S,
        statements: &[Statement],
    ) -> Result<DownloadSummary, ScraperError> {
        let mut summary = DownloadSummary::new(statements.len());
        let mut fetched_any = false;

        for (i, statement) in statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let file_name = match statement.file_name() {
                Ok(name) => name,
                Err(e) => {
                    warn!("[{}/{}] {}: {}", i + 1, statements.len(), statement.label, e);
                    summary.failed.push(statement.display_name());
                    continue;
                }
            };
            let path = self.download_path.join(&file_name);

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("[{}/{}] Skip existing {}", i + 1, statements.len(), file_name);
                summary.skipped += 1;
                continue;
            }

            if fetched_any && !self.download_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = sleep(self.download_delay) => {}
                }
            }
            fetched_any = true;

            info!("[{}/{}] Downloading {}", i + 1, statements.len(), file_name);
            match self.fetch_and_save(scraper, statement, &path).await {
                Ok(size) => {
                    info!("Saved {} ({} bytes)", file_name, size);
                    summary.downloaded += 1;
                }
                Err(e) if e.is_fatal() => {
                    warn!(
                        "Aborting downloads at {} ({}): {}",
                        file_name, summary, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!("Failed to download {}: {}", file_name, e);
                    summary.failed.push(file_name);
                }
            }
        }

        Ok(summary)
    }

    async fn fetch_and_save<S: Scraper>(
        &self,
        scraper: &mut S,
        statement: &Statement,
        path: &Path,
    ) -> Result<usize, ScraperError> {
        let bytes = scraper.fetch_statement(statement).await?;
        write_atomic(path, &bytes).await?;
        Ok(bytes.len())
    }
}

/// `.part` に書き込んでからリネーム
///
/// 書き込み途中のファイルが既存扱いでスキップされないようにする。
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScraperError> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    if let Err(e) = tokio::fs::write(&part, bytes).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&part, path).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    Ok(())
}
