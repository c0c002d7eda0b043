use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::info;

use crate::bbva::BbvaScraper;
use crate::config::DownloaderConfig;
use crate::downloader::{DownloadSummary, StatementDownloader};
use crate::error::ScraperError;

/// ダウンロードリクエスト
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub config: DownloaderConfig,
}

impl DownloadRequest {
    pub fn new(
        id_number: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            config: DownloaderConfig::new(id_number, username, password),
        }
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.download_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }
}

impl From<DownloaderConfig> for DownloadRequest {
    fn from(config: DownloaderConfig) -> Self {
        Self { config }
    }
}

impl From<DownloadRequest> for DownloaderConfig {
    fn from(req: DownloadRequest) -> Self {
        req.config
    }
}

/// tower::Serviceを実装した明細ダウンロードサービス
///
/// 保持する中断トークンがキャンセルされると、実行中のリクエストは新しい取得を止めて終了する。
#[derive(Debug, Clone, Default)]
pub struct StatementService {
    cancel: CancellationToken,
}

impl StatementService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Service<DownloadRequest> for StatementService {
    type Response = DownloadSummary;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DownloadRequest) -> Self::Future {
        let cancel = self.cancel.clone();

        Box::pin(async move {
            let config: DownloaderConfig = req.into();
            info!(
                "Statement download requested: user={}, dir={:?}",
                config.username, config.download_path
            );

            let downloader = StatementDownloader::new(&config.download_path, cancel)
                .with_download_delay(config.download_delay);
            let mut scraper = BbvaScraper::new(config);

            downloader.run(&mut scraper).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_request_builder() {
        let req = DownloadRequest::new("30111222", "user", "pass")
            .with_download_path("/tmp/dl")
            .with_headless(false);

        assert_eq!(req.config.id_number, "30111222");
        assert_eq!(req.config.username, "user");
        assert_eq!(req.config.download_path, PathBuf::from("/tmp/dl"));
        assert!(!req.config.headless);
    }

    #[test]
    fn test_download_request_to_config() {
        let req = DownloadRequest::new("1", "user", "pass");
        let config: DownloaderConfig = req.into();

        assert_eq!(config.username, "user");
        assert_eq!(config.password, "pass");
    }

    #[tokio::test]
    async fn test_cancelled_service_skips_browser() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut service = StatementService::with_cancellation(cancel);
        let summary = service
            .call(DownloadRequest::new("1", "user", "pass").with_download_path(dir.path()))
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.total, 0);
    }

    #[tokio::test]
    async fn test_token_from_service_stops_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = StatementService::new();
        // main と同じく、サービスから取り出したトークンで中断する
        service.cancellation_token().cancel();

        let summary = service
            .call(DownloadRequest::new("1", "user", "pass").with_download_path(dir.path()))
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.downloaded, 0);
    }
}
