//! BBVA 明細ダウンローダー
//!
//! オンラインバンキングにログインし、明細画面の状態から明細一覧を取得して
//! PDFを1件ずつ保存する。保存先に同名ファイルがあれば取得しない。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use bbva_statements::{DownloadRequest, StatementService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = StatementService::new();
//!
//!     let request = DownloadRequest::new("30111222", "usuario", "clave")
//!         .with_download_path("./statements")
//!         .with_headless(false);
//!
//!     let summary = service.call(request).await.unwrap();
//!     println!("{}", summary);
//! }
//! ```

pub mod bbva;
pub mod config;
pub mod downloader;
pub mod error;
pub mod service;
pub mod statement;
pub mod traits;

// 主要な型をリエクスポート
pub use bbva::BbvaScraper;
pub use config::DownloaderConfig;
pub use downloader::{DownloadSummary, StatementDownloader};
pub use error::ScraperError;
pub use service::{DownloadRequest, StatementService};
pub use statement::Statement;
pub use traits::Scraper;
