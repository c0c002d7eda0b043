//! BBVA スクレイパーモジュール
//!
//! ログイン → 明細画面 → 画面状態から明細一覧を取得 → PDFを取得

mod scraper;
mod scripts;
mod types;

pub use scraper::BbvaScraper;
