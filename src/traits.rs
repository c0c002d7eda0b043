use async_trait::async_trait;

use crate::error::ScraperError;
use crate::statement::Statement;

#[async_trait]
pub trait Scraper: Send {
    /// ブラウザ初期化
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// ログイン実行（ランディング画面到達まで待機）
    async fn login(&mut self) -> Result<(), ScraperError>;

    /// 明細画面へ遷移
    async fn open_statements(&mut self) -> Result<(), ScraperError>;

    /// 画面の状態から明細一覧を取得
    async fn list_statements(&mut self) -> Result<Vec<Statement>, ScraperError>;

    /// 明細PDFを取得
    async fn fetch_statement(&mut self, statement: &Statement) -> Result<Vec<u8>, ScraperError>;

    /// リソース解放（複数回呼んでもよい）
    async fn close(&mut self) -> Result<(), ScraperError>;
}
