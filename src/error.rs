use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("環境変数が設定されていません: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("ブラウザセッションエラー: {0}")]
    Session(String),

    #[error("明細一覧が見つかりません (探索深さ {depth}): {message}")]
    StateNotFound { depth: u32, message: String },

    #[error("明細一覧の形式が想定と異なります: {0}")]
    UnexpectedState(String),

    #[error("JSONパースエラー: {0}")]
    Json(String),

    #[error("ダウンロードエラー: {0}")]
    Download(String),

    #[error("締め日の形式が不正です: {0}")]
    InvalidDate(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    /// 実行全体を中断すべきエラーか
    ///
    /// 明細1件単位の失敗（取得・保存・日付）は false。ループは次の明細へ進む。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScraperError::Download(_)
                | ScraperError::InvalidDate(_)
                | ScraperError::FileIO(_)
                | ScraperError::JavaScript(_)
                | ScraperError::Json(_)
        )
    }

    /// 設定不備によるエラーか
    pub fn is_config(&self) -> bool {
        matches!(self, ScraperError::MissingCredentials(_))
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(e: serde_json::Error) -> Self {
        ScraperError::Json(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_lists_every_variable() {
        let err = ScraperError::MissingCredentials(vec!["BBVA_DNI", "BBVA_PASSWORD"]);
        let msg = err.to_string();
        assert!(msg.contains("BBVA_DNI, BBVA_PASSWORD"));
        assert!(err.is_config());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_per_statement_errors_are_not_fatal() {
        assert!(!ScraperError::Download("500".into()).is_fatal());
        assert!(!ScraperError::JavaScript("TypeError".into()).is_fatal());
        assert!(ScraperError::Session("websocket closed".into()).is_fatal());
        assert!(ScraperError::UnexpectedState("no id".into()).is_fatal());
        assert!(!ScraperError::InvalidDate("31-12-2024".into()).is_fatal());
        assert!(ScraperError::Login("timeout".into()).is_fatal());
        assert!(ScraperError::StateNotFound {
            depth: 6,
            message: "no scope".into()
        }
        .is_fatal());
    }
}
