use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScraperError;

pub const ENV_ID_NUMBER: &str = "BBVA_DNI";
pub const ENV_USERNAME: &str = "BBVA_USER";
pub const ENV_PASSWORD: &str = "BBVA_PASSWORD";
pub const ENV_OUTPUT_DIR: &str = "BBVA_OUTPUT_DIR";
pub const ENV_HEADLESS: &str = "BBVA_HEADLESS";

const DEFAULT_DOWNLOAD_PATH: &str = "./statements";

#[derive(Clone)]
pub struct DownloaderConfig {
    /// 書類番号 (DNI)
    pub id_number: String,
    pub username: String,
    pub password: String,
    pub download_path: PathBuf,
    pub headless: bool,
    /// ログイン・画面遷移の待機上限
    pub timeout: Duration,
    /// 連続ダウンロード間の待機
    pub download_delay: Duration,
    pub chrome_path: Option<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            id_number: String::new(),
            username: String::new(),
            password: String::new(),
            download_path: PathBuf::from(DEFAULT_DOWNLOAD_PATH),
            headless: true,
            timeout: Duration::from_secs(60),
            download_delay: Duration::from_secs(2),
            chrome_path: None,
        }
    }
}

// パスワードはログに出さない
impl fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("id_number", &self.id_number)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("download_path", &self.download_path)
            .field("headless", &self.headless)
            .field("timeout", &self.timeout)
            .field("download_delay", &self.download_delay)
            .field("chrome_path", &self.chrome_path)
            .finish()
    }
}

impl DownloaderConfig {
    pub fn new(
        id_number: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id_number: id_number.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ScraperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のルックアップ関数から設定を読み込む
    ///
    /// 認証情報が1つでも欠けていれば、欠けている変数名をすべて列挙したエラーを返す。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScraperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let id_number = required(ENV_ID_NUMBER);
        let username = required(ENV_USERNAME);
        let password = required(ENV_PASSWORD);

        let (id_number, username, password) = match (id_number, username, password) {
            (Some(i), Some(u), Some(p)) => (i, u, p),
            (i, u, p) => {
                let missing = [
                    (ENV_ID_NUMBER, i.is_none()),
                    (ENV_USERNAME, u.is_none()),
                    (ENV_PASSWORD, p.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
                return Err(ScraperError::MissingCredentials(missing));
            }
        };

        let mut config = Self::new(id_number, username, password);

        if let Some(dir) = required(ENV_OUTPUT_DIR) {
            config.download_path = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ENV_HEADLESS) {
            config.headless = parse_headless(&flag);
        }
        config.chrome_path = required("CHROME_PATH")
            .or_else(|| required("CHROMIUM_PATH"))
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }
}

/// `0` / `false` / `no` / `off` 以外はヘッドレス
fn parse_headless(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_full() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[
            (ENV_ID_NUMBER, "30111222"),
            (ENV_USERNAME, "usuario"),
            (ENV_PASSWORD, "secreto"),
            (ENV_OUTPUT_DIR, "/tmp/resumenes"),
            (ENV_HEADLESS, "false"),
        ]))
        .unwrap();

        assert_eq!(config.id_number, "30111222");
        assert_eq!(config.username, "usuario");
        assert_eq!(config.password, "secreto");
        assert_eq!(config.download_path, PathBuf::from("/tmp/resumenes"));
        assert!(!config.headless);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[
            (ENV_ID_NUMBER, "30111222"),
            (ENV_USERNAME, "usuario"),
            (ENV_PASSWORD, "secreto"),
        ]))
        .unwrap();

        assert_eq!(config.download_path, PathBuf::from("./statements"));
        assert!(config.headless);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_reports_all_missing() {
        let err = DownloaderConfig::from_lookup(lookup_from(&[
            (ENV_USERNAME, "usuario"),
            (ENV_PASSWORD, "   "),
        ]))
        .unwrap_err();

        match err {
            ScraperError::MissingCredentials(missing) => {
                assert_eq!(missing, vec![ENV_ID_NUMBER, ENV_PASSWORD]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_headless() {
        assert!(parse_headless("true"));
        assert!(parse_headless("1"));
        assert!(parse_headless(""));
        assert!(!parse_headless("FALSE"));
        assert!(!parse_headless(" off "));
        assert!(!parse_headless("0"));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = DownloaderConfig::new("1", "user", "hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_config_builder() {
        let config = DownloaderConfig::new("1", "user", "pass")
            .with_headless(false)
            .with_download_path("/tmp/downloads")
            .with_timeout(Duration::from_secs(120))
            .with_download_delay(Duration::ZERO);

        assert!(!config.headless);
        assert_eq!(config.download_path, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.download_delay, Duration::ZERO);
    }
}
