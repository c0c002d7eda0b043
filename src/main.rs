use std::process::ExitCode;

use bbva_statements::{DownloadRequest, DownloaderConfig, ScraperError, StatementService};
use tower::Service;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // .envがあれば読み込む（RUST_LOG も含むのでログ設定より先）
    dotenvy::dotenv().ok();

    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chromiumoxide=warn")),
        )
        .init();

    // ブラウザ起動前に認証情報を確認
    let config = match DownloaderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("BBVA_DNI / BBVA_USER / BBVA_PASSWORD を環境変数または .env で設定してください");
            return ExitCode::from(exit_code(&e));
        }
    };

    let mut service = StatementService::new();

    // Ctrl+C で新しいダウンロードを止める
    let signal_token = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current step...");
            signal_token.cancel();
        }
    });

    match service.call(DownloadRequest::from(config)).await {
        Ok(summary) => {
            println!();
            println!("=== 結果 ===");
            println!("明細: {}", summary.total);
            println!("ダウンロード: {}", summary.downloaded);
            println!("スキップ: {}", summary.skipped);
            println!("失敗: {}", summary.failed_count());
            for name in &summary.failed {
                println!("  - {}", name);
            }
            if summary.interrupted {
                println!("中断されました (未処理: {})", summary.not_attempted());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &ScraperError) -> u8 {
    if err.is_config() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&ScraperError::MissingCredentials(vec!["BBVA_DNI"])), 2);
        assert_eq!(exit_code(&ScraperError::Login("timeout".into())), 1);
        assert_eq!(exit_code(&ScraperError::Session("closed".into())), 1);
    }

    #[test]
    fn test_missing_credentials_stop_before_service() {
        // main は設定エラーのとき StatementService を作らずに終了する
        let err = DownloaderConfig::from_lookup(|key| {
            (key == "BBVA_USER").then(|| "usuario".to_string())
        })
        .unwrap_err();
        assert!(err.is_config());
        assert_eq!(exit_code(&err), 2);
    }
}
