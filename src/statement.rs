//! 明細（resumen）の型定義

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

const FILE_PREFIX: &str = "BBVA";

static SEPARATOR_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[/,\s]+").expect("static regex")
});

/// 明細1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// 表示名 (例: "Tarjeta Visa, Oro")
    pub label: String,
    /// 締め日 (dd/mm/yyyy)
    pub closing_date: String,
    /// レポートエンドポイントに渡す識別子
    pub id: String,
}

impl Statement {
    pub fn new(
        label: impl Into<String>,
        closing_date: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            closing_date: closing_date.into(),
            id: id.into(),
        }
    }

    /// 締め日をパース
    pub fn closing_date(&self) -> Result<NaiveDate, ScraperError> {
        NaiveDate::parse_from_str(self.closing_date.trim(), "%d/%m/%Y")
            .map_err(|_| ScraperError::InvalidDate(self.closing_date.clone()))
    }

    /// 保存ファイル名: `BBVA_<label>_<yyyy>-<mm>-<dd>.pdf`
    pub fn file_name(&self) -> Result<String, ScraperError> {
        let date = self.closing_date()?;
        Ok(format!(
            "{}_{}_{}.pdf",
            FILE_PREFIX,
            sanitize_label(&self.label),
            date.format("%Y-%m-%d")
        ))
    }

    /// ファイル名を導出できない場合の表示名
    pub fn display_name(&self) -> String {
        self.file_name()
            .unwrap_or_else(|_| format!("{} ({})", self.label, self.closing_date))
    }
}

/// `/` `,` 空白の連続を `_` 1文字にまとめる
pub fn sanitize_label(label: &str) -> String {
    SEPARATOR_RUN.replace_all(label.trim(), "_").into_owned()
}
