//! ページスクリプトの戻り値

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ScraperError;
use crate::statement::Statement;

/// 明細一覧探索の結果
#[derive(Debug, Deserialize)]
pub(crate) struct StateSearch {
    pub found: bool,
    /// 見つかった深さ、または探索した最大深さ
    pub depth: u32,
    /// 一覧は見つかったがまだ空（非同期読み込み中の可能性）
    #[serde(default)]
    pub empty: bool,
    /// 一覧を保持していたプロパティ名
    #[serde(default)]
    pub key: Option<String>,
    /// 一覧の要素（プリミティブ値のみのコピー）
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StateSearch {
    pub fn parse(json: &str) -> Result<Self, ScraperError> {
        Ok(serde_json::from_str(json)?)
    }

    /// 要素をすべて明細に変換する
    ///
    /// 1件でも識別子か締め日を持たない要素があればエラー。黙って捨てない。
    pub fn into_statements(self) -> Result<Vec<Statement>, ScraperError> {
        if !self.found {
            return Err(ScraperError::StateNotFound {
                depth: self.depth,
                message: self
                    .error
                    .unwrap_or_else(|| "statements collection not found".to_string()),
            });
        }

        let total = self.entries.len();
        let mut statements = Vec::with_capacity(total);
        let mut rejected = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            match statement_from_entry(entry) {
                Some(statement) => statements.push(statement),
                None => rejected.push(i),
            }
        }

        if !rejected.is_empty() {
            return Err(ScraperError::UnexpectedState(format!(
                "{} of {} entries under '{}' have no id or closing date (index {:?})",
                rejected.len(),
                total,
                self.key.as_deref().unwrap_or("?"),
                rejected
            )));
        }
        Ok(statements)
    }
}

fn first_field<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| entry.get(*k))
        .find(|v| !v.is_null())
}

fn field_as_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// 画面の明細オブジェクトを `Statement` に変換
fn statement_from_entry(entry: &Value) -> Option<Statement> {
    let id = first_field(entry, &["idResumen", "id"]).and_then(field_as_string)?;
    let closing_date =
        first_field(entry, &["fechaCierre", "closingDate"]).and_then(field_as_string)?;
    let label = first_field(entry, &["descripcion", "nombreTarjeta", "label"])
        .and_then(field_as_string)
        .unwrap_or_default();

    Some(Statement {
        label,
        closing_date,
        id,
    })
}

/// PDF取得スクリプトの結果
#[derive(Debug, Deserialize)]
pub(crate) struct PdfPayload {
    pub ok: bool,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PdfPayload {
    pub fn parse(json: &str) -> Result<Self, ScraperError> {
        Ok(serde_json::from_str(json)?)
    }

    /// PDFのバイト列に変換（内容はそのまま）
    pub fn into_bytes(self) -> Result<Vec<u8>, ScraperError> {
        if !self.ok {
            return Err(ScraperError::Download(format!(
                "status={} {}",
                self.status,
                self.error.unwrap_or_default()
            )));
        }

        let encoded = self.base64.unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ScraperError::Download(format!("base64 decode: {}", e)))?;

        if bytes.is_empty() {
            return Err(ScraperError::Download("empty response body".into()));
        }
        if !bytes.starts_with(b"%PDF") {
            warn!("Payload does not look like a PDF ({} bytes), saving as is", bytes.len());
        }
        Ok(bytes)
    }
}
