//! 章节目录与书籍简介查询。

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::download::models::{BookMeta, Chapter};

const WEB_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("directory returned HTTP {0}")]
    Status(u16),
    #[error("directory api error (code={code}): {message}")]
    Api { code: i64, message: String },
    #[error("directory is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("book info request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("book info returned HTTP {0}")]
    Status(u16),
    #[error("book info api error (code={code}): {message}")]
    Api { code: i64, message: String },
}

/// 目录/简介服务。
pub trait BookDirectory {
    fn fetch_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, DirectoryError>;
    fn fetch_book_info(&self, book_id: &str) -> Result<BookMeta, MetadataError>;
}

pub struct DirectoryClient {
    client: Client,
    directory_url: String,
    book_info_url: String,
    aid: String,
}

impl DirectoryClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        default_headers.insert(USER_AGENT, HeaderValue::from_static(WEB_USER_AGENT));

        let client = Client::builder()
            .default_headers(default_headers)
            .danger_accept_invalid_certs(cfg.insecure_tls)
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self {
            client,
            directory_url: cfg.endpoints.directory_url.clone(),
            book_info_url: cfg.endpoints.book_info_url.clone(),
            aid: cfg.official_api.aid.clone(),
        })
    }
}

impl BookDirectory for DirectoryClient {
    fn fetch_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, DirectoryError> {
        debug!(target: "network", book_id, "获取章节列表");
        let mut req = self
            .client
            .get(&self.directory_url)
            .query(&[("bookId", book_id)]);
        if let Ok(referer) = HeaderValue::from_str(&format!("https://fanqienovel.com/page/{book_id}")) {
            req = req.header(REFERER, referer);
        }
        let resp = req.send()?;
        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json()?;
        if let Some((code, message)) = api_failure(&body) {
            return Err(DirectoryError::Api { code, message });
        }
        let chapters = chapters_from_directory(&body);
        if chapters.is_empty() {
            return Err(DirectoryError::Empty);
        }
        Ok(chapters)
    }

    fn fetch_book_info(&self, book_id: &str) -> Result<BookMeta, MetadataError> {
        debug!(target: "network", book_id, "获取书籍信息");
        let resp = self
            .client
            .get(&self.book_info_url)
            .query(&[("group_id", book_id), ("aid", self.aid.as_str())])
            .send()?;
        if !resp.status().is_success() {
            return Err(MetadataError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json()?;
        if let Some((code, message)) = api_failure(&body) {
            return Err(MetadataError::Api { code, message });
        }
        Ok(meta_from_book_info(&body))
    }
}

/// `code != 0`（或缺失）时返回错误码与消息。
fn api_failure(body: &Value) -> Option<(i64, String)> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code == 0 {
        return None;
    }
    let message = body
        .get("message")
        .or_else(|| body.get("messages"))
        .and_then(Value::as_str)
        .unwrap_or("未知错误")
        .to_string();
    warn!(target: "network", code, %message, "接口返回错误");
    Some((code, message))
}

/// 目录顺序即输出顺序；空 ID 先剔除再编号，保证序号连续。
fn chapters_from_directory(body: &Value) -> Vec<Chapter> {
    body.pointer("/data/allItemIds")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|id| !id.is_empty())
                .enumerate()
                .map(|(idx, id)| Chapter::new(id, idx))
                .collect()
        })
        .unwrap_or_default()
}

fn meta_from_book_info(body: &Value) -> BookMeta {
    let info = body.pointer("/data/book_info");
    let pick = |key: &str, fallback: &str| {
        info.and_then(|i| i.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    BookMeta {
        name: pick("book_name", "未知书名"),
        author: pick("author", "未知作者"),
        description: pick("abstract", "无简介"),
    }
}
