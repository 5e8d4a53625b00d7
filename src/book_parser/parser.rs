//! 章节正文解码：base64 → AES-CBC → gzip → HTML 片段 → 排版后的纯文本。

use std::io::Read;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::crypto::{ChapterCipher, CryptoError};

const INDENT: &str = "    ";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload has no content field")]
    MissingContent,
    #[error("decrypt failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("gzip decompress failed: {0}")]
    Gzip(#[source] std::io::Error),
}

/// 解码成功的一章。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChapter {
    pub title: Option<String>,
    pub content: String,
}

fn re_title_prefix() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^第[0-9]+章\s*").expect("compile title prefix regex"))
}

fn re_header_block() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?s)<header>.*?</header>").expect("compile header regex"))
}

fn re_footer_block() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?s)<footer>.*?</footer>").expect("compile footer regex"))
}

fn re_article_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"</?article>").expect("compile article regex"))
}

fn re_p_open() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"<p[^>]*>").expect("compile p regex"))
}

fn re_any_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"<[^>]+>").expect("compile tag regex"))
}

fn re_escaped_angle() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\\u003c|\\u003e").expect("compile escaped angle regex"))
}

fn re_blank_run() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\n{3,}").expect("compile blank run regex"))
}

pub struct ContentParser;

impl ContentParser {
    /// 解码响应中的一章；`Ok(None)` 表示本轮响应里没有该章（可重试）。
    pub fn decode(
        payload: &serde_json::Map<String, Value>,
        item_id: &str,
        cipher: &ChapterCipher,
    ) -> Result<Option<DecodedChapter>, DecodeError> {
        let Some(item) = payload.get(item_id).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let ciphertext = item
            .get("content")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingContent)?;
        let api_title = item.get("title").and_then(Value::as_str).unwrap_or_default();

        let html = Self::decrypt_fragment(ciphertext, cipher)?;
        let (title, content) = Self::format_chapter(api_title, &html);
        Ok(Some(DecodedChapter { title, content }))
    }

    pub fn decrypt_fragment(ciphertext: &str, cipher: &ChapterCipher) -> Result<String, DecodeError> {
        let compressed = cipher.open_base64(ciphertext)?;
        let mut html = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut html)
            .map_err(DecodeError::Gzip)?;
        Ok(html)
    }

    /// 去掉 `第N章` 前缀后的章节标题；空标题返回 None。
    pub fn strip_title(raw: &str) -> Option<String> {
        let stripped = re_title_prefix().replace(raw, "");
        let stripped = stripped.trim();
        (!stripped.is_empty()).then(|| stripped.to_string())
    }

    /// HTML 片段排版为纯文本：每个非空行 4 空格缩进，行间无空行。
    pub fn format_chapter(api_title: &str, html: &str) -> (Option<String>, String) {
        let title = Self::strip_title(api_title);

        let text = re_header_block().replace_all(html, "");
        let text = re_footer_block().replace_all(&text, "");
        let text = re_article_tag().replace_all(&text, "");
        let text = re_p_open().replace_all(&text, format!("\n{INDENT}").as_str());
        let text = text.replace("</p>", "");
        let text = re_any_tag().replace_all(&text, "");
        let mut text = re_escaped_angle().replace_all(&text, "").into_owned();

        if let Some(t) = title.as_deref() {
            let body = text.trim_start();
            if let Some(rest) = body.strip_prefix(t) {
                text = rest.trim_start().to_string();
            }
        }

        let text = re_blank_run().replace_all(&text, "\n\n");
        let content = text
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| format!("{INDENT}{line}"))
            .collect::<Vec<_>>()
            .join("\n");

        (title, content)
    }
}
