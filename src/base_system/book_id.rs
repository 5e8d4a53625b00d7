//! 书籍 ID/链接解析：接受纯数字 ID、书页链接或分享链接。

use regex::Regex;
use std::sync::OnceLock;

fn re_url() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"https?://\S+").expect("compile url regex"))
}

fn re_query() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)[?&](book_id|bookId)=([0-9]+)").expect("compile query regex"))
}

fn re_page() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"/page/([0-9]+)").expect("compile page regex"))
}

pub fn parse_book_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }

    // 粘贴内容里可能夹杂分享文案，先取出 URL
    let target = re_url()
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    re_query()
        .captures(target)
        .and_then(|caps| caps.get(2))
        .or_else(|| re_page().captures(target).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str().to_string())
}
