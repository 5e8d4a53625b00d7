//! 下载相关的数据模型定义。

use std::fmt;

/// 目录中的一章；`sequence_index` 决定输出顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub sequence_index: usize,
}

impl Chapter {
    pub fn new(id: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            id: id.into(),
            title: format!("第{}章", sequence_index + 1),
            sequence_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterResult {
    pub sequence_index: usize,
    pub base_title: String,
    pub api_title: Option<String>,
    pub content: String,
}

impl ChapterResult {
    pub fn heading(&self) -> String {
        match self.api_title.as_deref().filter(|t| !t.is_empty()) {
            Some(api) => format!("{} {}", self.base_title, api),
            None => self.base_title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMeta {
    pub name: String,
    pub author: String,
    pub description: String,
}

impl BookMeta {
    /// 简介拉取失败时的占位信息。
    pub fn placeholder(book_id: &str) -> Self {
        Self {
            name: format!("未知小说_{book_id}"),
            author: "未知作者".to_string(),
            description: "无简介".to_string(),
        }
    }
}

/// 批量正文接口的请求类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Preview,
    Download,
}

impl FetchMode {
    pub fn req_type(self) -> &'static str {
        match self {
            FetchMode::Download => "0",
            FetchMode::Preview => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    DirectoryLoaded,
    Resumed,
    Round(u32),
    Done,
    Interrupted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::DirectoryLoaded => write!(f, "DIRECTORY_LOADED"),
            RunState::Resumed => write!(f, "RESUMED"),
            RunState::Round(n) => write!(f, "ROUND({n})"),
            RunState::Done => write!(f, "DONE"),
            RunState::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

/// 一次运行的结果汇总。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub state: RunState,
    pub rounds: u32,
    pub success: usize,
    pub remaining: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_joins_base_and_api_title() {
        let mut r = ChapterResult {
            sequence_index: 0,
            base_title: "第1章".to_string(),
            api_title: Some("开端".to_string()),
            content: String::new(),
        };
        assert_eq!(r.heading(), "第1章 开端");
        r.api_title = Some(String::new());
        assert_eq!(r.heading(), "第1章");
        r.api_title = None;
        assert_eq!(r.heading(), "第1章");
    }

    #[test]
    fn chapter_base_title_is_one_based() {
        let ch = Chapter::new("abc", 4);
        assert_eq!(ch.title, "第5章");
        assert_eq!(ch.sequence_index, 4);
    }

    #[test]
    fn placeholder_meta_mentions_book_id() {
        let meta = BookMeta::placeholder("42");
        assert_eq!(meta.name, "未知小说_42");
        assert_eq!(meta.author, "未知作者");
        assert_eq!(meta.description, "无简介");
    }
}
