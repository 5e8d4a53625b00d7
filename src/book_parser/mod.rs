//! 正文解密/排版与结果落盘。
//!
//! 子模块：
//! - `crypto`        — AES-128-CBC 与注册明文
//! - `parser`        — 章节正文解码与排版
//! - `book_manager`  — 进度文件与 txt 输出

pub mod book_manager;
pub mod crypto;
pub mod parser;
