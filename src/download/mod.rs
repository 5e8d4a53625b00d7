//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`      — 数据模型（Chapter / ChapterResult / BookMeta / DownloadReport）
//! - `rate_limit`  — 进程级请求限速
//! - `fetcher`     — 批次切分与并发拉取
//! - `progress`    — 每轮 CLI 进度条
//! - `downloader`  — 下载主流程编排

pub mod downloader;
pub mod fetcher;
pub mod models;
pub mod progress;
pub mod rate_limit;
