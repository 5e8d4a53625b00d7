//! 下载主流程编排：目录 → 续传 → 按轮重试直到全部完成或被中断。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::fetcher::{BatchFetcher, ChapterSource};
use super::models::{BookMeta, Chapter, ChapterResult, DownloadReport, RunState};
use super::progress::ProgressReporter;
use super::rate_limit::RateLimiter;
use crate::base_system::context::Config;
use crate::base_system::shutdown::ShutdownToken;
use crate::book_parser::book_manager::{BookManager, DownloadedSet};
use crate::network_parser::network::BookDirectory;

/// 轮间等待时检查中断的粒度。
const PAUSE_SLICE: Duration = Duration::from_millis(50);

pub struct Downloader {
    config: Config,
    directory: Box<dyn BookDirectory>,
    fetcher: BatchFetcher,
    cancel: ShutdownToken,
    show_progress: bool,
}

impl Downloader {
    pub fn new(
        config: Config,
        directory: Box<dyn BookDirectory>,
        source: Arc<dyn ChapterSource>,
        cancel: ShutdownToken,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval()));
        let fetcher = BatchFetcher::new(source, limiter, config.workers(), cancel.clone());
        Self {
            config,
            directory,
            fetcher,
            cancel,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// 下载整本书。目录拉取失败与会话密钥失败返回 `Err`，其余失败都进入下一轮重试。
    pub fn run(&self, book_id: &str, save_dir: Option<&Path>) -> Result<DownloadReport> {
        let started = Instant::now();
        let mut state = RunState::Init;
        info!(target: "download", book_id, state = %state, "启动下载");

        let chapters = self
            .directory
            .fetch_chapters(book_id)
            .with_context(|| format!("获取章节目录失败: {book_id}"))?;
        let meta = match self.directory.fetch_book_info(book_id) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(target: "download", error = %e, "获取书籍信息失败，使用占位信息");
                BookMeta::placeholder(book_id)
            }
        };
        state = RunState::DirectoryLoaded;
        info!(target: "download", state = %state, chapters = chapters.len(), "《{}》 作者: {}", meta.name, meta.author);

        let manager = BookManager::new(&self.config, save_dir, meta).context("创建保存目录失败")?;
        debug!(
            target: "download",
            save_dir = %manager.save_dir().display(),
            status = %manager.status_file().display(),
            "保存位置"
        );
        let mut downloaded = manager.load_status();
        let already = chapters
            .iter()
            .filter(|ch| downloaded.contains(&ch.id))
            .count();
        if already > 0 {
            info!(
                target: "download",
                "检测到已存在的下载状态：已完成 {} 章，剩余 {} 章",
                already,
                chapters.len() - already
            );
        }

        let mut todo: Vec<Chapter> = chapters
            .iter()
            .filter(|ch| !downloaded.contains(&ch.id))
            .cloned()
            .collect();
        state = RunState::Resumed;
        debug!(target: "download", state = %state, todo = todo.len(), total = chapters.len(), "待下载章节统计");

        if todo.is_empty() {
            info!(target: "download", "已全部下载，跳过下载阶段");
            return Ok(DownloadReport {
                state: RunState::Done,
                rounds: 0,
                success: 0,
                remaining: 0,
                total: chapters.len(),
            });
        }

        manager.ensure_output().context("创建输出文件失败")?;

        let mut results: BTreeMap<usize, ChapterResult> = BTreeMap::new();
        let mut reporter = ProgressReporter::new(self.show_progress);
        let mut round: u32 = 0;

        loop {
            if self.cancel.is_requested() {
                state = RunState::Interrupted;
                break;
            }
            round += 1;
            state = RunState::Round(round);
            info!(target: "download", state = %state, todo = todo.len(), "开始第 {} 轮下载", round);
            reporter.start_round(round, todo.len());

            let ids: Vec<String> = todo.iter().map(|ch| ch.id.clone()).collect();
            let fetched = match self.fetcher.download(&ids, |n| reporter.advance(n)) {
                Ok(fetched) => fetched,
                Err(e) => {
                    reporter.finish();
                    self.persist(&manager, &chapters, &results, &downloaded)?;
                    return Err(anyhow::Error::new(e).context("获取正文解密密钥失败"));
                }
            };

            let mut failed = Vec::new();
            for (ch, item) in todo.into_iter().zip(fetched) {
                match item {
                    Some(decoded) => {
                        downloaded.insert(ch.id.clone());
                        results.insert(
                            ch.sequence_index,
                            ChapterResult {
                                sequence_index: ch.sequence_index,
                                base_title: ch.title,
                                api_title: decoded.title,
                                content: decoded.content,
                            },
                        );
                    }
                    None => failed.push(ch),
                }
            }
            todo = failed;

            self.persist(&manager, &chapters, &results, &downloaded)?;
            debug!(target: "download", progress = ?reporter.snapshot(), "本轮进度");
            info!(
                target: "download",
                round,
                success = results.len(),
                failed = todo.len(),
                "第 {} 轮结束：本次已完成 {} 章，待重试 {} 章",
                round,
                results.len(),
                todo.len()
            );

            if todo.is_empty() {
                state = RunState::Done;
                break;
            }
            if self.cancel.is_requested() {
                state = RunState::Interrupted;
                break;
            }
            if self.config.round_cap().is_some_and(|cap| round >= cap) {
                warn!(target: "download", round, remaining = todo.len(), "已达到最大轮数，停止重试");
                break;
            }
            if self.pause(self.config.round_pause()) {
                state = RunState::Interrupted;
                break;
            }
        }
        reporter.finish();

        let report = DownloadReport {
            state,
            rounds: round,
            success: results.len(),
            remaining: todo.len(),
            total: chapters.len(),
        };
        match report.state {
            RunState::Done => info!(
                target: "download",
                "下载完成：《{}》 成功 {} 章，用时 {:.1}s，输出 {}",
                manager.meta.name,
                report.success,
                started.elapsed().as_secs_f32(),
                manager.output_file().display()
            ),
            RunState::Interrupted => warn!(
                target: "download",
                success = report.success,
                remaining = report.remaining,
                "下载已中断，进度已保存"
            ),
            _ => warn!(
                target: "download",
                remaining = report.remaining,
                "仍有章节未下载，重新运行可继续"
            ),
        }
        Ok(report)
    }

    fn persist(
        &self,
        manager: &BookManager,
        chapters: &[Chapter],
        results: &BTreeMap<usize, ChapterResult>,
        downloaded: &DownloadedSet,
    ) -> Result<()> {
        manager
            .write_in_order(chapters, results)
            .context("写入输出文件失败")?;
        manager
            .save_status(downloaded)
            .context("保存下载进度失败")?;
        Ok(())
    }

    /// 轮间等待；等待期间收到中断返回 true。
    fn pause(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        while !self.cancel.is_requested() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
        true
    }
}
