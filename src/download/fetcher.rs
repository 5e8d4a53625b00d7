//! 批次下载器：把一轮待下载章节切成批，交给固定大小的线程池并发拉取。
//!
//! 结果按输入位置对齐返回，合并与落盘由编排器单线程完成。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel as channel;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::models::FetchMode;
use super::rate_limit::RateLimiter;
use crate::base_system::shutdown::ShutdownToken;
use crate::book_parser::crypto::ChapterCipher;
use crate::book_parser::parser::{ContentParser, DecodedChapter};
use crate::third_party::content_client::{GatewayError, MAX_BATCH_SIZE};
use crate::third_party::key_manager::RegistrationError;

/// 正文来源：批量正文接口 + 会话密钥。
pub trait ChapterSource: Send + Sync {
    fn fetch_batch(
        &self,
        item_ids: &[String],
        mode: FetchMode,
    ) -> Result<Map<String, Value>, GatewayError>;

    /// hex 编码的正文解密密钥。
    fn session_key(&self) -> Result<String, RegistrationError>;
}

type BatchOutcome = Result<Vec<Option<DecodedChapter>>, RegistrationError>;

/// 工作线程回报：`Skipped` 表示批次因中断/中止未发出，不计入进度。
enum BatchEvent {
    Done(BatchOutcome),
    Skipped,
}

pub struct BatchFetcher {
    source: Arc<dyn ChapterSource>,
    limiter: Arc<RateLimiter>,
    workers: usize,
    mode: FetchMode,
    cancel: ShutdownToken,
}

impl BatchFetcher {
    pub fn new(
        source: Arc<dyn ChapterSource>,
        limiter: Arc<RateLimiter>,
        workers: usize,
        cancel: ShutdownToken,
    ) -> Self {
        Self {
            source,
            limiter,
            workers: workers.max(1),
            mode: FetchMode::Download,
            cancel,
        }
    }

    /// 下载一组章节。返回值与 `ids` 逐位对齐：`None` 表示本轮未拿到（可重试）。
    ///
    /// 每完成一个批次调用一次 `on_batch(该批章节数)`；因中断跳过的批次不回调。
    /// 会话密钥获取失败是致命错误：剩余批次不再发出，直接返回 `Err`。
    pub fn download(
        &self,
        ids: &[String],
        mut on_batch: impl FnMut(usize),
    ) -> Result<Vec<Option<DecodedChapter>>, RegistrationError> {
        let mut results: Vec<Option<DecodedChapter>> = vec![None; ids.len()];
        if ids.is_empty() {
            return Ok(results);
        }

        let batches: Vec<&[String]> = ids.chunks(MAX_BATCH_SIZE).collect();
        let workers = self.workers.min(batches.len());
        debug!(
            target: "download",
            chapters = ids.len(),
            batches = batches.len(),
            workers,
            interval_ms = self.limiter.interval().as_millis() as u64,
            "开始批量下载"
        );

        let abort = AtomicBool::new(false);
        let (job_tx, job_rx) = channel::unbounded::<(usize, &[String])>();
        let (res_tx, res_rx) = channel::unbounded::<(usize, BatchEvent)>();
        for (idx, batch) in batches.iter().enumerate() {
            // 接收端在下方 scope 内存活，发送不会失败。
            let _ = job_tx.send((idx, *batch));
        }
        drop(job_tx);

        let mut fatal: Option<RegistrationError> = None;
        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                let abort = &abort;
                s.spawn(move || {
                    for (idx, batch) in job_rx.iter() {
                        if abort.load(Ordering::SeqCst) || self.cancel.is_requested() {
                            let _ = res_tx.send((idx, BatchEvent::Skipped));
                            continue;
                        }
                        let outcome = self.fetch_one(batch);
                        if outcome.is_err() {
                            abort.store(true, Ordering::SeqCst);
                        }
                        if res_tx.send((idx, BatchEvent::Done(outcome))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(res_tx);

            for (idx, outcome) in res_rx.iter() {
                let start = idx * MAX_BATCH_SIZE;
                match outcome {
                    BatchEvent::Skipped => {}
                    BatchEvent::Done(Ok(decoded)) => {
                        let len = decoded.len();
                        for (offset, item) in decoded.into_iter().enumerate() {
                            results[start + offset] = item;
                        }
                        on_batch(len);
                    }
                    BatchEvent::Done(Err(e)) => {
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                }
            }
        });

        match fatal {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    fn fetch_one(&self, batch: &[String]) -> BatchOutcome {
        self.limiter.wait();

        let payload = match self.source.fetch_batch(batch, self.mode) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "download", error = %e, size = batch.len(), "批量请求失败，本批留待下一轮");
                return Ok(vec![None; batch.len()]);
            }
        };

        let key = self.source.session_key()?;
        let cipher = ChapterCipher::from_hex(&key).map_err(RegistrationError::Crypto)?;

        Ok(batch
            .iter()
            .map(|id| match ContentParser::decode(&payload, id, &cipher) {
                Ok(Some(decoded)) if !decoded.content.is_empty() => Some(decoded),
                Ok(_) => None,
                Err(e) => {
                    warn!(target: "download", chapter_id = %id, error = %e, "章节解码失败");
                    None
                }
            })
            .collect())
    }
}
