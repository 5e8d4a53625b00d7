//! Ctrl+C 中断令牌。
//!
//! 第一次中断只置位令牌：工作线程不再开始新的批次，编排器写出已下载内容并保存进度后退出；
//! 第二次中断直接结束进程。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回 true 表示这是第一次请求。
    pub fn request(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub fn install_ctrlc(token: &ShutdownToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.request() {
            warn!(target: "startup", "检测到程序中断，正在保存已下载内容...");
        } else {
            eprintln!("再次中断，立即退出");
            std::process::exit(0);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_idempotent_and_shared_across_clones() {
        let token = ShutdownToken::new();
        let worker_view = token.clone();
        assert!(!worker_view.is_requested());

        assert!(token.request());
        assert!(!token.request());
        assert!(worker_view.is_requested());
    }
}
