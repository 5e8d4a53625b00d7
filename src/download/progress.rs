//! 每轮下载的 CLI 进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 一轮下载的进度快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub round: u32,
    pub done: usize,
    pub total: usize,
}

pub(crate) struct ProgressReporter {
    snapshot: ProgressSnapshot,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// `visible = false` 时只记录快照，不绘制（测试与非终端环境）。
    pub(crate) fn new(visible: bool) -> Self {
        let bar = visible.then(|| {
            let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            bar.set_style(style);
            bar
        });
        Self {
            snapshot: ProgressSnapshot::default(),
            bar,
        }
    }

    pub(crate) fn start_round(&mut self, round: u32, total: usize) {
        self.snapshot = ProgressSnapshot {
            round,
            done: 0,
            total,
        };
        if let Some(bar) = self.bar.as_ref() {
            bar.set_prefix(format!("第{round}轮"));
            bar.set_length(total as u64);
            bar.set_position(0);
        }
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.snapshot.done = (self.snapshot.done + n).min(self.snapshot.total);
        if let Some(bar) = self.bar.as_ref() {
            bar.set_position(self.snapshot.done as u64);
        }
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot
    }

    pub(crate) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}
