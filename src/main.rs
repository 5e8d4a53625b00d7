//! 番茄小说章节批量下载器。
//!
//! 给定书籍 ID（或分享链接），拉取目录、经签名接口批量下载并解密正文，按目录顺序写出 txt；
//! 进度落盘，中断后重新运行会跳过已完成章节。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/中断令牌/书籍 ID 解析
//! - `network_parser`：章节目录与书籍简介
//! - `third_party`：签名服务、批量正文接口、会话密钥
//! - `book_parser`：解密与排版、进度与输出文件
//! - `download`：限速、批次并发拉取、按轮重试的主流程

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::info;

mod base_system;
mod book_parser;
mod download;
mod network_parser;
#[cfg(test)]
mod test_support;
mod third_party;

use base_system::book_id::parse_book_id;
use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use base_system::shutdown::{ShutdownToken, install_ctrlc};
use download::downloader::Downloader;
use network_parser::network::DirectoryClient;
use third_party::official::OfficialSource;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "tomato-chapter-fetch")]
#[command(about = "Tomato Novel chapter downloader (resumable)")]
#[command(version)]
struct Cli {
    /// 书籍 ID 或书籍页面/分享链接
    book: String,

    /// 保存目录（默认使用配置中的 save_path）
    #[arg(long)]
    save_path: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 最大下载轮数，0 表示一直重试到全部完成（覆盖配置）
    #[arg(long)]
    max_rounds: Option<u32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let book_id =
        parse_book_id(&cli.book).ok_or_else(|| anyhow!("无法识别的书籍 ID 或链接: {}", cli.book))?;

    let mut config = load_or_create::<Config>(data_dir).context("加载配置失败")?;
    if let Some(rounds) = cli.max_rounds {
        config.max_rounds = rounds;
    }

    let cancel = ShutdownToken::new();
    install_ctrlc(&cancel).context("注册 Ctrl+C 处理失败")?;

    let source = OfficialSource::from_config(&config)?;
    let directory = DirectoryClient::new(&config)?;
    let downloader = Downloader::new(config, Box::new(directory), Arc::new(source), cancel)
        .with_progress(true);

    let report = downloader.run(&book_id, cli.save_path.as_deref())?;
    info!(
        target: "startup",
        state = %report.state,
        rounds = report.rounds,
        "本次完成 {} 章，剩余 {} 章，共 {} 章",
        report.success,
        report.remaining,
        report.total
    );
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
