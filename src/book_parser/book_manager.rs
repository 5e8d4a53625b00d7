//! 下载进度（已完成章节 ID 集合）与 txt 输出文件的落盘。

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::base_system::context::{Config, safe_fs_name};
use crate::download::models::{BookMeta, Chapter, ChapterResult};

pub type DownloadedSet = HashSet<String>;

pub struct BookManager {
    pub meta: BookMeta,
    save_dir: PathBuf,
    status_file: PathBuf,
    output_file: PathBuf,
}

impl BookManager {
    pub fn new(config: &Config, save_dir: Option<&Path>, meta: BookMeta) -> io::Result<Self> {
        let save_dir = save_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.default_save_dir());
        fs::create_dir_all(&save_dir)?;

        let status_file = save_dir.join(&config.status_file);
        let output_file = save_dir.join(format!("{}.txt", safe_fs_name(&meta.name, "_", 120)));

        Ok(Self {
            meta,
            save_dir,
            status_file,
            output_file,
        })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// 读取进度文件；不存在或格式不对时视为空集合。
    pub fn load_status(&self) -> DownloadedSet {
        let raw = match fs::read_to_string(&self.status_file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return DownloadedSet::new(),
            Err(e) => {
                warn!(target: "book_manager", error = %e, "读取进度文件失败，按未下载处理");
                return DownloadedSet::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => {
                info!(target: "book_manager", "loaded resume state: chapters={}", ids.len());
                ids.into_iter().collect()
            }
            Err(e) => {
                warn!(target: "book_manager", error = %e, "进度文件格式错误，按未下载处理");
                DownloadedSet::new()
            }
        }
    }

    /// 以 JSON 数组写出进度（排序后写，文件内容稳定）。
    pub fn save_status(&self, downloaded: &DownloadedSet) -> io::Result<()> {
        let mut ids: Vec<&String> = downloaded.iter().collect();
        ids.sort();
        let json = serde_json::to_vec_pretty(&ids).map_err(io::Error::other)?;
        write_atomic(&self.status_file, &json)?;
        debug!(target: "book_manager", count = ids.len(), "进度已保存");
        Ok(())
    }

    pub fn header(&self) -> String {
        format!(
            "小说名: {}\n作者: {}\n内容简介: {}\n\n",
            self.meta.name, self.meta.author, self.meta.description
        )
    }

    /// 输出文件不存在时先写入书籍信息头。
    pub fn ensure_output(&self) -> io::Result<()> {
        if self.output_file.exists() {
            return Ok(());
        }
        write_atomic(&self.output_file, self.header().as_bytes())
    }

    /// 按目录顺序整体重写输出文件。
    ///
    /// 只写本次运行内存中持有的章节；往次运行已完成、本次没有结果的章节直接跳过。
    /// 没有任何结果时不动文件。
    pub fn write_in_order(
        &self,
        chapters: &[Chapter],
        results: &BTreeMap<usize, ChapterResult>,
    ) -> io::Result<usize> {
        if results.is_empty() {
            return Ok(0);
        }
        let mut out = self.header();
        let mut written = 0;
        for ch in chapters {
            let Some(result) = results.get(&ch.sequence_index) else {
                continue;
            };
            out.push_str(&result.heading());
            out.push('\n');
            out.push_str(&result.content);
            out.push_str("\n\n");
            written += 1;
        }
        write_atomic(&self.output_file, out.as_bytes())?;
        debug!(target: "book_manager", written, path = %self.output_file.display(), "输出文件已重写");
        Ok(written)
    }
}

/// 先写同目录临时文件再替换，避免中断时留下半截文件。
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> BookMeta {
        BookMeta {
            name: "测试/小说".to_string(),
            author: "作者".to_string(),
            description: "简介".to_string(),
        }
    }

    fn chapters(n: usize) -> Vec<Chapter> {
        (0..n)
            .map(|i| Chapter::new(format!("id{i}"), i))
            .collect()
    }

    fn result(idx: usize, api_title: Option<&str>) -> ChapterResult {
        ChapterResult {
            sequence_index: idx,
            base_title: format!("第{}章", idx + 1),
            api_title: api_title.map(str::to_string),
            content: format!("    正文{idx}"),
        }
    }

    #[test]
    fn output_name_is_sanitized_book_name() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BookManager::new(&Config::default(), Some(dir.path()), meta()).unwrap();
        assert_eq!(manager.output_file(), dir.path().join("测试、小说.txt"));
        assert_eq!(manager.status_file(), dir.path().join("chapter.json"));
    }

    #[test]
    fn status_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BookManager::new(&Config::default(), Some(dir.path()), meta()).unwrap();
        assert!(manager.load_status().is_empty());

        let set: DownloadedSet = ["b", "a"].iter().map(|s| s.to_string()).collect();
        manager.save_status(&set).unwrap();
        let raw = fs::read_to_string(manager.status_file()).unwrap();
        assert_eq!(serde_json::from_str::<Vec<String>>(&raw).unwrap(), vec!["a", "b"]);
        assert_eq!(manager.load_status(), set);

        fs::write(manager.status_file(), "{not json").unwrap();
        assert!(manager.load_status().is_empty());
    }

    #[test]
    fn writes_chapters_in_sequence_order_skipping_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BookManager::new(&Config::default(), Some(dir.path()), meta()).unwrap();
        let chapters = chapters(3);
        let mut results = BTreeMap::new();
        results.insert(2, result(2, None));
        results.insert(0, result(0, Some("开端")));

        assert_eq!(manager.write_in_order(&chapters, &results).unwrap(), 2);
        let text = fs::read_to_string(manager.output_file()).unwrap();
        assert_eq!(
            text,
            "小说名: 测试/小说\n作者: 作者\n内容简介: 简介\n\n\
             第1章 开端\n    正文0\n\n\
             第3章\n    正文2\n\n"
        );
    }

    #[test]
    fn empty_results_leave_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BookManager::new(&Config::default(), Some(dir.path()), meta()).unwrap();
        fs::write(manager.output_file(), "previous").unwrap();
        assert_eq!(manager.write_in_order(&chapters(2), &BTreeMap::new()).unwrap(), 0);
        assert_eq!(fs::read_to_string(manager.output_file()).unwrap(), "previous");
    }

    #[test]
    fn ensure_output_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BookManager::new(&Config::default(), Some(dir.path()), meta()).unwrap();
        manager.ensure_output().unwrap();
        assert_eq!(fs::read_to_string(manager.output_file()).unwrap(), manager.header());

        fs::write(manager.output_file(), "kept").unwrap();
        manager.ensure_output().unwrap();
        assert_eq!(fs::read_to_string(manager.output_file()).unwrap(), "kept");
    }
}
