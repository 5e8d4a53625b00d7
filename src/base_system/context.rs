//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

/// `request_rate_limit` 允许的上限（秒）。
pub const MAX_RATE_LIMIT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout: u64,
    #[serde(default = "default_request_rate_limit")]
    pub request_rate_limit: f64,
    #[serde(default = "default_round_pause_ms")]
    pub round_pause_ms: u64,
    #[serde(default)]
    pub max_rounds: u32,
    #[serde(default)]
    pub insecure_tls: bool,

    // 保存配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_status_file")]
    pub status_file: String,

    // API 配置
    #[serde(default)]
    pub official_api: OfficialApi,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// 设备/应用身份参数，整个运行期间保持不变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficialApi {
    pub install_id: String,
    pub device_id: String,
    pub aid: String,
    pub update_version_code: String,
    #[serde(default = "default_version_code")]
    pub version_code: String,
    #[serde(default = "default_version_name")]
    pub version_name: String,
}

impl Default for OfficialApi {
    fn default() -> Self {
        Self {
            install_id: "1021884247846707".to_string(),
            device_id: "1021884247842611".to_string(),
            aid: "1967".to_string(),
            update_version_code: "66932".to_string(),
            version_code: default_version_code(),
            version_name: default_version_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub directory_url: String,
    pub book_info_url: String,
    pub batch_full_url: String,
    pub register_key_url: String,
    pub signer_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            directory_url: "https://fanqienovel.com/api/reader/directory/detail".to_string(),
            book_info_url: "https://api5-normal-sinfonlinec.fqnovel.com/reading/user/share/info/v"
                .to_string(),
            batch_full_url: "https://api5-normal-sinfonlineb.fqnovel.com/reading/reader/batch_full/v"
                .to_string(),
            register_key_url: "https://api5-normal-sinfonlineb.fqnovel.com/reading/crypt/registerkey"
                .to_string(),
            signer_url: "https://fq.0013107.xyz/api/core_sixgod".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            batch_timeout: default_batch_timeout(),
            request_rate_limit: default_request_rate_limit(),
            round_pause_ms: default_round_pause_ms(),
            max_rounds: 0,
            insecure_tls: false,
            save_path: String::new(),
            status_file: default_status_file(),
            official_api: OfficialApi::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "max_workers",
                description: "最大并发线程数（同时下载的批次数）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "目录/简介/密钥/签名请求超时时间（秒）",
            },
            FieldMeta {
                name: "batch_timeout",
                description: "批量正文请求超时时间（秒）",
            },
            FieldMeta {
                name: "request_rate_limit",
                description: "两次正文请求之间的最小间隔（秒）",
            },
            FieldMeta {
                name: "round_pause_ms",
                description: "两轮重试之间的停顿, 单位ms",
            },
            FieldMeta {
                name: "max_rounds",
                description: "最大下载轮数（0 表示不限制，直到全部成功）",
            },
            FieldMeta {
                name: "insecure_tls",
                description: "是否跳过 TLS 证书校验",
            },
            FieldMeta {
                name: "save_path",
                description: "保存路径（留空为当前目录）",
            },
            FieldMeta {
                name: "status_file",
                description: "下载进度文件名（与小说保存在同一目录）",
            },
            FieldMeta {
                name: "official_api",
                description: "设备与应用标识",
            },
            FieldMeta {
                name: "endpoints",
                description: "接口地址",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), String> {
        let limit = self.request_rate_limit;
        if !limit.is_finite() || limit > MAX_RATE_LIMIT_SECS as f64 {
            return Err(format!(
                "request_rate_limit must be at most {MAX_RATE_LIMIT_SECS} seconds, got {limit}"
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// 正文请求最小间隔；非正值视为不限速，过大的值截断到 `MAX_RATE_LIMIT_SECS`。
    pub fn rate_limit_interval(&self) -> Duration {
        let max = Duration::from_secs(MAX_RATE_LIMIT_SECS);
        if self.request_rate_limit.is_nan() || self.request_rate_limit <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.request_rate_limit)
            .map(|d| d.min(max))
            .unwrap_or(max)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout.max(1))
    }

    pub fn round_pause(&self) -> Duration {
        Duration::from_millis(self.round_pause_ms)
    }

    pub fn round_cap(&self) -> Option<u32> {
        (self.max_rounds > 0).then_some(self.max_rounds)
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            '"' => '“',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_max_workers() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    15
}

fn default_batch_timeout() -> u64 {
    5
}

fn default_request_rate_limit() -> f64 {
    0.4
}

fn default_round_pause_ms() -> u64 {
    1000
}

fn default_status_file() -> String {
    "chapter.json".to_string()
}

fn default_version_code() -> String {
    "66932".to_string()
}

fn default_version_name() -> String {
    "6.6.9.32".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_fs_name_replaces_forbidden_characters() {
        assert_eq!(safe_fs_name("a/b:c?", "_", 120), "a、b：c？");
        assert_eq!(safe_fs_name("con", "_", 120), "_con");
        assert_eq!(safe_fs_name("  ..", "_", 120), "unnamed");
    }

    #[test]
    fn safe_fs_name_truncates_on_char_boundary() {
        let name = "番茄小说".repeat(20);
        let out = safe_fs_name(&name, "_", 10);
        assert!(out.len() <= 10);
        assert!(name.starts_with(&out));
    }

    #[test]
    fn non_positive_rate_limit_disables_spacing() {
        let mut cfg = Config::default();
        assert_eq!(cfg.rate_limit_interval(), Duration::from_millis(400));
        cfg.request_rate_limit = 0.0;
        assert_eq!(cfg.rate_limit_interval(), Duration::ZERO);
        cfg.request_rate_limit = -1.0;
        assert_eq!(cfg.rate_limit_interval(), Duration::ZERO);
        cfg.request_rate_limit = f64::NAN;
        assert_eq!(cfg.rate_limit_interval(), Duration::ZERO);
    }

    #[test]
    fn oversized_rate_limit_is_clamped_instead_of_panicking() {
        let max = Duration::from_secs(MAX_RATE_LIMIT_SECS);
        let mut cfg = Config::default();
        cfg.request_rate_limit = 1e30;
        assert_eq!(cfg.rate_limit_interval(), max);
        cfg.request_rate_limit = f64::INFINITY;
        assert_eq!(cfg.rate_limit_interval(), max);
        cfg.request_rate_limit = 90.0;
        assert_eq!(cfg.rate_limit_interval(), max);
        assert!(cfg.validate().is_err());

        cfg.request_rate_limit = 2.5;
        assert_eq!(cfg.rate_limit_interval(), Duration::from_millis(2500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_max_rounds_means_unbounded() {
        let mut cfg = Config::default();
        assert_eq!(cfg.round_cap(), None);
        cfg.max_rounds = 4;
        assert_eq!(cfg.round_cap(), Some(4));
    }
}
