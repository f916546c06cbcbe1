//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};
use crate::download::fetcher::RetryPolicy;
use crate::download::naming::NamingMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 保存配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub naming_mode: NamingMode,
    #[serde(default)]
    pub image_format: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 解析配置
    #[serde(default = "default_title_suffixes")]
    pub title_suffixes: Vec<String>,

    // 界面配置
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            naming_mode: NamingMode::default(),
            image_format: String::new(),
            jpeg_quality: default_jpeg_quality(),
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_wait_ms: default_retry_wait_ms(),
            user_agent: default_user_agent(),
            title_suffixes: default_title_suffixes(),
            show_progress: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "save_path",
                description: "下载根目录（留空则为当前目录下的 Manga）",
            },
            FieldMeta {
                name: "naming_mode",
                description: "命名模式, 可选: [default, verbose, raw]\nraw 不清理标题中的非法字符，部分文件系统上可能无法创建目录",
            },
            FieldMeta {
                name: "image_format",
                description: "保存图片格式, 可选: [jpg, png, webp]（留空则保持原格式）",
            },
            FieldMeta {
                name: "jpeg_quality",
                description: "JPEG 转码质量 (1-100)",
            },
            FieldMeta {
                name: "max_workers",
                description: "单章内图片并发下载线程数",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "单个请求最多尝试次数",
            },
            FieldMeta {
                name: "retry_wait_ms",
                description: "失败后重试前的固定等待时间, 单位ms",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "title_suffixes",
                description: "从页面 <title> 末尾去除的站点后缀",
            },
            FieldMeta {
                name: "show_progress",
                description: "是否在终端显示下载进度条",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("Manga")
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    /// 目标图片扩展名（小写、去掉前导点）；未配置时为 `None`，即按原格式保存。
    pub fn target_extension(&self) -> Option<String> {
        let ext = self.image_format.trim().trim_start_matches('.');
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.max_retries.max(1),
            timeout: Duration::from_secs(self.request_timeout.max(1)),
            backoff: Duration::from_millis(self.retry_wait_ms),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.clamp(1, 16)
    }
}

/// 清理文件名：去除常见文件系统不允许的字符 `\ / : * ? " < > |` 与控制字符。
pub fn safe_fs_name(name: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|ch| !matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|ch| (*ch as u32) >= 32)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.len() != cleaned.len() {
        cleaned = trimmed.to_string();
    }
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
        // 避免在多字节 UTF-8 字符中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_true() -> bool {
    true
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_max_workers() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_wait_ms() -> u64 {
    2000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_title_suffixes() -> Vec<String> {
    vec![
        " - Read Free Manga Online at Bato.To".to_string(),
        " - Bato.To".to_string(),
        " Manga".to_string(),
    ]
}
