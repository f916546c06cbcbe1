//! 本地目录/文件命名规则。
//!
//! 目录名只由 `(系列标题, 章节号, 命名模式)` 决定，重复运行总能映射回同一目录。
//! 页面文件名使用 1 起始的页码，零填充宽度由该章总页数决定。

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::base_system::context::safe_fs_name;

const MAX_NAME_LEN: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// 目录名为章节号，文件名只有页码。
    #[default]
    Default,
    /// 目录名与文件名都带系列标题和规范化后的章节号。
    #[serde(alias = "alternate-verbose")]
    Verbose,
    /// 与 default 相同，但系列标题原样使用、不做清理。
    Raw,
}

impl fmt::Display for NamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Raw => "raw",
        };
        f.write_str(s)
    }
}

impl FromStr for NamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "verbose" | "alternate-verbose" => Ok(Self::Verbose),
            "raw" => Ok(Self::Raw),
            other => Err(format!(
                "unknown naming mode {other:?} (expected default, verbose or raw)"
            )),
        }
    }
}

fn re_plain_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("valid regex"))
}

fn re_verbose_page_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" - (\d+)$").expect("valid regex"))
}

/// 规范化章节号：整数补零到 3 位，小数的整数部分补零到 4 位（`"4.5"` → `"0004.5"`），
/// 非数字原样返回。
pub fn normalize_identifier(identifier: &str) -> String {
    let Some(caps) = re_plain_number().captures(identifier.trim()) else {
        return identifier.to_string();
    };
    let whole = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    // 超过 u64 的章节号不会出现，当作非数字处理
    let Ok(whole_num) = whole.parse::<u64>() else {
        return identifier.to_string();
    };
    match caps.get(2) {
        Some(frac) => format!("{whole_num:04}.{}", frac.as_str()),
        None => format!("{whole_num:03}"),
    }
}

/// 页码零填充宽度：`1 + floor(log10(page_count))`，最小为 1。
pub fn page_width(page_count: usize) -> usize {
    page_count.max(1).to_string().len()
}

/// 系列目录名；raw 模式原样返回标题。
pub fn series_dir_name(series_title: &str, mode: NamingMode) -> String {
    match mode {
        NamingMode::Raw => series_title.to_string(),
        NamingMode::Default | NamingMode::Verbose => safe_fs_name(series_title, MAX_NAME_LEN),
    }
}

/// 名称经过清理后是否会改变（含非法字符、保留名或超长）。
pub fn needs_sanitising(name: &str) -> bool {
    safe_fs_name(name, MAX_NAME_LEN) != name
}

pub fn chapter_dir_name(series_title: &str, identifier: &str, mode: NamingMode) -> String {
    match mode {
        NamingMode::Raw => identifier.to_string(),
        NamingMode::Default => safe_fs_name(identifier, MAX_NAME_LEN),
        NamingMode::Verbose => safe_fs_name(
            &format!(
                "{} - Chapter {}",
                safe_fs_name(series_title, MAX_NAME_LEN),
                normalize_identifier(identifier)
            ),
            MAX_NAME_LEN * 2,
        ),
    }
}

/// `page_index` 从 0 开始；文件名中的页码从 1 开始。
pub fn page_file_name(
    series_title: &str,
    identifier: &str,
    page_index: usize,
    page_count: usize,
    mode: NamingMode,
    extension: &str,
) -> String {
    let width = page_width(page_count);
    let number = page_index + 1;
    match mode {
        NamingMode::Default | NamingMode::Raw => format!("{number:0width$}.{extension}"),
        NamingMode::Verbose => format!(
            "{} - {number:0width$}.{extension}",
            chapter_dir_name(series_title, identifier, mode)
        ),
    }
}

/// 从文件名反解出页面下标（0 起始）；非本工具管理的文件返回 `None`。
pub fn page_index_of(file_name: &str, mode: NamingMode) -> Option<usize> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => stem,
        _ => file_name,
    };
    let number = match mode {
        NamingMode::Default | NamingMode::Raw => stem.parse::<usize>().ok()?,
        NamingMode::Verbose => re_verbose_page_suffix()
            .captures(stem)?
            .get(1)?
            .as_str()
            .parse::<usize>()
            .ok()?,
    };
    number.checked_sub(1)
}
