//! 下载相关的数据模型定义。
//!
//! 包含章节引用、章节范围、同步状态、运行报告、进度快照等核心数据结构。

use std::fmt;

use url::Url;

/// 一个章节：原始章节号（可能是 `"12.5"` 或 `"Finale"`）与章节页地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    pub identifier: String,
    pub url: Url,
}

/// 按发布顺序（最旧在前）排列的章节列表。
pub type ChapterSet = Vec<ChapterRef>;

/// 一章的图片地址，按阅读顺序排列。
pub type PageSet = Vec<Url>;

/// 闭区间章节范围；两端都可省略。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// 单章同步状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Planning,
    Fetching,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Fetching => "fetching",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 单章同步结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    pub identifier: String,
    pub page_count: usize,
    pub already_present: usize,
    pub fetched: usize,
}

/// 一次运行的汇总。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// 实际走过同步状态机的章节数（含修复/校验）。
    pub chapters_synced: usize,
    /// 本地已存在、未访问网络直接跳过的章节数。
    pub chapters_skipped: usize,
    /// 因续传规则被重新校验的章节数。
    pub chapters_repaired: usize,
    pub pages_fetched: usize,
    pub pages_present: usize,
}

impl SyncReport {
    pub(crate) fn record(&mut self, outcome: &ChapterOutcome) {
        self.chapters_synced += 1;
        self.pages_fetched += outcome.fetched;
        self.pages_present += outcome.already_present;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSnapshot {
    pub chapter_done: usize,
    pub chapter_total: usize,
    pub page_done: usize,
    pub page_total: usize,
}
