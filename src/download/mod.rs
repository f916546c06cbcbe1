//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`      — 数据模型（ChapterRef / ChapterRange / SyncReport / ProgressSnapshot 等）
//! - `error`       — 同步引擎错误类型
//! - `naming`      — 目录/文件命名规则
//! - `plan`        — 续传计划与章节范围过滤
//! - `fetcher`     — 带重试的网络抓取
//! - `persist`     — 扩展名判定、转码与原子写入
//! - `page_pool`   — 单章内图片并发下载工作池
//! - `progress`    — 进度上报与 CLI 进度条
//! - `downloader`  — 系列/单章同步编排

pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod naming;
pub(crate) mod page_pool;
pub mod persist;
pub mod plan;
pub mod progress;

pub use downloader::Downloader;
pub use error::{SyncError, SyncResult, TransportCause};
pub use models::{ChapterRange, ProgressSnapshot, SyncReport};
