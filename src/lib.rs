//! Bato Downloader（漫画镜像下载器）Rust 实现。
//!
//! 本 crate 负责：把连载漫画站点的章节/分页图片同步到本地目录，支持断点续传。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/路径/临时文件清理等基础设施
//! - `network_parser`：HTTP 会话与两种页面结构的解析
//! - `download`：命名规则、续传计划、带重试的抓取、页面工作池、章节/系列同步编排

#![forbid(unsafe_code)]

pub mod base_system;
pub mod download;
pub mod network_parser;
