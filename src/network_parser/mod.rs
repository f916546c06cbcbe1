//! 网络与页面解析。
//!
//! 子模块：
//! - `network` — 共享 HTTP 会话与文档类型
//! - `markup`  — 两种站点页面结构（新版 / 旧版）的章节列表、图片列表、标题解析

pub mod markup;
pub mod network;
