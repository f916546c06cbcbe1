//! 带固定退避的重试抓取。
//!
//! 图片与 HTML 文档共用同一套策略：每次请求有独立超时；非 2xx 或传输错误后等待固定间隔再试，
//! 尝试次数耗尽即返回 `Transport` 错误，由上层中止整次运行。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use super::error::{SyncError, SyncResult, TransportCause};
use crate::network_parser::network::{Document, HttpSession};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/png,image/jpeg,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）。
    pub attempts: u32,
    pub timeout: Duration,
    /// 两次尝试之间的固定等待；不做指数增长。
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(2),
        }
    }
}

/// 本次运行中唯一做网络 I/O 的组件。克隆后共享同一连接池与计数器。
#[derive(Debug, Clone)]
pub struct PageFetcher {
    session: HttpSession,
    policy: RetryPolicy,
    requests: Arc<AtomicUsize>,
}

impl PageFetcher {
    pub fn new(session: HttpSession, policy: RetryPolicy) -> Self {
        Self {
            session,
            policy,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 已发出的 HTTP 请求数（含失败的尝试）。
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// 抓取图片原始字节。
    pub fn fetch(&self, url: &Url) -> SyncResult<Vec<u8>> {
        self.fetch_with_retry(url, ACCEPT_IMAGE, None).map(|r| r.body)
    }

    /// 与 [`fetch`](Self::fetch) 相同，但 `cancel` 置位后不再发起新的尝试。
    pub(crate) fn fetch_cancellable(&self, url: &Url, cancel: &AtomicBool) -> SyncResult<Vec<u8>> {
        self.fetch_with_retry(url, ACCEPT_IMAGE, Some(cancel)).map(|r| r.body)
    }

    pub fn fetch_text(&self, url: &Url) -> SyncResult<String> {
        self.fetch_document(url).map(|doc| doc.html)
    }

    /// 文档地址取重定向之后的最终地址，相对链接以它为基准解析。
    pub fn fetch_document(&self, url: &Url) -> SyncResult<Document> {
        let reply = self.fetch_with_retry(url, ACCEPT_HTML, None)?;
        if reply.url != *url {
            debug!(target: "network", from = %url, to = %reply.url, "跟随重定向");
        }
        Ok(Document::new(reply.url, String::from_utf8_lossy(&reply.body)))
    }

    fn fetch_with_retry(
        &self,
        url: &Url,
        accept: &'static str,
        cancel: Option<&AtomicBool>,
    ) -> SyncResult<Reply> {
        let attempts = self.policy.attempts.max(1);
        let mut made = 0u32;
        let mut last_cause = TransportCause::Network("no attempt made".to_string());

        while made < attempts {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                debug!(target: "network", %url, "已取消，停止重试");
                break;
            }
            made += 1;

            match self.attempt_once(url, accept) {
                Ok(reply) => {
                    if made > 1 {
                        debug!(target: "network", %url, attempt = made, "重试成功");
                    }
                    return Ok(reply);
                }
                Err(cause) => {
                    warn!(
                        target: "network",
                        %url,
                        attempt = made,
                        max = attempts,
                        %cause,
                        "请求失败"
                    );
                    last_cause = cause;
                }
            }

            if made < attempts && !self.policy.backoff.is_zero() {
                std::thread::sleep(self.policy.backoff);
            }
        }

        Err(SyncError::Transport {
            url: url.to_string(),
            attempts: made,
            cause: last_cause,
        })
    }

    fn attempt_once(&self, url: &Url, accept: &'static str) -> Result<Reply, TransportCause> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .session
            .get(url, self.policy.timeout, accept)
            .map_err(|e| TransportCause::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportCause::Status(status.as_u16()));
        }
        let final_url = resp.url().clone();
        let body = resp
            .bytes()
            .map_err(|e| TransportCause::Network(e.to_string()))?;
        Ok(Reply {
            url: final_url,
            body: body.to_vec(),
        })
    }
}

/// 一次成功响应：最终地址与响应体。
struct Reply {
    url: Url,
    body: Vec<u8>,
}
