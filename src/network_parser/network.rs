//! HTTP 会话与页面文档。
//!
//! 整次运行共用一个 `reqwest` 连接池；会话本身只读，可在工作线程间克隆共享。

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn new(user_agent: &str) -> reqwest::Result<Self> {
        let mut default_headers = HeaderMap::new();
        // reqwest 未启用 gzip 解码，要求原始编码以便字节可直接使用
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder().default_headers(default_headers).build()?;
        Ok(Self { client })
    }

    /// 单次 GET，不做重试；超时作用于整个请求。
    pub(crate) fn get(&self, url: &Url, timeout: Duration, accept: &'static str) -> reqwest::Result<Response> {
        debug!(target: "network", %url, "GET");
        self.client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static(accept))
            .timeout(timeout)
            .send()
    }
}

/// 已下载的 HTML 文档及其最终地址（用于解析相对链接）。
#[derive(Debug, Clone)]
pub struct Document {
    pub url: Url,
    pub html: String,
}

impl Document {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }
}
