//! 同步引擎的错误类型。
//!
//! 所有错误都是致命的：上层直接中止本次运行，已落盘的页面保留，重新运行即可续传。

use std::fmt;
use std::path::PathBuf;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCause {
    Status(u16),
    Network(String),
}

impl fmt::Display for TransportCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 重试耗尽后仍失败。
    #[error("fetch failed for {url} after {attempts} attempt(s): {cause}")]
    Transport {
        url: String,
        attempts: u32,
        cause: TransportCause,
    },

    /// 两种已知页面结构都无法匹配，或匹配后无法解码。
    #[error("unrecognized markup at {url}: {reason}")]
    UnrecognizedMarkup { url: String, reason: String },

    #[error("inconsistent local state in {}: {reason}", path.display())]
    InconsistentState { path: PathBuf, reason: String },

    #[error("chapter {identifier:?} is not listed in the series")]
    UnknownChapter { identifier: String },

    #[error("image transcode failed for {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn markup(url: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::UnrecognizedMarkup {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
