//! 运行日志：终端 + `logs/latest.log` 两路输出。
//!
//! 进程结束（正常返回、Ctrl-C、panic）时把本次 `latest.log` 压缩成 `log_<时间>.zip`；
//! 启动时若上次遗留的日志超过 10 MiB 也会先归档。

use std::fs::{self, File};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const LATEST_LOG: &str = "latest.log";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("cannot install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("log file io: {0}")]
    Io(#[from] io::Error),
    #[error("log archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("log timestamp: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// 终端输出 DEBUG 级别（文件始终为 DEBUG）。
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// 关闭后只写文件。
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// 持有文件写线程；drop 时刷新并归档。
pub struct LogSystem {
    session: Arc<LogSession>,
}

struct LogSession {
    dir: PathBuf,
    writer: Mutex<Option<WorkerGuard>>,
    archive_on_exit: bool,
    closed: AtomicBool,
}

impl LogSystem {
    /// 安装全局 subscriber；`base_dir` 为空时日志目录为 `./logs`。
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let dir = base_dir.map_or_else(|| PathBuf::from("logs"), |b| b.join("logs"));
        fs::create_dir_all(&dir)?;

        let latest = dir.join(LATEST_LOG);
        if fs::metadata(&latest).is_ok_and(|m| m.len() >= ROTATE_AT_BYTES) {
            archive_log_file(&latest, &dir)?;
        }

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&dir, LATEST_LOG));

        let console_level = if options.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let console_layer = options.console.then(|| {
            fmt::layer()
                .with_target(false)
                .with_ansi(options.use_color)
                .with_writer(io::stderr)
                .with_filter(console_level)
        });
        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        let session = Arc::new(LogSession {
            dir,
            writer: Mutex::new(Some(guard)),
            archive_on_exit: options.archive_on_exit,
            closed: AtomicBool::new(false),
        });
        session.hook_interrupt();
        session.hook_panic();

        Ok(Self { session })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.session.close();
    }
}

impl LogSession {
    fn hook_interrupt(self: &Arc<Self>) {
        let session = Arc::clone(self);
        // 页面先写临时文件再 rename，中断不会留下半截图片
        let _ = ctrlc::set_handler(move || {
            info!("收到中断信号，退出；再次运行即可从断点继续");
            session.close();
            std::process::exit(130);
        });
    }

    fn hook_panic(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            error!("panic: {info}");
            session.close();
            previous(info);
        }));
    }

    /// 只执行一次：drop 写线程的 guard 会同步刷完缓冲，然后再归档。
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if self.archive_on_exit
            && let Err(err) = archive_log_file(&self.dir.join(LATEST_LOG), &self.dir)
        {
            eprintln!("failed to archive log: {err}");
        }
    }
}

/// 把 `latest` 压进 `dir/log_<时间>.zip` 并删除原文件；不存在或为空时不生成归档。
fn archive_log_file(latest: &Path, dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let size = match fs::metadata(latest) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size == 0 {
        fs::remove_file(latest)?;
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive = dir.join(format!("log_{stamp}.zip"));

    {
        let mut zip = zip::ZipWriter::new(File::create(&archive)?);
        zip.start_file(
            format!("{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(latest)?, &mut zip)?;
        zip.finish()?;
    }

    fs::remove_file(latest)?;
    Ok(Some(archive))
}
