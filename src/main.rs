//! Bato 漫画镜像下载器命令行入口。
//!
//! 读取 `config.yml`（不存在时生成带注释的默认配置），命令行参数覆盖本次运行的配置，
//! 然后同步整个系列或单个章节。任何致命错误都以退出码 1 结束；重新运行即可从断点继续。

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgGroup, Parser};
use tracing::{error, info};
use url::Url;

use bato_downloader::base_system::config::load_or_create;
use bato_downloader::base_system::context::Config;
use bato_downloader::base_system::logging::{LogOptions, LogSystem};
use bato_downloader::download::naming::NamingMode;
use bato_downloader::download::persist::{SUPPORTED_TARGETS, is_supported_target};
use bato_downloader::download::{ChapterRange, Downloader, SyncReport};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "bato-downloader")]
#[command(about = "Resumable manga mirror for Bato series and chapters")]
#[command(group(ArgGroup::new("source").args(["series", "chapter"]).multiple(false)))]
struct Cli {
    /// 系列页地址（同步整个系列）
    #[arg(long, value_name = "URL")]
    series: Option<String>,

    /// 章节页地址（只同步这一章）
    #[arg(long, value_name = "URL")]
    chapter: Option<String>,

    /// 起始章节号（含），仅系列模式
    #[arg(long, requires = "series")]
    start: Option<String>,

    /// 结束章节号（含），仅系列模式
    #[arg(long, requires = "series")]
    end: Option<String>,

    /// 命名模式：default / verbose / raw
    #[arg(long, value_name = "MODE")]
    naming: Option<NamingMode>,

    /// 保存图片格式（jpg / png / webp），不填则保持原格式
    #[arg(long, value_name = "EXT")]
    format: Option<String>,

    /// 下载根目录
    #[arg(long, value_name = "DIR")]
    save_dir: Option<String>,

    /// 单章内图片并发数
    #[arg(long)]
    workers: Option<usize>,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件，方便 Docker 挂载）
    #[arg(long)]
    data_dir: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("Bato Downloader v{}", VERSION);
        return ExitCode::SUCCESS;
    }

    let data_dir = cli.data_dir.as_ref().map(PathBuf::from);
    let _log = match init_logging(cli.debug, data_dir.as_deref()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, data_dir.as_deref()) {
        Ok(report) => {
            info!(
                target: "startup",
                chapters = report.chapters_synced,
                skipped = report.chapters_skipped,
                pages = report.pages_fetched,
                "运行结束"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(target: "startup", "{err:#}");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, data_dir: Option<&Path>) -> Result<SyncReport> {
    let mut config = load_or_create::<Config>(data_dir).context("加载配置失败")?;
    apply_overrides(&mut config, &cli)?;

    info!(target: "startup", "当前版本: v{}", VERSION);
    info!(
        target: "startup",
        save_dir = %config.default_save_dir().display(),
        naming = %config.naming_mode,
        "保存位置"
    );

    let mut downloader = Downloader::from_config(config).context("初始化 HTTP 客户端失败")?;

    match (cli.series.as_deref(), cli.chapter.as_deref()) {
        (Some(series), None) => {
            let url = parse_url(series)?;
            let range = ChapterRange {
                start: cli.start.clone(),
                end: cli.end.clone(),
            };
            downloader
                .sync_series(&url, &range)
                .with_context(|| format!("同步系列失败: {url}"))
        }
        (None, Some(chapter)) => {
            let url = parse_url(chapter)?;
            downloader
                .sync_single_chapter(&url)
                .with_context(|| format!("同步章节失败: {url}"))
        }
        _ => bail!("需要指定 --series 或 --chapter 之一"),
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(mode) = cli.naming {
        config.naming_mode = mode;
    }
    if let Some(format) = cli.format.as_ref() {
        config.image_format = format.clone();
    }
    if let Some(dir) = cli.save_dir.as_ref() {
        config.save_path = dir.clone();
    }
    if let Some(workers) = cli.workers {
        config.max_workers = workers;
    }

    if let Some(ext) = config.target_extension()
        && !is_supported_target(&ext)
    {
        return Err(anyhow!(
            "不支持的图片格式 {ext:?}，可选: {}",
            SUPPORTED_TARGETS.join(", ")
        ));
    }
    Ok(())
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("无效的地址: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("只支持 http/https 地址: {url}");
    }
    Ok(url)
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
