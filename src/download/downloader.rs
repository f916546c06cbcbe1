//! 下载主流程编排。
//!
//! - [`Downloader::sync_series`]：抓一次系列页，按范围过滤章节后逐章串行同步；
//!   本地已有页面的章节不访问网络直接跳过，只对续传边界上的章节重新校验。
//! - [`Downloader::sync_single_chapter`]：只同步一个章节页，系列名与章节号取自 `<title>`。
//!
//! 单章同步是一个小状态机：`Planning → Fetching → Persisting → Done`，任一步出错进入 `Failed`。

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use url::Url;

use super::error::{SyncError, SyncResult};
use super::fetcher::PageFetcher;
use super::models::{ChapterOutcome, ChapterRange, ChapterRef, ChapterState, SyncReport};
use super::naming::{
    NamingMode, chapter_dir_name, needs_sanitising, page_file_name, series_dir_name,
};
use super::page_pool::{PageJob, run_pages};
use super::persist::PreparedPage;
use super::plan::{LocalStatus, apply_range, local_status, plan_chapter};
use super::progress::{ProgressCallback, ProgressReporter, make_reporter};
use crate::base_system::context::Config;
use crate::base_system::file_cleaner::remove_stale_parts;
use crate::network_parser::markup::{chapter_title, extract_chapters, extract_pages, page_title};
use crate::network_parser::network::{Document, HttpSession};

pub struct Downloader {
    config: Config,
    fetcher: PageFetcher,
    progress: Option<ProgressCallback>,
}

/// 本次运行中一个系列的落盘位置。
struct SeriesTarget {
    title: String,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(config: Config, fetcher: PageFetcher) -> Self {
        Self {
            config,
            fetcher,
            progress: None,
        }
    }

    /// 按配置建立共享会话与重试策略。
    pub fn from_config(config: Config) -> reqwest::Result<Self> {
        let session = HttpSession::new(&config.user_agent)?;
        let fetcher = PageFetcher::new(session, config.retry_policy());
        Ok(Self::new(config, fetcher))
    }

    /// 挂接进度回调；挂接后不再绘制终端进度条。
    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    fn mode(&self) -> NamingMode {
        self.config.naming_mode
    }

    fn reporter(&mut self, chapter_total: usize) -> ProgressReporter {
        make_reporter(self.config.show_progress, chapter_total, self.progress.take())
    }

    fn series_target(&self, title: String) -> SeriesTarget {
        if self.mode() == NamingMode::Raw {
            warn!(
                target: "download",
                series = %title,
                unsafe_chars = needs_sanitising(&title),
                "raw 命名模式：标题 {title:?} 原样用作目录名，未做清理"
            );
        }
        let dir = self
            .config
            .default_save_dir()
            .join(series_dir_name(&title, self.mode()));
        SeriesTarget { title, dir }
    }

    fn chapter_dir(&self, series: &SeriesTarget, identifier: &str) -> PathBuf {
        series
            .dir
            .join(chapter_dir_name(&series.title, identifier, self.mode()))
    }

    // ── 系列 ────────────────────────────────────────────────────

    pub fn sync_series(&mut self, series_url: &Url, range: &ChapterRange) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let doc = self.fetcher.fetch_document(series_url)?;
        let title = page_title(&doc, &self.config.title_suffixes)?;
        let all = extract_chapters(&doc)?;
        let chosen = apply_range(&all, range)?;
        let series = self.series_target(title);

        info!(
            target: "download",
            series = %series.title,
            total = all.len(),
            selected = chosen.len(),
            "开始同步：{} ({} / {} 章)",
            series.title,
            chosen.len(),
            all.len()
        );

        let statuses = chosen
            .iter()
            .map(|ch| local_status(&self.chapter_dir(&series, &ch.identifier), self.mode()))
            .collect::<SyncResult<Vec<_>>>()?;
        let boundary = repair_boundary(&statuses);

        let mut progress = self.reporter(chosen.len());
        let mut report = SyncReport::default();
        let mut result = Ok(());

        for (idx, chapter) in chosen.iter().enumerate() {
            let present = matches!(statuses[idx], LocalStatus::Present { .. });
            if present && boundary != Some(idx) {
                debug!(target: "download", chapter = %chapter.identifier, "本地已有，跳过");
                report.chapters_skipped += 1;
                progress.inc_chapter();
                continue;
            }
            if present {
                info!(target: "download", chapter = %chapter.identifier, "重新校验续传边界章节");
            }

            match self.sync_chapter(&series, chapter, None, &mut progress) {
                Ok(outcome) => {
                    report.record(&outcome);
                    if present {
                        report.chapters_repaired += 1;
                    }
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            progress.inc_chapter();
        }

        self.progress = progress.into_callback();
        result?;

        info!(
            target: "download",
            synced = report.chapters_synced,
            skipped = report.chapters_skipped,
            repaired = report.chapters_repaired,
            fetched = report.pages_fetched,
            "同步完成：{} 新增 {} 页，跳过 {} 章，用时 {:.1}s",
            series.title,
            report.pages_fetched,
            report.chapters_skipped,
            start.elapsed().as_secs_f32()
        );
        Ok(report)
    }

    // ── 单章 ────────────────────────────────────────────────────

    pub fn sync_single_chapter(&mut self, chapter_url: &Url) -> SyncResult<SyncReport> {
        let doc = self.fetcher.fetch_document(chapter_url)?;
        let (title, identifier) = chapter_title(&doc, &self.config.title_suffixes)?;
        let series = self.series_target(title);
        let chapter = ChapterRef {
            identifier,
            url: chapter_url.clone(),
        };

        info!(
            target: "download",
            series = %series.title,
            chapter = %chapter.identifier,
            "开始同步单章"
        );

        let mut progress = self.reporter(1);
        let outcome = self.sync_chapter(&series, &chapter, Some(doc), &mut progress);
        if outcome.is_ok() {
            progress.inc_chapter();
        }
        self.progress = progress.into_callback();

        let mut report = SyncReport::default();
        report.record(&outcome?);
        Ok(report)
    }

    // ── 单章状态机 ──────────────────────────────────────────────

    fn sync_chapter(
        &self,
        series: &SeriesTarget,
        chapter: &ChapterRef,
        prefetched: Option<Document>,
        progress: &mut ProgressReporter,
    ) -> SyncResult<ChapterOutcome> {
        let mut run = ChapterRun {
            identifier: &chapter.identifier,
            state: ChapterState::Planning,
        };
        debug!(target: "download", chapter = %chapter.identifier, state = %run.state, "进入状态");

        let outcome = self.drive_chapter(&mut run, series, chapter, prefetched, progress);
        match &outcome {
            Ok(o) => {
                run.transition(ChapterState::Done);
                info!(
                    target: "download",
                    chapter = %chapter.identifier,
                    pages = o.page_count,
                    fetched = o.fetched,
                    "章节完成"
                );
            }
            Err(err) => {
                run.transition(ChapterState::Failed);
                error!(target: "download", chapter = %chapter.identifier, error = %err, "章节同步失败");
            }
        }
        outcome
    }

    fn drive_chapter(
        &self,
        run: &mut ChapterRun<'_>,
        series: &SeriesTarget,
        chapter: &ChapterRef,
        prefetched: Option<Document>,
        progress: &mut ProgressReporter,
    ) -> SyncResult<ChapterOutcome> {
        let mode = self.mode();

        // Planning
        let doc = match prefetched {
            Some(doc) => doc,
            None => self.fetcher.fetch_document(&chapter.url)?,
        };
        let pages = extract_pages(&doc)?;
        let page_count = pages.len();
        let dir = self.chapter_dir(series, &chapter.identifier);

        let stale = remove_stale_parts(&dir).map_err(|e| SyncError::io(&dir, e))?;
        if stale > 0 {
            warn!(target: "download", chapter = %chapter.identifier, count = stale, "清理了上次中断留下的临时文件");
        }
        let plan = plan_chapter(&dir, page_count, mode)?;
        let already_present = plan.already_present.len();
        progress.begin_chapter(&chapter.identifier, page_count, already_present);

        if plan.is_complete() {
            debug!(target: "download", chapter = %chapter.identifier, "本地已完整，无需下载");
            return Ok(ChapterOutcome {
                identifier: chapter.identifier.clone(),
                page_count,
                already_present,
                fetched: 0,
            });
        }
        if !plan.dir_exists {
            std::fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
        }

        // Fetching：每页抓取后立即落盘
        run.transition(ChapterState::Fetching);
        let jobs: Vec<PageJob> = plan
            .to_fetch
            .iter()
            .map(|&index| PageJob {
                index,
                url: pages[index].clone(),
            })
            .collect();
        let ctx = PageContext {
            fetcher: &self.fetcher,
            config: &self.config,
            series,
            chapter,
            dir: &dir,
            page_count,
        };
        let fetched = run_pages(
            jobs,
            self.config.worker_count(),
            |job, cancel| ctx.fetch_page(job, cancel),
            |_| progress.inc_page(),
        )?;

        // Persisting：确认目录里每一页都已落盘
        run.transition(ChapterState::Persisting);
        let check = plan_chapter(&dir, page_count, mode)?;
        if !check.is_complete() {
            return Err(SyncError::InconsistentState {
                path: dir,
                reason: format!("pages {:?} still missing after fetch", check.to_fetch),
            });
        }

        Ok(ChapterOutcome {
            identifier: chapter.identifier.clone(),
            page_count,
            already_present,
            fetched,
        })
    }
}

/// 工作线程共享的单章上下文（只读）。
struct PageContext<'a> {
    fetcher: &'a PageFetcher,
    config: &'a Config,
    series: &'a SeriesTarget,
    chapter: &'a ChapterRef,
    dir: &'a Path,
    page_count: usize,
}

impl PageContext<'_> {
    fn fetch_page(&self, job: &PageJob, cancel: &AtomicBool) -> SyncResult<()> {
        let bytes = self.fetcher.fetch_cancellable(&job.url, cancel)?;
        let target = self.config.target_extension();
        let page = PreparedPage::new(bytes, &job.url, target.as_deref(), self.config.jpeg_quality);
        let name = page_file_name(
            &self.series.title,
            &self.chapter.identifier,
            job.index,
            self.page_count,
            self.config.naming_mode,
            &page.extension,
        );
        let path = self.dir.join(&name);
        page.commit(&path)?;
        debug!(target: "download", chapter = %self.chapter.identifier, page = job.index + 1, file = %name, "页面已保存");
        Ok(())
    }
}

struct ChapterRun<'a> {
    identifier: &'a str,
    state: ChapterState,
}

impl ChapterRun<'_> {
    fn transition(&mut self, next: ChapterState) {
        debug!(
            target: "download",
            chapter = self.identifier,
            from = %self.state,
            to = %next,
            "状态切换"
        );
        self.state = next;
    }
}

/// 续传边界：第一个缺失章节之前的那一章（若它在本地已有）。
fn repair_boundary(statuses: &[LocalStatus]) -> Option<usize> {
    statuses
        .iter()
        .position(|s| *s == LocalStatus::Absent)
        .and_then(|first_absent| first_absent.checked_sub(1))
}
