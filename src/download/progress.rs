//! 进度上报与 CLI 进度条管理。

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::ProgressSnapshot;

pub type ProgressCallback = Box<dyn FnMut(ProgressSnapshot) + Send>;

struct CliBars {
    _mp: MultiProgress,
    chapter_bar: ProgressBar,
    page_bar: ProgressBar,
}

pub(crate) struct ProgressReporter {
    pub(crate) snapshot: ProgressSnapshot,
    cb: Option<ProgressCallback>,
    cli: Option<CliBars>,
}

impl ProgressReporter {
    fn emit(&mut self) {
        if let Some(cb) = self.cb.as_mut() {
            cb(self.snapshot);
        }
    }

    pub(crate) fn begin_chapter(&mut self, identifier: &str, page_total: usize, already: usize) {
        self.snapshot.page_total = page_total;
        self.snapshot.page_done = already.min(page_total);
        self.emit();

        if let Some(cli) = self.cli.as_ref() {
            cli.page_bar.set_prefix(format!("第 {identifier} 章"));
            cli.page_bar.set_length(page_total as u64);
            cli.page_bar.set_position(self.snapshot.page_done as u64);
        }
    }

    pub(crate) fn inc_page(&mut self) {
        if self.snapshot.page_total == 0 {
            return;
        }
        self.snapshot.page_done = (self.snapshot.page_done + 1).min(self.snapshot.page_total);
        self.emit();
        if let Some(cli) = self.cli.as_ref() {
            cli.page_bar.inc(1);
        }
    }

    /// 章节处理完毕（含跳过的章节）。
    pub(crate) fn inc_chapter(&mut self) {
        self.snapshot.chapter_done =
            (self.snapshot.chapter_done + 1).min(self.snapshot.chapter_total);
        self.emit();
        if let Some(cli) = self.cli.as_ref() {
            cli.chapter_bar.inc(1);
        }
    }

    pub(crate) fn finish(&mut self) {
        let Some(cli) = self.cli.take() else {
            return;
        };
        cli.page_bar.finish_and_clear();
        cli.chapter_bar.finish_and_clear();
    }

    /// 取回回调，供下一次运行复用。
    pub(crate) fn into_callback(mut self) -> Option<ProgressCallback> {
        self.finish();
        self.cb.take()
    }
}

// ── 构造函数 ──────────────────────────────────────────────────

/// 有回调时不画进度条，由调用方自行展示。
pub(crate) fn make_reporter(
    show_progress: bool,
    chapter_total: usize,
    progress: Option<ProgressCallback>,
) -> ProgressReporter {
    let use_cli_bars = progress.is_none() && show_progress && chapter_total > 0;

    let cli = if use_cli_bars {
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        let chapter_bar = mp.add(ProgressBar::new(chapter_total as u64));
        chapter_bar.set_style(style.clone());
        chapter_bar.set_prefix("章节");

        let page_bar = mp.add(ProgressBar::new(0));
        page_bar.set_style(style);
        page_bar.set_prefix("图片");

        Some(CliBars {
            _mp: mp,
            chapter_bar,
            page_bar,
        })
    } else {
        None
    };

    let mut reporter = ProgressReporter {
        snapshot: ProgressSnapshot {
            chapter_total,
            ..ProgressSnapshot::default()
        },
        cb: progress,
        cli,
    };
    reporter.emit();
    reporter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_sees_every_step() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reporter = make_reporter(
            true,
            2,
            Some(Box::new(move |s| sink.lock().unwrap().push(s))),
        );
        reporter.begin_chapter("1", 3, 1);
        reporter.inc_page();
        reporter.inc_page();
        reporter.inc_page();
        reporter.inc_chapter();
        assert!(reporter.into_callback().is_some());

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.chapter_done, 1);
        assert_eq!(last.chapter_total, 2);
        assert_eq!(last.page_done, 3);
        assert_eq!(last.page_total, 3);
        assert_eq!(seen.len(), 6);
    }
}
