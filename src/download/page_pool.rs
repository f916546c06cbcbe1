//! 单章内的图片并发下载工作池。
//!
//! 章节之间严格串行；同一章内各页已知地址、文件名互不相同，可由有界线程池并行抓取落盘。
//! 任意一页出现致命错误即置位取消标志：未开始的页不再处理，已写完的页保留在磁盘上。

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as channel;
use tracing::debug;
use url::Url;

use super::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub(crate) struct PageJob {
    /// 0 起始的页面下标。
    pub index: usize,
    pub url: Url,
}

struct PageEvent {
    index: usize,
    result: SyncResult<()>,
}

/// 运行一批页面任务，返回成功写入的页数；出错时返回第一个错误。
///
/// `work` 在工作线程中执行（抓取 + 落盘），`on_saved` 在调用线程中按完成顺序回调。
pub(crate) fn run_pages<F>(
    jobs: Vec<PageJob>,
    workers: usize,
    work: F,
    mut on_saved: impl FnMut(usize),
) -> SyncResult<usize>
where
    F: Fn(&PageJob, &AtomicBool) -> SyncResult<()> + Sync,
{
    if jobs.is_empty() {
        return Ok(0);
    }

    let workers = workers.clamp(1, jobs.len());
    let (tx, rx) = channel::unbounded::<PageJob>();
    for job in jobs {
        // 接收端仍在本函数内，发送不会失败
        let _ = tx.send(job);
    }
    drop(tx);

    let (tx_evt, rx_evt) = channel::unbounded::<PageEvent>();
    let cancel = AtomicBool::new(false);
    let work = &work;
    let cancel_ref = &cancel;

    let mut saved = 0usize;
    let mut first_error: Option<SyncError> = None;

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let rx = rx.clone();
            let tx_evt = tx_evt.clone();
            scope.spawn(move || {
                while !cancel_ref.load(Ordering::Relaxed) {
                    let Ok(job) = rx.recv() else {
                        break;
                    };
                    let result = work(&job, cancel_ref);
                    if result.is_err() {
                        cancel_ref.store(true, Ordering::Relaxed);
                    }
                    if tx_evt.send(PageEvent { index: job.index, result }).is_err() {
                        break;
                    }
                }
                debug!(target: "download", worker = worker_id, "页面工作线程退出");
            });
        }
        drop(tx_evt);

        for evt in rx_evt.iter() {
            match evt.result {
                Ok(()) => {
                    saved += 1;
                    on_saved(evt.index);
                }
                Err(err) => {
                    debug!(target: "download", page = evt.index + 1, error = %err, "页面失败");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
    });

    match first_error {
        Some(err) => Err(err),
        None => Ok(saved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn jobs(n: usize) -> Vec<PageJob> {
        (0..n)
            .map(|index| PageJob {
                index,
                url: Url::parse(&format!("https://img.test/{index}.png")).unwrap(),
            })
            .collect()
    }

    #[test]
    fn every_job_runs_once() {
        let seen = Mutex::new(Vec::new());
        let mut reported = Vec::new();
        let saved = run_pages(
            jobs(10),
            4,
            |job, _| {
                seen.lock().unwrap().push(job.index);
                Ok(())
            },
            |idx| reported.push(idx),
        )
        .unwrap();

        assert_eq!(saved, 10);
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        reported.sort_unstable();
        assert_eq!(reported, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn single_worker_keeps_ascending_order() {
        let seen = Mutex::new(Vec::new());
        run_pages(
            jobs(5),
            1,
            |job, _| {
                seen.lock().unwrap().push(job.index);
                Ok(())
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(seen.into_inner().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn first_failure_stops_remaining_jobs() {
        let started = AtomicUsize::new(0);
        let err = run_pages(
            jobs(50),
            1,
            |job, _| {
                started.fetch_add(1, Ordering::SeqCst);
                if job.index == 2 {
                    Err(SyncError::markup("https://img.test/2.png", "boom"))
                } else {
                    Ok(())
                }
            },
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, SyncError::UnrecognizedMarkup { .. }));
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_job_list_is_a_no_op() {
        assert_eq!(run_pages(Vec::new(), 4, |_, _| Ok(()), |_| {}).unwrap(), 0);
    }
}
