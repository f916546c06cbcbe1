//! 续传计划与章节范围过滤。
//!
//! 本地目录内容是唯一的持久状态：是否完成、缺哪些页，都只由目录里的文件推出。

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::error::{SyncError, SyncResult};
use super::models::{ChapterRange, ChapterRef};
use super::naming::{NamingMode, normalize_identifier, page_index_of};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// 目录是否已存在（不存在时需要先创建）。
    pub dir_exists: bool,
    pub already_present: BTreeSet<usize>,
    /// 升序排列。
    pub to_fetch: Vec<usize>,
}

impl ResumePlan {
    pub fn is_complete(&self) -> bool {
        self.to_fetch.is_empty()
    }
}

/// 章节目录的本地状态（不访问网络）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    /// 目录不存在，或其中没有任何本工具管理的页面。
    Absent,
    /// 至少有一页；是否完整需要拿到远端页数才能确定。
    Present { pages: usize },
}

/// 扫描目录，返回本工具管理的页面下标集合。目录不存在时返回 `None`。
fn scan_pages(dir: &Path, mode: NamingMode) -> SyncResult<Option<BTreeSet<usize>>> {
    let entries = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SyncError::io(dir, err)),
    };

    let mut present = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map(|t| t.is_file())
            .map_err(|e| SyncError::io(entry.path(), e))?;
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        match page_index_of(name, mode) {
            Some(idx) => {
                present.insert(idx);
            }
            None => debug!(target: "download", file = name, "忽略非页面文件"),
        }
    }
    Ok(Some(present))
}

/// 计算一章还需要下载哪些页。
///
/// 本地页面下标超出远端页数时返回 `InconsistentState`：无法判断哪些文件可信。
pub fn plan_chapter(dir: &Path, expected_page_count: usize, mode: NamingMode) -> SyncResult<ResumePlan> {
    let Some(present) = scan_pages(dir, mode)? else {
        return Ok(ResumePlan {
            dir_exists: false,
            already_present: BTreeSet::new(),
            to_fetch: (0..expected_page_count).collect(),
        });
    };

    if let Some(&max) = present.last()
        && max >= expected_page_count
    {
        return Err(SyncError::InconsistentState {
            path: dir.to_path_buf(),
            reason: format!(
                "found page {} on disk but the chapter only has {expected_page_count} page(s)",
                max + 1
            ),
        });
    }

    let to_fetch = (0..expected_page_count)
        .filter(|idx| !present.contains(idx))
        .collect();

    Ok(ResumePlan {
        dir_exists: true,
        already_present: present,
        to_fetch,
    })
}

pub fn local_status(dir: &Path, mode: NamingMode) -> SyncResult<LocalStatus> {
    Ok(match scan_pages(dir, mode)? {
        Some(pages) if !pages.is_empty() => LocalStatus::Present { pages: pages.len() },
        _ => LocalStatus::Absent,
    })
}

/// 按章节号截取闭区间 `[start, end]`；比较使用规范化后的章节号。
///
/// 起止章节不在列表中时报错，而不是静默返回空集合。
pub fn apply_range(chapters: &[ChapterRef], range: &ChapterRange) -> SyncResult<Vec<ChapterRef>> {
    let find = |identifier: &str| {
        let wanted = normalize_identifier(identifier);
        chapters
            .iter()
            .position(|c| normalize_identifier(&c.identifier) == wanted)
            .ok_or_else(|| SyncError::UnknownChapter {
                identifier: identifier.to_string(),
            })
    };

    let start_idx = match range.start.as_deref() {
        Some(id) => find(id)?,
        None => 0,
    };
    let end_idx = match range.end.as_deref() {
        Some(id) => find(id)?,
        None => chapters.len().saturating_sub(1),
    };

    if chapters.is_empty() || start_idx > end_idx {
        return Ok(Vec::new());
    }
    Ok(chapters[start_idx..=end_idx].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn chapters(ids: &[&str]) -> Vec<ChapterRef> {
        ids.iter()
            .map(|id| ChapterRef {
                identifier: id.to_string(),
                url: Url::parse(&format!("https://example.test/chapter/{id}")).unwrap(),
            })
            .collect()
    }

    #[test]
    fn missing_directory_fetches_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = plan_chapter(&tmp.path().join("1"), 3, NamingMode::Default).unwrap();
        assert!(!plan.dir_exists);
        assert!(plan.already_present.is_empty());
        assert_eq!(plan.to_fetch, vec![0, 1, 2]);
    }

    #[test]
    fn partial_directory_fetches_only_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "1.jpg");
        touch(tmp.path(), "3.jpg");
        touch(tmp.path(), "readme.txt");

        let plan = plan_chapter(tmp.path(), 3, NamingMode::Default).unwrap();
        assert!(plan.dir_exists);
        assert_eq!(plan.already_present, BTreeSet::from([0, 2]));
        assert_eq!(plan.to_fetch, vec![1]);
        assert!(!plan.is_complete());
    }

    #[test]
    fn complete_directory_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["01.png", "02.png", "03.webp", "04.jpg", "05.jpg", "06.jpg", "07.jpg", "08.jpg", "09.jpg", "10.jpg"] {
            touch(tmp.path(), name);
        }
        let plan = plan_chapter(tmp.path(), 10, NamingMode::Default).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.already_present.len(), 10);
    }

    #[test]
    fn verbose_mode_matches_page_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "Series - Chapter 007 - 2.jpg");
        touch(tmp.path(), "2.jpg");

        let plan = plan_chapter(tmp.path(), 2, NamingMode::Verbose).unwrap();
        assert_eq!(plan.already_present, BTreeSet::from([1]));
        assert_eq!(plan.to_fetch, vec![0]);
    }

    #[test]
    fn more_pages_on_disk_than_remote_is_inconsistent() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "1.jpg");
        touch(tmp.path(), "5.jpg");

        let err = plan_chapter(tmp.path(), 3, NamingMode::Default).unwrap_err();
        assert!(matches!(err, SyncError::InconsistentState { .. }));
    }

    #[test]
    fn local_status_reflects_managed_pages_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("2");
        assert_eq!(local_status(&dir, NamingMode::Default).unwrap(), LocalStatus::Absent);

        fs::create_dir(&dir).unwrap();
        touch(&dir, "Thumbs.db");
        assert_eq!(local_status(&dir, NamingMode::Default).unwrap(), LocalStatus::Absent);

        touch(&dir, "1.jpg");
        assert_eq!(
            local_status(&dir, NamingMode::Default).unwrap(),
            LocalStatus::Present { pages: 1 }
        );
    }

    #[test]
    fn range_is_inclusive_and_normalized() {
        let all = chapters(&["1", "2", "2.5", "3", "Finale"]);
        let range = ChapterRange {
            start: Some("002".to_string()),
            end: Some("3".to_string()),
        };
        let picked = apply_range(&all, &range).unwrap();
        let ids: Vec<_> = picked.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["2", "2.5", "3"]);

        let open_end = ChapterRange {
            start: Some("Finale".to_string()),
            end: None,
        };
        assert_eq!(apply_range(&all, &open_end).unwrap().len(), 1);
        assert_eq!(apply_range(&all, &ChapterRange::default()).unwrap().len(), 5);
    }

    #[test]
    fn unknown_range_bound_is_an_error() {
        let all = chapters(&["1", "2"]);
        let range = ChapterRange {
            start: Some("9".to_string()),
            end: None,
        };
        assert!(matches!(
            apply_range(&all, &range),
            Err(SyncError::UnknownChapter { .. })
        ));
    }
}
