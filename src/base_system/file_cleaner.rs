//! 章节目录中的临时文件清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// 页面写入时使用的临时文件前缀与后缀。
pub const PART_PREFIX: &str = ".page-";
pub const PART_SUFFIX: &str = ".part";

/// 是否为页面写入留下的临时文件（`.page-*.part`）。
pub fn is_stale_part(name: &str) -> bool {
    name.len() > PART_PREFIX.len() + PART_SUFFIX.len()
        && name.starts_with(PART_PREFIX)
        && name.ends_with(PART_SUFFIX)
}

/// 删除上次中断遗留的 `.page-*.part` 临时文件，返回删除数量。
/// 用户自己放进目录的其它 `*.part` 文件不动；目录不存在时返回 0。
pub fn remove_stale_parts(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_stale_part(name) {
            debug!(target: "download", file = name, "删除残留临时文件");
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
