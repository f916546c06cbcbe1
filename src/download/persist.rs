//! 页面落盘：扩展名判定、按需转码、原子写入。

use std::io::{Cursor, Write};
use std::path::Path;

use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{DynamicImage, ImageError, ImageFormat};
use url::Url;

use super::error::{SyncError, SyncResult};
use crate::base_system::file_cleaner::{PART_PREFIX, PART_SUFFIX};

/// 可作为转码目标的格式（与启用的 `image` feature 对应）。
pub const SUPPORTED_TARGETS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

pub fn is_supported_target(ext: &str) -> bool {
    SUPPORTED_TARGETS.contains(&ext)
}

// ── 扩展名 ──────────────────────────────────────────────────────

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }
    if bytes.len() >= 6 && &bytes[0..3] == b"GIF" {
        return Some("gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && &bytes[8..12] == b"avif" {
        return Some("avif");
    }
    None
}

fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

/// 原样保存时使用的扩展名：先看内容魔数，再看地址后缀，最后退回 `jpg`。
pub fn source_extension(bytes: &[u8], url: &Url) -> String {
    sniff_extension(bytes)
        .map(str::to_string)
        .or_else(|| url_extension(url))
        .unwrap_or_else(|| "jpg".to_string())
}

fn same_format(a: &str, b: &str) -> bool {
    let canon = |e: &str| if e == "jpeg" { "jpg".to_string() } else { e.to_string() };
    canon(&a.to_ascii_lowercase()) == canon(&b.to_ascii_lowercase())
}

// ── 转码 ────────────────────────────────────────────────────────

/// 待写入的一页：最终扩展名与（可能已转码的）字节。
#[derive(Debug)]
pub struct PreparedPage {
    pub extension: String,
    source_extension: String,
    bytes: Vec<u8>,
    quality: u8,
}

impl PreparedPage {
    /// `target` 为空或与源格式一致时原样写入，否则在 [`commit`](Self::commit) 时转码。
    pub fn new(bytes: Vec<u8>, url: &Url, target: Option<&str>, quality: u8) -> Self {
        let source_extension = source_extension(&bytes, url);
        let extension = target
            .map(str::to_string)
            .unwrap_or_else(|| source_extension.clone());
        Self {
            extension,
            source_extension,
            bytes,
            quality,
        }
    }

    pub fn needs_transcode(&self) -> bool {
        !same_format(&self.extension, &self.source_extension)
    }

    /// 写入 `path`；需要时先转码。
    pub fn commit(self, path: &Path) -> SyncResult<()> {
        let bytes = if self.needs_transcode() {
            transcode(&self.bytes, &self.extension, self.quality).map_err(|source| SyncError::Image {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            self.bytes
        };
        write_atomic(path, &bytes).map_err(|e| SyncError::io(path, e))
    }
}

fn unsupported(ext: &str) -> ImageError {
    let hint = ImageFormatHint::Name(ext.to_string());
    ImageError::Unsupported(UnsupportedError::from_format_and_kind(
        hint.clone(),
        UnsupportedErrorKind::Format(hint),
    ))
}

fn transcode(bytes: &[u8], target: &str, quality: u8) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let mut out = Vec::new();

    match target {
        "jpg" | "jpeg" => {
            let rgb = img.to_rgb8();
            let q = quality.clamp(1, 100);
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, q);
            encoder.encode(
                &rgb,
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )?;
        }
        "webp" => {
            // webp 编码器只接受 8 位 RGB(A)
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)?;
        }
        other => {
            let format = ImageFormat::from_extension(other).ok_or_else(|| unsupported(other))?;
            img.write_to(&mut Cursor::new(&mut out), format)?;
        }
    }
    Ok(out)
}

// ── 原子写入 ────────────────────────────────────────────────────

/// 先写同目录下的 `.page-*.part` 临时文件，再重命名到目标路径；
/// 进程中途退出只会留下 `.part`，不会留下半截页面。
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(PART_PREFIX)
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(2, 2, Rgb([200, 10, 10]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extension_prefers_magic_bytes_over_url() {
        let png = png_bytes();
        assert_eq!(source_extension(&png, &url("https://img.test/a/1.jpg")), "png");
        assert_eq!(source_extension(b"????", &url("https://img.test/a/1.WEBP?x=1")), "webp");
        assert_eq!(source_extension(b"????", &url("https://img.test/a/page")), "jpg");
    }

    #[test]
    fn matching_target_is_written_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let png = png_bytes();
        let page = PreparedPage::new(png.clone(), &url("https://img.test/1"), Some("png"), 90);
        assert!(!page.needs_transcode());
        let path = tmp.path().join("1.png");
        page.commit(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), png);
    }

    #[test]
    fn jpeg_alias_counts_as_same_format() {
        let page = PreparedPage::new(vec![0xFF, 0xD8, 0xFF, 0xE0], &url("https://img.test/1"), Some("jpeg"), 90);
        assert!(!page.needs_transcode());
        assert_eq!(page.extension, "jpeg");
    }

    #[test]
    fn differing_target_is_transcoded() {
        let tmp = tempfile::tempdir().unwrap();
        let page = PreparedPage::new(png_bytes(), &url("https://img.test/1.png"), Some("jpg"), 80);
        assert!(page.needs_transcode());
        let path = tmp.path().join("1.jpg");
        page.commit(&path).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn undecodable_payload_is_an_image_error() {
        let tmp = tempfile::tempdir().unwrap();
        let page = PreparedPage::new(b"not an image".to_vec(), &url("https://img.test/1.gif"), Some("png"), 90);
        let err = page.commit(&tmp.path().join("1.png")).unwrap_err();
        assert!(matches!(err, SyncError::Image { .. }));
        assert!(!tmp.path().join("1.png").exists());
    }

    #[test]
    fn atomic_write_leaves_no_temporary_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("01.jpg");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["01.jpg".to_string()]);
    }
}
