//! 站点页面结构解析。
//!
//! 站点先后用过两套互不兼容的页面结构，这里各实现为一个 [`Dialect`]，按固定优先级依次尝试：
//! 新版（`CurrentLayout`）在前，旧版（`LegacyLayout`）在后。新增结构只需再实现一个 `Dialect`，
//! 编排层不用改动。
//!
//! 任何一种都匹配不上，或匹配上但内容无法解码，一律返回 `UnrecognizedMarkup`，
//! 不会把“解析失败”当成“没有章节 / 没有图片”。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::network::Document;
use crate::download::error::{SyncError, SyncResult};
use crate::download::models::{ChapterRef, ChapterSet, PageSet};

/// 一种页面结构。
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// 章节链接，保持页面中的出现顺序；结构不匹配时返回空。
    fn chapter_links(&self, doc: &Html, base: &Url) -> Vec<ChapterRef>;

    /// 章节列表是否按最新在前排列。
    fn newest_first(&self) -> bool;

    /// 定位图片列表字面量，返回解码后的 JSON 文本（其后可能还有其它内容）。
    /// 找不到锚点时返回 `None`。
    fn page_list_literal(&self, raw_html: &str) -> Option<String>;
}

/// 新版页面：章节列表在 `data-name="chapter-list"` 容器中按最旧在前排列；
/// 图片列表在 astro-island 的 props 里，引号被转义为 `&quot;`。
pub struct CurrentLayout;

/// 旧版页面：`a.visited.chapt` 链接按最新在前排列；图片列表是 `const imgHttps = [...]`。
pub struct LegacyLayout;

static DIALECTS: [&dyn Dialect; 2] = [&CurrentLayout, &LegacyLayout];

pub fn dialects() -> &'static [&'static dyn Dialect] {
    &DIALECTS
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid css selector"))
}

fn sel_current_chapters() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector(&S, r#"div[data-name="chapter-list"] a.link-primary[href]"#)
}

fn sel_legacy_chapters() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector(&S, "a.visited.chapt[href]")
}

fn sel_bold() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector(&S, "b")
}

fn sel_title() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector(&S, "title")
}

fn re_chapter_title() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"^(.+) - Chapter ([0-9]+(?:\.[0-9]+)?)\b").expect("valid regex")
    })
}

const CURRENT_PAGES_ANCHOR: &str = "imageFiles&quot;:";
const LEGACY_PAGES_ANCHOR: &str = "const imgHttps =";

impl Dialect for CurrentLayout {
    fn name(&self) -> &'static str {
        "current"
    }

    fn chapter_links(&self, doc: &Html, base: &Url) -> Vec<ChapterRef> {
        doc.select(sel_current_chapters())
            .filter_map(|a| chapter_ref(a, element_text(a), base))
            .collect()
    }

    fn newest_first(&self) -> bool {
        false
    }

    fn page_list_literal(&self, raw_html: &str) -> Option<String> {
        let start = raw_html.find(CURRENT_PAGES_ANCHOR)? + CURRENT_PAGES_ANCHOR.len();
        let rest = &raw_html[start..];
        // 实体转义后的属性值里不会出现裸双引号，遇到即为属性结束
        let end = rest
            .find(['"', '<'])
            .unwrap_or(rest.len());
        Some(unescape_basic_entities(&rest[..end]))
    }
}

impl Dialect for LegacyLayout {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn chapter_links(&self, doc: &Html, base: &Url) -> Vec<ChapterRef> {
        doc.select(sel_legacy_chapters())
            .filter_map(|a| {
                let label = a
                    .select(sel_bold())
                    .next()
                    .map(element_text)
                    .unwrap_or_else(|| element_text(a));
                chapter_ref(a, label, base)
            })
            .collect()
    }

    fn newest_first(&self) -> bool {
        true
    }

    fn page_list_literal(&self, raw_html: &str) -> Option<String> {
        let start = raw_html.find(LEGACY_PAGES_ANCHOR)? + LEGACY_PAGES_ANCHOR.len();
        Some(raw_html[start..].to_string())
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn chapter_ref(a: ElementRef<'_>, label: String, base: &Url) -> Option<ChapterRef> {
    let href = a.value().attr("href")?;
    let Some(identifier) = label.split_whitespace().last() else {
        debug!(target: "network", href, "章节链接没有文字，跳过");
        return None;
    };
    match base.join(href.trim()) {
        Ok(url) => Some(ChapterRef {
            identifier: identifier.to_string(),
            url,
        }),
        Err(err) => {
            warn!(target: "network", href, error = %err, "无法解析章节链接，跳过");
            None
        }
    }
}

/// 从系列页提取章节列表，统一为最旧在前。
pub fn extract_chapters(doc: &Document) -> SyncResult<ChapterSet> {
    let html = Html::parse_document(&doc.html);
    for dialect in dialects() {
        let mut chapters = dialect.chapter_links(&html, &doc.url);
        if chapters.is_empty() {
            continue;
        }
        // 同一章节在页面中可能出现多次（如桌面/移动两份列表），按地址去重
        let mut seen = HashSet::new();
        chapters.retain(|c| seen.insert(c.url.clone()));
        if dialect.newest_first() {
            chapters.reverse();
        }
        debug!(
            target: "network",
            dialect = dialect.name(),
            count = chapters.len(),
            "解析章节列表"
        );
        return Ok(chapters);
    }
    Err(SyncError::markup(&doc.url, "no known chapter-list markup found"))
}

/// 从章节页提取图片地址列表（阅读顺序）。
pub fn extract_pages(doc: &Document) -> SyncResult<PageSet> {
    for dialect in dialects() {
        let Some(literal) = dialect.page_list_literal(&doc.html) else {
            continue;
        };
        let raw_urls = parse_page_literal(&literal).map_err(|reason| {
            SyncError::markup(&doc.url, format!("{} page list: {reason}", dialect.name()))
        })?;
        if raw_urls.is_empty() {
            return Err(SyncError::markup(
                &doc.url,
                format!("{} page list is empty", dialect.name()),
            ));
        }
        let pages = raw_urls
            .iter()
            .map(|raw| {
                doc.url.join(raw.trim()).map_err(|err| {
                    SyncError::markup(&doc.url, format!("bad page url {raw:?}: {err}"))
                })
            })
            .collect::<SyncResult<PageSet>>()?;
        debug!(
            target: "network",
            dialect = dialect.name(),
            count = pages.len(),
            "解析图片列表"
        );
        return Ok(pages);
    }
    Err(SyncError::markup(&doc.url, "no known page-list anchor found"))
}

/// 解析锚点后的第一个 JSON 值。
///
/// 支持两种形态：字符串数组；或 `[类型标记, "<JSON 字符串>"]` 的包装形式。
fn parse_page_literal(literal: &str) -> Result<Vec<String>, String> {
    let value = first_json_value(literal)?;
    let items = value
        .as_array()
        .ok_or_else(|| "expected a JSON array".to_string())?;

    if let [Value::Number(_), Value::String(inner)] = items.as_slice() {
        let inner_value = first_json_value(inner)?;
        return string_array(&inner_value);
    }
    string_array(&value)
}

fn first_json_value(text: &str) -> Result<Value, String> {
    let mut stream = serde_json::Deserializer::from_str(text.trim_start()).into_iter::<Value>();
    match stream.next() {
        Some(Ok(v)) => Ok(v),
        Some(Err(err)) => Err(format!("invalid JSON: {err}")),
        None => Err("no JSON value after anchor".to_string()),
    }
}

fn string_array(value: &Value) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| "expected a JSON array".to_string())?;
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            // 新版偶见 `[0, "url"]` 形式的元素
            Value::Array(pair) => pair
                .iter()
                .find_map(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| format!("array element without url: {item}")),
            other => Err(format!("unexpected element: {other}")),
        })
        .collect()
}

/// 页面 `<title>`，去掉配置的站点后缀。
pub fn page_title(doc: &Document, suffixes: &[String]) -> SyncResult<String> {
    let html = Html::parse_document(&doc.html);
    let raw = html
        .select(sel_title())
        .next()
        .map(element_text)
        .ok_or_else(|| SyncError::markup(&doc.url, "missing <title>"))?;

    // 文本节点的实体已由 HTML 解析器解码，这里不再二次解码
    let mut title = raw.trim().to_string();
    // 只去掉一个后缀，多个匹配时取最长的那个
    if let Some(suffix) = suffixes
        .iter()
        .filter(|s| !s.is_empty() && title.ends_with(s.as_str()))
        .max_by_key(|s| s.len())
    {
        title.truncate(title.len() - suffix.len());
        title.truncate(title.trim_end().len());
    }

    if title.is_empty() {
        return Err(SyncError::markup(&doc.url, "empty <title>"));
    }
    Ok(title)
}

/// 单章模式：从 `"<系列名> - Chapter <章节号>"` 形式的标题中拆出系列名和章节号。
pub fn chapter_title(doc: &Document, suffixes: &[String]) -> SyncResult<(String, String)> {
    let title = page_title(doc, suffixes)?;
    let caps = re_chapter_title().captures(&title).ok_or_else(|| {
        SyncError::markup(
            &doc.url,
            format!("title {title:?} does not look like \"<series> - Chapter <number>\""),
        )
    })?;
    let series = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    let number = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    if series.is_empty() {
        return Err(SyncError::markup(&doc.url, "empty series name in title"));
    }
    Ok((series.to_string(), number.to_string()))
}

/// 原始 HTML 属性片段的基本实体解码（解析器之外直接截取的文本才需要）。
fn unescape_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#x22;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
