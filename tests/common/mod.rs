#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use bato_downloader::base_system::context::Config;
use bato_downloader::download::naming::NamingMode;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

#[derive(Clone)]
pub struct Route {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    /// 前 N 次请求返回 `fail_status`。
    pub failures: usize,
    pub fail_status: u16,
    /// 设置后以 302 跳转到该路径。
    pub redirect_to: Option<String>,
}

impl Route {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into().into_bytes(),
            content_type: "text/html; charset=utf-8",
            failures: 0,
            fail_status: 500,
            redirect_to: None,
        }
    }

    pub fn png(body: Vec<u8>) -> Self {
        Self {
            body,
            content_type: "image/png",
            failures: 0,
            fail_status: 500,
            redirect_to: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            redirect_to: Some(location.to_string()),
            ..Self::html("")
        }
    }

    pub fn failing(mut self, failures: usize, status: u16) -> Self {
        self.failures = failures;
        self.fail_status = status;
        self
    }
}

pub struct FixtureServer {
    pub base: String,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FixtureServer {
    pub fn start() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base = format!("http://{}", server.server_addr());

        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();

        let routes_srv = routes.clone();
        let hits_srv = hits.clone();
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().split('?').next().unwrap_or("").to_string();
                let count = {
                    let mut hits = hits_srv.lock().unwrap();
                    let entry = hits.entry(path.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                };

                let route = routes_srv.lock().unwrap().get(&path).cloned();
                let response = match route {
                    Some(route) if count <= route.failures => {
                        tiny_http::Response::from_string("temporarily unavailable")
                            .with_status_code(route.fail_status)
                            .boxed()
                    }
                    Some(Route {
                        redirect_to: Some(location),
                        ..
                    }) => {
                        let header =
                            tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                                .unwrap();
                        tiny_http::Response::from_string("moved")
                            .with_status_code(302)
                            .with_header(header)
                            .boxed()
                    }
                    Some(route) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            route.content_type.as_bytes(),
                        )
                        .unwrap();
                        tiny_http::Response::from_data(route.body)
                            .with_header(header)
                            .boxed()
                    }
                    None => tiny_http::Response::from_string("not found")
                        .with_status_code(404)
                        .boxed(),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base,
            routes,
            hits,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    pub fn url(&self, path: &str) -> url::Url {
        url::Url::parse(&format!("{}{}", self.base, path)).unwrap()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn hits_with_prefix(&self, prefix: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, n)| *n)
            .sum()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ── 页面夹具 ────────────────────────────────────────────────────

pub fn tiny_png(shade: u8) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(3, 2, Rgb([shade, 40, 200]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// 新版系列页：章节按最旧在前排列。
pub fn current_series_html(title: &str, chapters: &[(&str, &str)]) -> String {
    let links: String = chapters
        .iter()
        .map(|(href, label)| {
            format!(r#"<div class="flex"><a class="link-hover link-primary visited:text-accent" href="{href}">{label}</a></div>"#)
        })
        .collect();
    format!(
        r#"<!doctype html><html><head><title>{title} - Read Free Manga Online at Bato.To</title></head>
<body><div data-name="chapter-list">{links}</div></body></html>"#
    )
}

/// 新版章节页：图片列表在 astro-island props 里，以 `[类型, JSON 字符串]` 形式并做实体转义。
pub fn current_chapter_html(title: &str, images: &[String]) -> String {
    let inner = serde_json::to_string(images).unwrap();
    let outer = serde_json::to_string(&serde_json::json!([1, inner])).unwrap();
    let escaped = outer.replace('&', "&amp;").replace('"', "&quot;");
    format!(
        r#"<!doctype html><html><head><title>{title} - Bato.To</title></head>
<body><astro-island uid="Z1" props="{{&quot;imageFiles&quot;:{escaped},&quot;urlP&quot;:[0,1]}}"></astro-island></body></html>"#
    )
}

/// 旧版系列页：章节按最新在前排列。
pub fn legacy_series_html(title: &str, newest_first: &[(&str, &str)]) -> String {
    let links: String = newest_first
        .iter()
        .map(|(href, label)| {
            format!(r#"<div class="item"><a class="visited chapt" href="{href}"><b>{label}</b><span> 3 days ago</span></a></div>"#)
        })
        .collect();
    format!(
        r#"<html><head><title>{title} Manga</title></head><body><div class="main">{links}</div></body></html>"#
    )
}

pub fn legacy_chapter_html(title: &str, images: &[String]) -> String {
    let list = serde_json::to_string(images).unwrap();
    format!(
        "<html><head><title>{title} - Bato.To</title></head><body>\n<script>\nconst imgHttps = {list};\nconst batoWord = \"x\";\n</script></body></html>"
    )
}

pub fn test_config(save_dir: &Path, mode: NamingMode) -> Config {
    Config {
        save_path: save_dir.to_string_lossy().into_owned(),
        naming_mode: mode,
        max_workers: 3,
        request_timeout: 5,
        max_retries: 5,
        retry_wait_ms: 10,
        show_progress: false,
        ..Config::default()
    }
}

pub fn sorted_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}
