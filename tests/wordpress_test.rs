use carrousel::config;
use carrousel::imaging::decode_data_url;
use carrousel::wordpress::{ArticleSource, ImportError, WordPressClient};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ===========================================================================
// Minimal WordPress stand-in
// ===========================================================================

struct FakeWordPress {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeWordPress {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let log = Arc::clone(&log);
                thread::spawn(move || serve(stream, port, &log));
            }
        });
        Self { port, requests }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn png() -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 60, Rgba([9, 9, 9, 255])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn route(method: &str, path: &str, port: u16) -> (u16, &'static str, Vec<u8>) {
    let json = |s: String| (200, "application/json", s.into_bytes());
    match (method, path) {
        ("GET", "/wp-json/wp/v2/posts?slug=mon-article") => json(
            r#"[{
                "title": {"rendered": "Le &laquo;&nbsp;titre&nbsp;&raquo;"},
                "content": {"rendered": "<p>Un.</p>\n<p>Deux.</p>"},
                "excerpt": {"rendered": "<p>Le résumé.</p>"},
                "link": "https://example.org/mon-article/",
                "categories": [3],
                "featured_media": 9
            }]"#
            .to_string(),
        ),
        ("GET", "/wp-json/wp/v2/posts?slug=sans-image") => json(
            r#"[{"title": {"rendered": "Nu"}, "categories": [4], "featured_media": 0}]"#.to_string(),
        ),
        ("GET", "/wp-json/wp/v2/posts?slug=absent") => json("[]".to_string()),
        ("GET", "/wp-json/wp/v2/categories/3") => json(r#"{"slug": "edito"}"#.to_string()),
        ("GET", "/wp-json/wp/v2/categories/4") => json(r#"{"slug": "sport"}"#.to_string()),
        ("GET", "/wp-json/wp/v2/media/9") => json(format!(
            r#"{{"caption": {{"rendered": "<p>Photo&nbsp;: X</p>"}},
                "source_url": "http://127.0.0.1:{port}/img/photo-scaled.png"}}"#
        )),
        ("HEAD", "/img/photo.png") => (200, "image/png", Vec::new()),
        ("GET", "/img/photo.png") => (200, "image/png", png()),
        _ => (404, "text/plain", b"not found".to_vec()),
    }
}

fn serve(mut stream: TcpStream, port: u16, log: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(n) if n > 0 => buf.extend_from_slice(&chunk[..n]),
            _ => return,
        }
    }
    let request = String::from_utf8_lossy(&buf).to_string();
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or("GET").to_string();
    let path = parts.next().unwrap_or("/").to_string();
    log.lock().unwrap().push(format!("{method} {path}"));

    let (status, mime, body) = route(&method, &path, port);
    let head = format!(
        "HTTP/1.1 {status} X\r\nContent-Type: {mime}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    if method != "HEAD" {
        let _ = stream.write_all(&body);
    }
}

fn client() -> WordPressClient {
    WordPressClient::from_config(&config::WordPress {
        user_agent: "carrousel-test".into(),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn imports_full_article() {
    let wp = FakeWordPress::start();
    let article = client().import(&wp.url("/2024/01/mon-article/")).await.unwrap();

    assert_eq!(article.title, "Le «\u{a0}titre\u{a0}»");
    assert_eq!(article.content, "Un.\n\nDeux.");
    assert_eq!(article.legend, "Le résumé.");
    assert_eq!(article.article_url, "https://example.org/mon-article/");
    assert_eq!(article.rubric.as_deref(), Some("édito"));
    assert_eq!(article.image_caption.as_deref(), Some("Photo\u{a0}: X"));

    let data_url = article.image_data_url.unwrap();
    assert!(data_url.starts_with("data:image/png;base64,"));
    assert_eq!(decode_data_url(&data_url).unwrap().height(), 60);

    // The unscaled original was probed and downloaded.
    let requests = wp.requests();
    assert!(requests.contains(&"HEAD /img/photo.png".to_string()));
    assert!(requests.contains(&"GET /img/photo.png".to_string()));
    assert!(!requests.iter().any(|r| r.contains("photo-scaled")));
}

#[tokio::test]
async fn unmapped_category_and_missing_media_are_silent() {
    let wp = FakeWordPress::start();
    let article = client().import(&wp.url("/sans-image")).await.unwrap();
    assert_eq!(article.title, "Nu");
    assert_eq!(article.rubric, None);
    assert_eq!(article.image_data_url, None);
    assert_eq!(article.article_url, "");
}

#[tokio::test]
async fn reports_user_facing_errors() {
    let wp = FakeWordPress::start();
    let c = client();

    assert_eq!(c.import("pas une url").await.unwrap_err(), ImportError::InvalidUrl);
    assert_eq!(c.import(&wp.url("/absent")).await.unwrap_err(), ImportError::NotFound);
    assert_eq!(
        c.import(&wp.url("/inconnu")).await.unwrap_err(),
        ImportError::ApiUnavailable
    );

    let closed = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);
    assert_eq!(
        c.import(&format!("http://127.0.0.1:{port}/article")).await.unwrap_err(),
        ImportError::Unreachable
    );
}
