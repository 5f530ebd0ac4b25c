use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server root does not exist: {0}")]
    RootNotFound(String),

    #[error("failed to bind: {0}")]
    Bind(io::Error),
}

/// Ephemeral static file server used to crawl local directories over
/// HTTP. Binds `127.0.0.1` on an OS-chosen port and lives exactly as
/// long as one crawl.
pub struct StaticServer {
    origin: String,
    root: PathBuf,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl StaticServer {
    pub async fn start(
        root: impl Into<PathBuf>,
        directory_listing: bool,
    ) -> Result<Self, ServerError> {
        let root: PathBuf = root.into();
        let root = tokio::fs::canonicalize(&root)
            .await
            .map_err(|_| ServerError::RootNotFound(root.display().to_string()))?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(ServerError::Bind)?;
        let addr = listener.local_addr().map_err(ServerError::Bind)?;
        let origin = format!("http://{addr}");
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let serve_root = root.clone();
        let accept_task = tokio::spawn(async move {
            let mut connections: Vec<JoinHandle<()>> = Vec::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _peer)) => {
                            connections.retain(|conn| !conn.is_finished());
                            let root = serve_root.clone();
                            connections.push(tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, &root, directory_listing).await
                                {
                                    debug!("connection error: {e}");
                                }
                            }));
                        }
                        Err(e) => warn!("accept failed: {e}"),
                    },
                }
            }
            // Tear down anything still alive, keep-alive included.
            for conn in connections {
                conn.abort();
            }
        });

        debug!(origin = %origin, root = %root.display(), "static server listening");
        Ok(Self {
            origin,
            root,
            shutdown,
            accept_task,
        })
    }

    /// HTTP origin the server listens on, e.g. `http://127.0.0.1:49152`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Canonicalized filesystem root being served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting, drop live connections, and wait for the loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
    }
}

async fn read_line_timed(
    reader: &mut BufReader<OwnedReadHalf>,
    buf: &mut String,
) -> io::Result<usize> {
    timeout(REQUEST_TIMEOUT, reader.read_line(buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request read timed out"))?
}

async fn handle_connection(
    stream: TcpStream,
    root: &Path,
    directory_listing: bool,
) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    if read_line_timed(&mut reader, &mut request_line).await? == 0 {
        return Ok(());
    }
    // Drain the header block; nothing in it changes how we serve.
    loop {
        let mut line = String::new();
        let n = read_line_timed(&mut reader, &mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => return write_plain(&mut write_half, 400, "bad request", false).await,
    };
    if method != "GET" && method != "HEAD" {
        return write_plain(&mut write_half, 405, "method not allowed", false).await;
    }
    let head_only = method == "HEAD";

    let request_path = target.split(['?', '#']).next().unwrap_or(target);
    let Some(path) = resolve_target(root, request_path) else {
        return write_plain(&mut write_half, 404, "not found", head_only).await;
    };

    let Ok(meta) = tokio::fs::metadata(&path).await else {
        return write_plain(&mut write_half, 404, "not found", head_only).await;
    };

    if meta.is_dir() {
        // Canonical directory URLs end with a slash so that relative
        // links inside resolve under the directory.
        if !request_path.ends_with('/') {
            return write_redirect(&mut write_half, &format!("{request_path}/")).await;
        }
        let index = path.join("index.html");
        if tokio::fs::metadata(&index).await.is_ok() {
            return send_file(&mut write_half, &index, head_only).await;
        }
        if directory_listing {
            let body = render_listing(&path, request_path).await?;
            return write_response(
                &mut write_half,
                200,
                "text/html; charset=utf-8",
                body.as_bytes(),
                head_only,
            )
            .await;
        }
        return write_plain(&mut write_half, 404, "not found", head_only).await;
    }

    send_file(&mut write_half, &path, head_only).await
}

/// Map a request target onto the served root. Rejects traversal and
/// undecodable paths.
fn resolve_target(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(request_path).ok()?;
    let relative = decoded.trim_start_matches('/');
    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(root.join(candidate))
}

async fn send_file(write_half: &mut OwnedWriteHalf, path: &Path, head_only: bool) -> io::Result<()> {
    match tokio::fs::read(path).await {
        Ok(body) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            write_response(write_half, 200, mime.essence_str(), &body, head_only).await
        }
        Err(_) => write_plain(write_half, 404, "not found", head_only).await,
    }
}

/// Generated index page for a directory: escaped entry names, trailing
/// slash on subdirectories.
async fn render_listing(dir: &Path, request_path: &str) -> io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry
            .file_type()
            .await
            .map(|kind| kind.is_dir())
            .unwrap_or(false)
        {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let display_path = urlencoding::decode(request_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| request_path.to_string());
    let mut body = String::new();
    body.push_str("<!DOCTYPE html>\n<html><head><title>Index of ");
    body.push_str(&html_escape::encode_text(&display_path));
    body.push_str("</title></head><body><h1>Index of ");
    body.push_str(&html_escape::encode_text(&display_path));
    body.push_str("</h1>\n<ul>\n");
    for name in &names {
        let is_dir = name.ends_with('/');
        let mut href = urlencoding::encode(name.trim_end_matches('/')).into_owned();
        if is_dir {
            href.push('/');
        }
        body.push_str("<li><a href=\"");
        body.push_str(&href);
        body.push_str("\">");
        body.push_str(&html_escape::encode_text(name));
        body.push_str("</a></li>\n");
    }
    body.push_str("</ul></body></html>\n");
    Ok(body)
}

async fn write_response(
    write_half: &mut OwnedWriteHalf,
    status: u16,
    content_type: &str,
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    let reason = match status {
        200 => "OK",
        301 => "Moved Permanently",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    write_half.write_all(head.as_bytes()).await?;
    if !head_only {
        write_half.write_all(body).await?;
    }
    write_half.shutdown().await
}

async fn write_plain(
    write_half: &mut OwnedWriteHalf,
    status: u16,
    message: &str,
    head_only: bool,
) -> io::Result<()> {
    write_response(write_half, status, "text/plain", message.as_bytes(), head_only).await
}

async fn write_redirect(write_half: &mut OwnedWriteHalf, location: &str) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 301 Moved Permanently\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    write_half.write_all(head.as_bytes()).await?;
    write_half.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn fixture_server(directory_listing: bool) -> (tempfile::TempDir, StaticServer) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
        std::fs::write(dir.path().join("a&b.txt"), "escaped").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/page.html"), "<p>hi</p>").unwrap();
        let server = StaticServer::start(dir.path(), directory_listing)
            .await
            .unwrap();
        (dir, server)
    }

    #[tokio::test]
    async fn serves_files_with_inferred_mime() {
        let (_dir, server) = fixture_server(false).await;
        let resp = reqwest::get(format!("{}/style.css", server.origin()))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap().to_str().unwrap(),
            "text/css"
        );
        assert_eq!(resp.text().await.unwrap(), "body {}");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn markdown_files_are_typed_as_markdown() {
        let (dir, server) = fixture_server(false).await;
        std::fs::write(dir.path().join("readme.md"), "# hello").unwrap();
        let resp = reqwest::get(format!("{}/readme.md", server.origin()))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(
            content_type.contains("markdown"),
            "unexpected content-type {content_type}"
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn missing_files_are_404() {
        let (_dir, server) = fixture_server(false).await;
        let resp = reqwest::get(format!("{}/nope.html", server.origin()))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn directory_serves_index_html_when_present() {
        let (dir, server) = fixture_server(false).await;
        std::fs::write(dir.path().join("index.html"), "<h1>root</h1>").unwrap();
        let resp = reqwest::get(format!("{}/", server.origin())).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.text().await.unwrap(), "<h1>root</h1>");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn listing_escapes_names_and_marks_directories() {
        let (_dir, server) = fixture_server(true).await;
        let resp = reqwest::get(format!("{}/", server.origin())).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body = resp.text().await.unwrap();
        assert!(body.contains("a&amp;b.txt"));
        assert!(body.contains("href=\"a%26b.txt\""));
        assert!(body.contains("sub/"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn bare_directories_404_without_listing() {
        let (_dir, server) = fixture_server(false).await;
        let resp = reqwest::get(format!("{}/sub/", server.origin()))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn directory_urls_redirect_to_trailing_slash() {
        let (_dir, server) = fixture_server(true).await;
        let resp = reqwest::get(format!("{}/sub", server.origin()))
            .await
            .unwrap();
        // reqwest follows the 301 onto the listing.
        assert_eq!(resp.status().as_u16(), 200);
        assert!(resp.url().path().ends_with("/sub/"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn head_sends_headers_only() {
        let (_dir, server) = fixture_server(false).await;
        let client = reqwest::Client::new();
        let resp = client
            .head(format!("{}/style.css", server.origin()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(
            resp.headers()
                .get("content-length")
                .unwrap()
                .to_str()
                .unwrap(),
            "7"
        );
        assert_eq!(resp.text().await.unwrap(), "");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_dir, server) = fixture_server(false).await;
        // Raw socket: clients like reqwest normalize `..` away before
        // sending, which would hide the guard under test.
        let addr = server.origin().trim_start_matches("http://").to_string();
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET /../outside.txt HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let (_dir, server) = fixture_server(false).await;
        let origin = server.origin().to_string();
        server.shutdown().await;
        assert!(reqwest::get(format!("{origin}/style.css")).await.is_err());
    }
}
