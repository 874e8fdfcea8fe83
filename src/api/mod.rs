use crate::analysis;
use crate::error::VisionError;
use crate::pipeline::{multipart_part, AnalysisReport, Pipeline, MULTIPART_BOUNDARY};
use crate::publish::{PublishError, Publisher, ShareRequest};
use crate::storage::SnapshotStore;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const INDEX_HTML: &str = include_str!("../../static/index.html");
const UPLOADS_PREFIX: &str = "/static/uploads/";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Largest accepted request body (uploaded images).
    pub max_body_bytes: usize,
    /// Base URL used to make shared image links absolute. Defaults to
    /// `http://<Host header>`.
    pub public_base: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            public_base: None,
        }
    }
}

/// Everything a request handler may touch.
pub struct AppState {
    pub pipeline: Pipeline,
    pub store: SnapshotStore,
    pub publisher: Box<dyn Publisher>,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open streams end when the camera goes inactive.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: AppState) -> Self {
        Self {
            cfg,
            state: Arc::new(state),
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;
        log::info!("camera api listening on http://{}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, state, shutdown_thread) {
                log::error!("camera api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    state: Arc<AppState>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let state = state.clone();
                // One thread per connection: /video_feed holds its connection open.
                let spawned = std::thread::Builder::new()
                    .name("camera-api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &cfg, &state) {
                            log::warn!("camera api request from {} failed: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("camera api could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    log::info!("camera api shut down");
    Ok(())
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, state: &AppState) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json(&mut stream, 403, &ErrorBody::new("forbidden"))?;
        return Ok(());
    }

    let request = match read_request(&mut stream, cfg.max_body_bytes) {
        Ok(request) => request,
        Err(err) => {
            write_json(&mut stream, 400, &ErrorBody::new("bad request"))?;
            return Err(err);
        }
    };
    log::debug!("{} {}", request.method, request.path);

    let method = request.method.as_str();
    let path = request.path.as_str();
    match (method, path) {
        ("GET", "/") => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            INDEX_HTML.as_bytes(),
        ),
        ("GET", "/video_feed") => video_feed(&mut stream, state),
        ("POST", "/toggle_camera") => toggle_camera(&mut stream, state),
        ("POST", "/take_snapshot") => take_snapshot(&mut stream, state),
        ("GET", "/get_snapshots") => {
            let snapshots = state.store.list()?;
            write_json(&mut stream, 200, &snapshots)
        }
        ("GET", "/analyze_frame") => analyze_frame(&mut stream, state),
        ("POST", "/analyze_image") => analyze_image(&mut stream, state, &request.body),
        ("POST", "/analyze_upload") | ("POST", "/analyze_webcam") => {
            analyze_upload(&mut stream, state, &request.body)
        }
        ("POST", "/share") => share(&mut stream, cfg, state, &request),
        ("GET", p) if p.starts_with(UPLOADS_PREFIX) => {
            let name = &p[UPLOADS_PREFIX.len()..];
            match state.store.read(name)? {
                Some(bytes) => write_response(&mut stream, 200, "image/jpeg", &bytes),
                None => write_json(&mut stream, 404, &ErrorBody::new("not_found")),
            }
        }
        (_, p) if is_known_route(p) => {
            write_json(&mut stream, 405, &ErrorBody::new("method_not_allowed"))
        }
        _ => write_json(&mut stream, 404, &ErrorBody::new("not_found")),
    }
}

fn is_known_route(path: &str) -> bool {
    matches!(
        path,
        "/" | "/video_feed"
            | "/toggle_camera"
            | "/take_snapshot"
            | "/get_snapshots"
            | "/analyze_frame"
            | "/analyze_image"
            | "/analyze_upload"
            | "/analyze_webcam"
            | "/share"
    ) || path.starts_with(UPLOADS_PREFIX)
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

fn video_feed(stream: &mut TcpStream, state: &AppState) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        MULTIPART_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut sent = 0u64;
    for jpeg in state.pipeline.stream() {
        if let Err(err) = stream.write_all(&multipart_part(&jpeg)) {
            // Client went away; dropping the iterator cancels the stream.
            log::debug!("video feed closed by client after {} frames: {}", sent, err);
            return Ok(());
        }
        sent += 1;
    }
    log::debug!("video feed ended after {} frames", sent);
    stream.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ToggleBody {
    camera_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn toggle_camera(stream: &mut TcpStream, state: &AppState) -> Result<()> {
    match state.pipeline.session().toggle() {
        Ok(active) => write_json(
            stream,
            200,
            &ToggleBody {
                camera_active: active,
                error: None,
            },
        ),
        Err(VisionError::DeviceUnavailable(reason)) => {
            log::warn!("camera toggle failed: {}", reason);
            write_json(
                stream,
                200,
                &ToggleBody {
                    camera_active: false,
                    error: Some("Failed to open camera".to_string()),
                },
            )
        }
        Err(err) => write_json(
            stream,
            500,
            &ToggleBody {
                camera_active: false,
                error: Some(err.to_string()),
            },
        ),
    }
}

#[derive(Serialize)]
struct SnapshotBody<'a> {
    filename: &'a str,
    url: &'a str,
    analysis: &'a analysis::SceneAnalysis,
}

fn take_snapshot(stream: &mut TcpStream, state: &AppState) -> Result<()> {
    let snapshot = match state.pipeline.capture_snapshot() {
        Ok(snapshot) => snapshot,
        Err(VisionError::NotActive) => {
            return write_json(stream, 400, &ErrorBody::new("Camera is not active"));
        }
        Err(VisionError::CaptureFailure(reason)) => {
            log::warn!("snapshot capture failed: {}", reason);
            return write_json(stream, 500, &ErrorBody::new("Failed to capture frame"));
        }
        Err(err) => return write_json(stream, 500, &ErrorBody::new(err.to_string())),
    };
    let stored = match state.store.save_snapshot(&snapshot) {
        Ok(stored) => stored,
        Err(err) => {
            log::error!("snapshot not stored: {:#}", err);
            return write_json(stream, 500, &ErrorBody::new("Failed to save snapshot"));
        }
    };
    write_json(
        stream,
        200,
        &SnapshotBody {
            filename: &stored.filename,
            url: &stored.url,
            analysis: &snapshot.analysis,
        },
    )
}

fn analyze_frame(stream: &mut TcpStream, state: &AppState) -> Result<()> {
    let report = match state.pipeline.analyze_live_frame() {
        Ok(report) => report,
        Err(VisionError::NotActive) => {
            AnalysisReport::unavailable("Camera is not active", analysis::now())
        }
        Err(VisionError::CaptureFailure(_)) => {
            AnalysisReport::unavailable("Failed to capture frame", analysis::now())
        }
        Err(err) => return write_json(stream, 500, &ErrorBody::new(err.to_string())),
    };
    write_json(stream, 200, &report)
}

#[derive(Serialize)]
struct ImageAnalysisBody<'a> {
    #[serde(flatten)]
    report: &'a AnalysisReport,
    image_path: &'a str,
}

fn analyze_image(stream: &mut TcpStream, state: &AppState, body: &[u8]) -> Result<()> {
    if body.is_empty() {
        return write_json(stream, 400, &ErrorBody::new("No file uploaded"));
    }
    let report = match state.pipeline.analyze_image_bytes(body) {
        Ok(report) => report,
        Err(VisionError::MalformedInput(reason)) => {
            log::warn!("uploaded image rejected: {}", reason);
            return write_json(stream, 400, &ErrorBody::new("Invalid image format"));
        }
        Err(err) => return write_json(stream, 500, &ErrorBody::new(err.to_string())),
    };
    let stored = match state.store.save_upload(body, analysis::now()) {
        Ok(stored) => stored,
        Err(err) => {
            log::error!("upload not stored: {:#}", err);
            return write_json(stream, 500, &ErrorBody::new("Failed to process image"));
        }
    };
    write_json(
        stream,
        200,
        &ImageAnalysisBody {
            report: &report,
            image_path: &stored.url,
        },
    )
}

fn analyze_upload(stream: &mut TcpStream, state: &AppState, body: &[u8]) -> Result<()> {
    if body.is_empty() {
        return write_json(stream, 400, &ErrorBody::new("No file uploaded"));
    }
    match state.pipeline.analyze_upload_bytes(body) {
        Ok(report) => write_json(stream, 200, &report),
        Err(VisionError::MalformedInput(reason)) => {
            log::warn!("uploaded image rejected: {}", reason);
            write_json(stream, 400, &ErrorBody::new("Invalid image format"))
        }
        Err(err) => {
            log::error!("upload analysis failed: {}", err);
            write_json(stream, 500, &ErrorBody::new("Failed to analyze image"))
        }
    }
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

fn share(
    stream: &mut TcpStream,
    cfg: &ApiConfig,
    state: &AppState,
    request: &HttpRequest,
) -> Result<()> {
    let body: ShareRequest = if request.body.is_empty() {
        ShareRequest::default()
    } else {
        match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return write_json(stream, 400, &ErrorBody::new("invalid JSON body")),
        }
    };
    let public_base = match &cfg.public_base {
        Some(base) => base.clone(),
        None => format!(
            "http://{}",
            request.header("host").unwrap_or(cfg.addr.as_str())
        ),
    };
    let result = body
        .validate(&public_base)
        .and_then(|share| state.publisher.publish(&share).map(|()| share));
    match result {
        Ok(share) => write_json(
            stream,
            200,
            &MessageBody {
                message: format!("Shared to {} successfully", share.platform),
            },
        ),
        Err(err) => {
            let status = if err.is_client_error() { 400 } else { 500 };
            if let PublishError::Failed { .. } = err {
                log::warn!("share failed: {}", err);
            }
            write_json(stream, status, &ErrorBody::new(err.to_string()))
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP plumbing
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|value| value.as_str())
    }

    fn content_length(&self) -> Result<usize> {
        match self.header("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length: {}", value)),
            None => Ok(0),
        }
    }
}

fn read_request<R: Read>(stream: &mut R, max_body_bytes: usize) -> Result<HttpRequest> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    let mut request = HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body: Vec::new(),
    };

    let content_length = request.content_length()?;
    if content_length > max_body_bytes {
        return Err(anyhow!(
            "request body of {} bytes exceeds limit of {}",
            content_length,
            max_body_bytes
        ));
    }
    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    request.body = body;
    Ok(request)
}

fn write_json<W: Write, T: Serialize + ?Sized>(stream: &mut W, status: u16, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response<W: Write>(
    stream: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_request_with_body() {
        let raw = b"POST /analyze_upload?x=1 HTTP/1.1\r\nHost: localhost:5000\r\nContent-Length: 5\r\n\r\nhello";
        let request = read_request(&mut Cursor::new(raw.to_vec()), 1024).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/analyze_upload");
        assert_eq!(request.header("host"), Some("localhost:5000"));
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn rejects_oversized_body() {
        let raw = b"POST /analyze_image HTTP/1.1\r\nContent-Length: 2048\r\n\r\n";
        assert!(read_request(&mut Cursor::new(raw.to_vec()), 1024).is_err());
    }

    #[test]
    fn rejects_truncated_body() {
        let raw = b"POST /share HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(read_request(&mut Cursor::new(raw.to_vec()), 1024).is_err());
    }

    #[test]
    fn request_without_body_is_empty() {
        let raw = b"GET /get_snapshots HTTP/1.1\r\n\r\n";
        let request = read_request(&mut Cursor::new(raw.to_vec()), 1024).unwrap();
        assert!(request.body.is_empty());
    }

    #[test]
    fn response_carries_length_and_status() {
        let mut out = Vec::new();
        write_json(&mut out, 400, &ErrorBody::new("Camera is not active")).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Length: 32\r\n"));
        assert!(text.ends_with(r#"{"error":"Camera is not active"}"#));
    }

    #[test]
    fn known_routes() {
        assert!(is_known_route("/toggle_camera"));
        assert!(is_known_route("/static/uploads/a.jpg"));
        assert!(!is_known_route("/admin"));
    }
}
