//! HTTP(S) snapshot source.
//!
//! Many cameras expose a still-image endpoint (`/snapshot.jpg`, `/cgi-bin/...`).
//! Each capture is a single GET; the body is the frame.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use super::{redact_url, CaptureStats, FrameSource};
use crate::frame::Frame;

const MAX_SNAPSHOT_BYTES: u64 = 16 * 1024 * 1024;

pub struct HttpSnapshotSource {
    url: String,
    agent: ureq::Agent,
    frames_captured: u64,
    failures: u64,
}

impl HttpSnapshotSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(url).context("parse snapshot url")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported snapshot scheme '{}'; expected http(s)",
                parsed.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            url: url.to_string(),
            agent,
            frames_captured: 0,
            failures: 0,
        })
    }

    fn fetch(&self) -> Result<Frame> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch snapshot from {}", redact_url(&self.url)))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES + 1)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot from {}", redact_url(&self.url)));
        }
        if bytes.len() as u64 > MAX_SNAPSHOT_BYTES {
            return Err(anyhow!(
                "snapshot exceeds {} bytes",
                MAX_SNAPSHOT_BYTES
            ));
        }
        Ok(Frame::new(bytes))
    }
}

impl FrameSource for HttpSnapshotSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn capture(&mut self) -> Result<Frame> {
        let result = self.fetch();
        match &result {
            Ok(_) => self.frames_captured += 1,
            Err(_) => self.failures += 1,
        }
        result
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured,
            failures: self.failures,
            source: redact_url(&self.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    /// Serve exactly one canned HTTP response on a loopback port.
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
            }
        });
        format!("http://{}/snapshot.jpg", addr)
    }

    #[test]
    fn fetches_snapshot_body() {
        let url = serve_once("200 OK", b"\xff\xd8snapshot\xff\xd9");
        let mut source = HttpSnapshotSource::new(&url, Duration::from_secs(5)).unwrap();
        let frame = source.capture().expect("capture");
        assert_eq!(frame.bytes(), b"\xff\xd8snapshot\xff\xd9");
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn error_status_is_a_capture_error() {
        let url = serve_once("503 Service Unavailable", b"busy");
        let mut source = HttpSnapshotSource::new(&url, Duration::from_secs(5)).unwrap();
        assert!(source.capture().is_err());
        assert_eq!(source.stats().failures, 1);
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(HttpSnapshotSource::new("rtsp://cam/1", Duration::from_secs(1)).is_err());
    }
}
