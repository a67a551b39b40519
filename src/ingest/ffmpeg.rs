//! One-shot frame grab through the `ffmpeg` command line tool.
//!
//! Each capture spawns `ffmpeg`, asks for exactly one video frame written as a
//! high-quality JPEG into a temporary file, reads the file back and deletes it.
//! The child is bounded by a hard timeout; on expiry it is killed and reaped.
//! Its stderr is drained on a helper thread so a chatty ffmpeg cannot stall
//! on a full pipe.

use anyhow::{anyhow, bail, Context, Result};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{redact_url, CaptureStats, FrameSource};
use crate::frame::Frame;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const TEMP_PREFIX: &str = "motion_check_";

/// Configuration for an ffmpeg-backed source.
#[derive(Clone, Debug)]
pub struct FfmpegConfig {
    /// Anything ffmpeg accepts as `-i` (e.g. "rtsp://192.168.1.20:554/stream1").
    pub url: String,
    pub ffmpeg_path: PathBuf,
    pub timeout: Duration,
    /// Passed as `-rtsp_transport` for rtsp(s) inputs only.
    pub rtsp_transport: String,
    pub temp_dir: Option<PathBuf>,
}

pub struct FfmpegSource {
    config: FfmpegConfig,
    frames_captured: u64,
    failures: u64,
}

impl FfmpegSource {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config,
            frames_captured: 0,
            failures: 0,
        }
    }

    fn capture_once(&self) -> Result<Frame> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(".jpg");
        let output = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("create temporary frame file")?
        .into_temp_path();

        let args = ffmpeg_args(&self.config.url, &self.config.rtsp_transport, &output);
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.config.ffmpeg_path.display()))?;

        let stderr_reader = child.stderr.take().map(spawn_stderr_reader);
        let status = wait_with_timeout(&mut child, self.config.timeout)?;
        if !status.success() {
            let stderr = stderr_reader
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            bail!(
                "ffmpeg exited with {} for {}: {}",
                status,
                redact_url(&self.config.url),
                stderr.trim()
            );
        }

        let data = std::fs::read(&output)
            .with_context(|| format!("read captured frame {}", output.display()))?;
        if data.is_empty() {
            return Err(anyhow!(
                "ffmpeg produced no frame for {}",
                redact_url(&self.config.url)
            ));
        }
        // `output` drops here and removes the temporary file.
        Ok(Frame::new(data))
    }
}

impl FrameSource for FfmpegSource {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn capture(&mut self) -> Result<Frame> {
        let result = self.capture_once();
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
            source: redact_url(&self.config.url),
        }
    }
}

/// Argument vector for a single-frame grab of `url` into `output`.
pub(crate) fn ffmpeg_args(url: &str, rtsp_transport: &str, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-loglevel".into(), "error".into()];
    if is_rtsp(url) && !rtsp_transport.is_empty() {
        args.push("-rtsp_transport".into());
        args.push(rtsp_transport.into());
    }
    args.extend(
        ["-i", url, "-frames:v", "1", "-q:v", "2", "-y"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

fn is_rtsp(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("rtsp://") || lower.starts_with("rtsps://")
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context("poll ffmpeg")? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            bail!("frame capture timed out after {:?}", timeout);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_stderr_reader(mut pipe: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}
