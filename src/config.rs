use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CAMERA_DETECTION_CONFIG";

const DEFAULT_TOPIC_PREFIX: &str = "camera_detection";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_PIXEL_COUNT_THRESHOLD: u32 = 2000;
const DEFAULT_PIXEL_DELTA_THRESHOLD: u32 = 30;
const DEFAULT_BYTE_THRESHOLD: u64 = 50_000;
const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RTSP_TRANSPORT: &str = "tcp";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OFF_DELAY_SECS: u32 = 60;

/// Description keywords that mark a detection as a static decoration.
pub const DEFAULT_IGNORE_KEYWORDS: &[&str] = &[
    "decoration",
    "deer",
    "stag",
    "reindeer",
    "illuminated",
    "christmas",
    "holiday",
    "light",
];

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    snapshot_url: Option<String>,
    anthropic_api_key: Option<String>,
    topic_prefix: Option<String>,
    check_interval_secs: Option<u64>,
    startup_delay_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    ignore_keywords: Option<Vec<String>>,
    motion: Option<MotionConfigFile>,
    capture: Option<CaptureConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    discovery: Option<DiscoveryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    policy: Option<String>,
    pixel_count_threshold: Option<u32>,
    pixel_delta_threshold: Option<u32>,
    byte_threshold: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    backend: Option<String>,
    ffmpeg_path: Option<PathBuf>,
    timeout_secs: Option<u64>,
    rtsp_transport: Option<String>,
    temp_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    model: Option<String>,
    max_tokens: Option<u32>,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DiscoveryConfigFile {
    off_delay_secs: Option<u32>,
}

/// Runtime configuration, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub snapshot_url: String,
    pub anthropic_api_key: ApiKey,
    pub topic_prefix: String,
    pub check_interval: Duration,
    pub startup_delay: Duration,
    pub cooldown: Duration,
    pub ignore_keywords: Vec<String>,
    pub motion: MotionSettings,
    pub capture: CaptureSettings,
    pub classifier: ClassifierSettings,
    pub discovery: DiscoverySettings,
}

/// Vision API credential. `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(<empty>)")
        } else {
            write!(f, "ApiKey(<redacted>)")
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MotionPolicy {
    /// Resized grayscale pixel differencing.
    #[default]
    Pixel,
    /// Absolute difference of encoded frame sizes.
    ByteSize,
}

impl FromStr for MotionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pixel" | "pixels" => Ok(Self::Pixel),
            "byte_size" | "bytes" | "size" => Ok(Self::ByteSize),
            other => Err(anyhow!(
                "unknown motion policy '{}': expected 'pixel' or 'byte_size'",
                other
            )),
        }
    }
}

impl fmt::Display for MotionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixel => write!(f, "pixel"),
            Self::ByteSize => write!(f, "byte_size"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub policy: MotionPolicy,
    /// Number of changed pixels needed to call it motion (pixel policy).
    pub pixel_count_threshold: u32,
    /// Per-pixel intensity change that counts as "changed" (pixel policy).
    pub pixel_delta_threshold: u8,
    /// Encoded size delta needed to call it motion (byte-size policy).
    pub byte_threshold: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            policy: MotionPolicy::Pixel,
            pixel_count_threshold: DEFAULT_PIXEL_COUNT_THRESHOLD,
            pixel_delta_threshold: DEFAULT_PIXEL_DELTA_THRESHOLD as u8,
            byte_threshold: DEFAULT_BYTE_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureBackend {
    /// HTTP snapshot for http(s) URLs, ffmpeg for everything else.
    #[default]
    Auto,
    Ffmpeg,
    Http,
}

impl FromStr for CaptureBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ffmpeg" => Ok(Self::Ffmpeg),
            "http" | "snapshot" => Ok(Self::Http),
            other => Err(anyhow!(
                "unknown capture backend '{}': expected 'auto', 'ffmpeg' or 'http'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub backend: CaptureBackend,
    pub ffmpeg_path: PathBuf,
    pub timeout: Duration,
    pub rtsp_transport: String,
    /// Directory for the temporary frame file. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Auto,
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_PATH),
            timeout: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT_SECS),
            rtsp_transport: DEFAULT_RTSP_TRANSPORT.to_string(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model: String,
    pub max_tokens: u32,
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Seconds after which Home Assistant flips the motion sensor back to OFF.
    pub off_delay_secs: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            off_delay_secs: DEFAULT_OFF_DELAY_SECS,
        }
    }
}

impl MonitorConfig {
    /// Load from `path`, or from `CAMERA_DETECTION_CONFIG` when no path is given,
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: MonitorConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let motion_file = file.motion.unwrap_or_default();
        let capture_file = file.capture.unwrap_or_default();
        let classifier_file = file.classifier.unwrap_or_default();

        let pixel_delta = motion_file
            .pixel_delta_threshold
            .unwrap_or(DEFAULT_PIXEL_DELTA_THRESHOLD);
        let pixel_delta_threshold = u8::try_from(pixel_delta).map_err(|_| {
            anyhow!(
                "motion.pixel_delta_threshold must be between 0 and 255, got {}",
                pixel_delta
            )
        })?;

        let motion = MotionSettings {
            policy: match motion_file.policy.as_deref() {
                Some(policy) => policy.parse()?,
                None => MotionPolicy::default(),
            },
            pixel_count_threshold: motion_file
                .pixel_count_threshold
                .unwrap_or(DEFAULT_PIXEL_COUNT_THRESHOLD),
            pixel_delta_threshold,
            byte_threshold: motion_file.byte_threshold.unwrap_or(DEFAULT_BYTE_THRESHOLD),
        };

        let capture = CaptureSettings {
            backend: match capture_file.backend.as_deref() {
                Some(backend) => backend.parse()?,
                None => CaptureBackend::default(),
            },
            ffmpeg_path: capture_file
                .ffmpeg_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_PATH)),
            timeout: Duration::from_secs(
                capture_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
            ),
            rtsp_transport: capture_file
                .rtsp_transport
                .unwrap_or_else(|| DEFAULT_RTSP_TRANSPORT.to_string()),
            temp_dir: capture_file.temp_dir,
        };

        let classifier = ClassifierSettings {
            model: classifier_file
                .model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: classifier_file.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            api_url: classifier_file
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(
                classifier_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
            ),
        };

        let discovery = DiscoverySettings {
            off_delay_secs: file
                .discovery
                .and_then(|d| d.off_delay_secs)
                .unwrap_or(DEFAULT_OFF_DELAY_SECS),
        };

        Ok(Self {
            snapshot_url: file.snapshot_url.unwrap_or_default(),
            anthropic_api_key: ApiKey::new(file.anthropic_api_key.unwrap_or_default()),
            topic_prefix: file
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            check_interval: Duration::from_secs(
                file.check_interval_secs
                    .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            ),
            startup_delay: Duration::from_secs(
                file.startup_delay_secs
                    .unwrap_or(DEFAULT_STARTUP_DELAY_SECS),
            ),
            cooldown: Duration::from_secs(file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
            ignore_keywords: file.ignore_keywords.unwrap_or_else(|| {
                DEFAULT_IGNORE_KEYWORDS
                    .iter()
                    .map(|k| k.to_string())
                    .collect()
            }),
            motion,
            capture,
            classifier,
            discovery,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("CAMERA_SNAPSHOT_URL") {
            self.snapshot_url = url;
        }
        if let Some(key) = env_nonempty("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = ApiKey::new(key);
        }
        if let Some(prefix) = env_nonempty("CAMERA_TOPIC_PREFIX") {
            self.topic_prefix = prefix;
        }
        if let Some(interval) = env_nonempty("CAMERA_CHECK_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("CAMERA_CHECK_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.check_interval = Duration::from_secs(seconds);
        }
        if let Some(cooldown) = env_nonempty("CAMERA_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("CAMERA_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.cooldown = Duration::from_secs(seconds);
        }
        if let Some(policy) = env_nonempty("CAMERA_MOTION_POLICY") {
            self.motion.policy = policy.parse()?;
        }
        if let Some(path) = env_nonempty("CAMERA_FFMPEG_PATH") {
            self.capture.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(model) = env_nonempty("CAMERA_VISION_MODEL") {
            self.classifier.model = model;
        }
        if let Ok(keywords) = std::env::var("CAMERA_IGNORE_KEYWORDS") {
            self.ignore_keywords = split_csv(&keywords);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.snapshot_url = self.snapshot_url.trim().to_string();
        if self.snapshot_url.is_empty() {
            return Err(anyhow!("snapshot_url is required"));
        }
        if self.snapshot_url.contains("://") {
            url::Url::parse(&self.snapshot_url)
                .map_err(|e| anyhow!("invalid snapshot_url '{}': {}", self.snapshot_url, e))?;
        }
        if self.anthropic_api_key.is_empty() {
            return Err(anyhow!("anthropic_api_key is required"));
        }

        self.topic_prefix = self.topic_prefix.trim().trim_end_matches('/').to_string();
        if self.topic_prefix.is_empty() {
            return Err(anyhow!("topic_prefix must not be empty"));
        }
        if self.topic_prefix.contains(['+', '#']) {
            return Err(anyhow!(
                "topic_prefix must not contain MQTT wildcards: {}",
                self.topic_prefix
            ));
        }

        if self.check_interval.is_zero() {
            return Err(anyhow!("check_interval_secs must be greater than zero"));
        }
        if self.capture.timeout.is_zero() {
            return Err(anyhow!("capture.timeout_secs must be greater than zero"));
        }
        if self.classifier.timeout.is_zero() {
            return Err(anyhow!("classifier.timeout_secs must be greater than zero"));
        }
        if self.classifier.max_tokens == 0 {
            return Err(anyhow!("classifier.max_tokens must be greater than zero"));
        }

        self.ignore_keywords = self
            .ignore_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        snapshot_url = "rtsp://192.168.1.20:554/stream1"
        anthropic_api_key = "sk-test"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = MonitorConfig::from_toml_str(MINIMAL).expect("config");
        assert_eq!(cfg.topic_prefix, "camera_detection");
        assert_eq!(cfg.check_interval, Duration::from_secs(30));
        assert_eq!(cfg.startup_delay, Duration::from_secs(5));
        assert_eq!(cfg.cooldown, Duration::from_secs(30));
        assert_eq!(cfg.motion.policy, MotionPolicy::Pixel);
        assert_eq!(cfg.motion.pixel_count_threshold, 2000);
        assert_eq!(cfg.motion.pixel_delta_threshold, 30);
        assert_eq!(cfg.motion.byte_threshold, 50_000);
        assert_eq!(cfg.capture.timeout, Duration::from_secs(10));
        assert_eq!(cfg.capture.backend, CaptureBackend::Auto);
        assert_eq!(cfg.classifier.model, "claude-3-5-haiku-20241022");
        assert_eq!(cfg.classifier.max_tokens, 500);
        assert_eq!(cfg.ignore_keywords.len(), DEFAULT_IGNORE_KEYWORDS.len());
    }

    #[test]
    fn missing_snapshot_url_is_rejected() {
        let err = MonitorConfig::from_toml_str(r#"anthropic_api_key = "k""#).unwrap_err();
        assert!(err.to_string().contains("snapshot_url"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = MonitorConfig::from_toml_str(r#"snapshot_url = "rtsp://cam/1""#).unwrap_err();
        assert!(err.to_string().contains("anthropic_api_key"));
    }

    #[test]
    fn pixel_delta_above_255_is_rejected() {
        let raw = format!("{MINIMAL}\n[motion]\npixel_delta_threshold = 300\n");
        let err = MonitorConfig::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("pixel_delta_threshold"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let raw = format!("check_interval_secs = 0\n{MINIMAL}");
        assert!(MonitorConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn topic_prefix_is_trimmed_and_wildcards_rejected() {
        let raw = format!("topic_prefix = \"cams/front/\"\n{MINIMAL}");
        let cfg = MonitorConfig::from_toml_str(&raw).expect("config");
        assert_eq!(cfg.topic_prefix, "cams/front");

        let raw = format!("topic_prefix = \"cams/#\"\n{MINIMAL}");
        assert!(MonitorConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn policy_parses_aliases() {
        assert_eq!("pixel".parse::<MotionPolicy>().unwrap(), MotionPolicy::Pixel);
        assert_eq!(
            "BYTE_SIZE".parse::<MotionPolicy>().unwrap(),
            MotionPolicy::ByteSize
        );
        assert!("histogram".parse::<MotionPolicy>().is_err());
        assert_eq!(MotionPolicy::ByteSize.to_string(), "byte_size");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let cfg = MonitorConfig::from_toml_str(MINIMAL).expect("config");
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("sk-test"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn keywords_are_normalized() {
        let raw = format!("ignore_keywords = [\" Flag \", \"\", \"INFLATABLE\"]\n{MINIMAL}");
        let cfg = MonitorConfig::from_toml_str(&raw).expect("config");
        assert_eq!(cfg.ignore_keywords, vec!["flag", "inflatable"]);
    }
}
