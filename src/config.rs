use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::render::Scale;

const DEFAULT_BASE_URL: &str = "https://console.aitrios.sony-semicon.com/api/v1";
const DEFAULT_TOKEN_URL: &str = "https://auth.aitrios.sony-semicon.com/oauth2/default/v1/token";
const DEFAULT_CLASSES: [&str; 3] = ["CLASS0", "CLASS1", "CLASS2"];
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_STREAM_INTERVAL_SECS: u64 = 1;
const DEFAULT_ERROR_BACKOFF_SECS: u64 = 5;
const DEFAULT_INFERENCE_BATCH: usize = 10;
const DEFAULT_CANVAS_SIZE: u32 = 320;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_JOIN_TIMEOUT_MILLIS: u64 = 1000;
const MAX_CLASSES: usize = 256;

pub const CONFIG_PATH_ENV: &str = "AITRIOS_MONITOR_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    device_id: Option<String>,
    credentials: Option<CredentialsConfigFile>,
    endpoints: Option<EndpointsConfigFile>,
    classes: Option<Vec<String>>,
    timing: Option<TimingConfigFile>,
    inference_batch: Option<usize>,
    canvas: Option<CanvasConfigFile>,
    scale: Option<ScaleConfigFile>,
}

#[derive(Deserialize, Default)]
struct CredentialsConfigFile {
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl fmt::Debug for CredentialsConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfigFile")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
struct EndpointsConfigFile {
    base_url: Option<String>,
    token_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    monitor_interval_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    stream_interval_secs: Option<u64>,
    error_backoff_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    join_timeout_millis: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CanvasConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ScaleConfigFile {
    x: Option<f32>,
    y: Option<f32>,
}

/// Runtime configuration of the monitor: defaults, then the optional config file, then
/// `AITRIOS_*` environment variables.
#[derive(Clone)]
pub struct MonitorConfig {
    pub device_id: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub base_url: String,
    pub token_url: String,
    pub classes: Vec<String>,
    pub timing: TimingSettings,
    /// Inference records fetched per correlation attempt.
    pub inference_batch: usize,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scale: Scale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingSettings {
    pub monitor_interval: Duration,
    pub poll_interval: Duration,
    /// Poll interval while the device streams inference results only.
    pub stream_interval: Duration,
    pub error_backoff: Duration,
    pub request_timeout: Duration,
    pub join_timeout: Duration,
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("device_id", &self.device_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("classes", &self.classes)
            .field("timing", &self.timing)
            .field("inference_batch", &self.inference_batch)
            .field("canvas_width", &self.canvas_width)
            .field("canvas_height", &self.canvas_height)
            .field("scale", &self.scale)
            .finish()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Loads using the file named by `AITRIOS_MONITOR_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_layers(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layers(Some(path))
    }

    fn load_layers(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let credentials = file.credentials.unwrap_or_default();
        let endpoints = file.endpoints.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();
        let canvas = file.canvas.unwrap_or_default();
        let scale = file.scale.unwrap_or_default();
        Self {
            device_id: file.device_id.unwrap_or_default(),
            client_id: credentials.client_id.unwrap_or_default(),
            client_secret: Zeroizing::new(credentials.client_secret.unwrap_or_default()),
            base_url: endpoints
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token_url: endpoints
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            classes: file
                .classes
                .unwrap_or_else(|| DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()),
            timing: TimingSettings {
                monitor_interval: secs(timing.monitor_interval_secs, DEFAULT_MONITOR_INTERVAL_SECS),
                poll_interval: secs(timing.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS),
                stream_interval: secs(timing.stream_interval_secs, DEFAULT_STREAM_INTERVAL_SECS),
                error_backoff: secs(timing.error_backoff_secs, DEFAULT_ERROR_BACKOFF_SECS),
                request_timeout: secs(timing.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS),
                join_timeout: Duration::from_millis(
                    timing.join_timeout_millis.unwrap_or(DEFAULT_JOIN_TIMEOUT_MILLIS),
                ),
            },
            inference_batch: file.inference_batch.unwrap_or(DEFAULT_INFERENCE_BATCH),
            canvas_width: canvas.width.unwrap_or(DEFAULT_CANVAS_SIZE),
            canvas_height: canvas.height.unwrap_or(DEFAULT_CANVAS_SIZE),
            scale: Scale {
                x: scale.x.unwrap_or(1.0),
                y: scale.y.unwrap_or(1.0),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device_id) = env_nonempty("AITRIOS_DEVICE_ID") {
            self.device_id = device_id;
        }
        if let Some(client_id) = env_nonempty("AITRIOS_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(secret) = env_nonempty("AITRIOS_CLIENT_SECRET") {
            self.client_secret = Zeroizing::new(secret);
        }
        if let Some(url) = env_nonempty("AITRIOS_BASE_URL") {
            self.base_url = url;
        }
        if let Some(url) = env_nonempty("AITRIOS_TOKEN_URL") {
            self.token_url = url;
        }
        if let Ok(classes) = std::env::var("AITRIOS_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.classes = parsed;
            }
        }
        if let Some(value) = env_nonempty("AITRIOS_POLL_INTERVAL_SECS") {
            self.timing.poll_interval = Duration::from_secs(parse_env_u64(
                "AITRIOS_POLL_INTERVAL_SECS",
                &value,
            )?);
        }
        if let Some(value) = env_nonempty("AITRIOS_MONITOR_INTERVAL_SECS") {
            self.timing.monitor_interval = Duration::from_secs(parse_env_u64(
                "AITRIOS_MONITOR_INTERVAL_SECS",
                &value,
            )?);
        }
        if let Some(value) = env_nonempty("AITRIOS_INFERENCE_BATCH") {
            self.inference_batch = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("AITRIOS_INFERENCE_BATCH must be a positive integer"))?;
        }
        Ok(())
    }

    /// Checks the invariants the session relies on. Called by every loader.
    pub fn validate(&self) -> Result<()> {
        crate::validate_device_id(&self.device_id)?;

        if self.classes.len() > MAX_CLASSES {
            return Err(anyhow!(
                "class table has {} entries; at most {} are supported",
                self.classes.len(),
                MAX_CLASSES
            ));
        }
        let timing = &self.timing;
        for (name, value) in [
            ("monitor interval", timing.monitor_interval),
            ("poll interval", timing.poll_interval),
            ("stream interval", timing.stream_interval),
            ("error backoff", timing.error_backoff),
            ("request timeout", timing.request_timeout),
            ("join timeout", timing.join_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if self.inference_batch == 0 {
            return Err(anyhow!("inference batch must be greater than zero"));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(anyhow!("canvas dimensions must be greater than zero"));
        }
        if !(self.scale.x.is_finite() && self.scale.y.is_finite())
            || self.scale.x <= 0.0
            || self.scale.y <= 0.0
        {
            return Err(anyhow!("scale factors must be positive"));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| anyhow!("invalid base url {}: {}", self.base_url, e))?;
        url::Url::parse(&self.token_url)
            .map_err(|e| anyhow!("invalid token url {}: {}", self.token_url, e))?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds", key))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
