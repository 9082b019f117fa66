use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the remote feed bearer token.
pub const ACCESS_TOKEN_ENV: &str = "CHANGEWATCH_ACCESS_TOKEN";
/// Environment variable holding the SMTP password.
pub const SMTP_PASSWORD_ENV: &str = "CHANGEWATCH_SMTP_PASSWORD";

const CONFIG_DIR_NAME: &str = ".changewatch";
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path the config was loaded from (or would be written to).
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub local: LocalWatchConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

// ── Local folder watching ───────────────────────────────────────────

fn default_tracked_extension() -> String {
    ".csv".into()
}

fn default_settle_window_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalWatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Folder watched recursively. Required when enabled.
    #[serde(default)]
    pub folder: Option<PathBuf>,
    /// Only paths ending in this suffix produce change records.
    #[serde(default = "default_tracked_extension")]
    pub tracked_extension: String,
    /// Quiet period after the last raw event on a path before it is final.
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
}

impl Default for LocalWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: None,
            tracked_extension: default_tracked_extension(),
            settle_window_ms: default_settle_window_ms(),
        }
    }
}

impl LocalWatchConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    /// Enabled and pointed at a folder. Without a folder there is nothing to watch.
    pub fn is_active(&self) -> bool {
        self.enabled && self.folder.is_some()
    }
}

// ── Remote delta tracking ───────────────────────────────────────────

fn default_remote_folder() -> String {
    "one-drive-tracker".into()
}

fn default_graph_base_url() -> String {
    changewatch_delta::client::GRAPH_BASE_URL.into()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Folder path relative to the drive root.
    #[serde(default = "default_remote_folder")]
    pub folder: String,
    /// Resolve the folder in this user's drive instead of the signed-in user's.
    #[serde(default)]
    pub drive_user: Option<String>,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Entries whose name starts with this prefix are ignored. Defaults to
    /// the last component of `folder`; set to `""` to disable.
    #[serde(default)]
    pub skip_prefix: Option<String>,
    /// Seed the record store from the first snapshot without emitting changes.
    #[serde(default = "default_true")]
    pub baseline_on_first_run: bool,
    /// Bearer token; `CHANGEWATCH_ACCESS_TOKEN` takes precedence.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: default_remote_folder(),
            drive_user: None,
            graph_base_url: default_graph_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            skip_prefix: None,
            baseline_on_first_run: true,
            access_token: None,
        }
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Effective skip prefix. `None` disables the filter.
    pub fn effective_skip_prefix(&self) -> Option<String> {
        let prefix = match &self.skip_prefix {
            Some(p) => p.clone(),
            None => self
                .folder
                .trim_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        (!prefix.is_empty()).then_some(prefix)
    }
}

// ── Storage ─────────────────────────────────────────────────────────

fn default_change_log() -> PathBuf {
    PathBuf::from("changes.jsonl")
}

fn default_record_file() -> PathBuf {
    PathBuf::from("remote-record.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for relative storage paths. Defaults to the config directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_change_log")]
    pub change_log: PathBuf,
    #[serde(default = "default_record_file")]
    pub record_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            change_log: default_change_log(),
            record_file: default_record_file(),
        }
    }
}

// ── Notifier ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierBackend {
    #[default]
    Log,
    Email,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifierConfig {
    #[serde(default)]
    pub backend: NotifierBackend,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    /// `CHANGEWATCH_SMTP_PASSWORD` takes precedence.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

// ── Supervisor ──────────────────────────────────────────────────────

fn default_shutdown_grace_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How long `stop_all` waits for loops to observe cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Default config path: `~/.changewatch/config.toml`.
pub fn default_config_path() -> PathBuf {
    let base = directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// Load config from `path` (or the default path). A missing file yields
    /// defaults; a present but invalid file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(expand_path)
            .unwrap_or_else(default_config_path);

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str::<Config>(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("config: {} not found, using defaults", config_path.display());
                Config::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", config_path.display()))
            }
        };
        config.config_path = config_path;
        config.apply_env_overrides();
        config.expand_paths();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(token) = std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            self.remote.access_token = Some(token);
        }
        if let Some(smtp) = self.notifier.smtp.as_mut() {
            if let Some(pw) = std::env::var(SMTP_PASSWORD_ENV).ok().filter(|p| !p.is_empty()) {
                smtp.password = Some(pw);
            }
        }
    }

    fn expand_paths(&mut self) {
        if let Some(folder) = self.local.folder.as_mut() {
            *folder = expand_path(folder);
        }
        if let Some(dir) = self.storage.data_dir.as_mut() {
            *dir = expand_path(dir);
        }
        self.storage.change_log = expand_path(&self.storage.change_log);
        self.storage.record_file = expand_path(&self.storage.record_file);
    }

    /// Directory relative storage paths resolve against.
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            self.config_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }

    pub fn change_log_path(&self) -> PathBuf {
        self.resolve(&self.storage.change_log)
    }

    pub fn record_file_path(&self) -> PathBuf {
        self.resolve(&self.storage.record_file)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.local.settle_window_ms == 0 {
            bail!("[local].settle_window_ms must be greater than zero");
        }
        if self.remote.poll_interval_ms == 0 {
            bail!("[remote].poll_interval_ms must be greater than zero");
        }
        if self.remote.folder.trim_matches('/').is_empty() {
            bail!("[remote].folder must name a folder below the drive root");
        }
        if self.notifier.backend == NotifierBackend::Email {
            let Some(smtp) = &self.notifier.smtp else {
                bail!("[notifier].backend = \"email\" requires a [notifier.smtp] section");
            };
            if smtp.recipients.is_empty() {
                bail!("[notifier.smtp].recipients must list at least one address");
            }
        }
        Ok(())
    }
}
