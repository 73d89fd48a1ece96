use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::write_atomic;

const CONFIG_VERSION: u32 = 1;
const MIN_AUTOSAVE_SECONDS: u64 = 5;
const MAX_AUTOSAVE_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read session config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse session config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize session config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write session config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 工作階段管理設定。 / Session manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Directory holding every session sub-directory.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
    /// Sub-directory used when an operation names none.
    #[serde(default = "default_dir")]
    pub dir: String,
    /// Option names to persist; the host decides each option's scope.
    #[serde(default = "default_options")]
    pub options: Vec<String>,
    #[serde(default)]
    pub autosave: AutosaveConfig,
    /// Report saves, loads and deletes through the host notification channel.
    #[serde(default = "default_true")]
    pub notify: bool,
    /// Extension names that run first, in this order.
    #[serde(default)]
    pub load_order: Vec<String>,
    /// Per-extension configuration payloads.
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

fn default_dir() -> String {
    "session".to_string()
}

/// `<data dir>/sessionkit`, falling back to a relative directory when the platform has
/// no data dir.
pub fn default_session_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("sessionkit"))
        .unwrap_or_else(|| PathBuf::from(".sessionkit"))
}

fn default_options() -> Vec<String> {
    [
        "hidden",
        "laststatus",
        "showtabline",
        "cmdheight",
        "filetype",
        "expandtab",
        "readonly",
        "buflisted",
        "wrap",
        "number",
        "winfixwidth",
        "winfixheight",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            session_root: default_session_root(),
            dir: default_dir(),
            options: default_options(),
            autosave: AutosaveConfig::default(),
            notify: true,
            load_order: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        if self.session_root.as_os_str().is_empty() {
            self.session_root = default_session_root();
        }
        let dir = self.dir.trim().to_string();
        if dir.is_empty() || dir.contains(['/', '\\']) || dir == "." || dir == ".." {
            self.dir = default_dir();
        } else {
            self.dir = dir;
        }
        self.options.retain(|name| !name.trim().is_empty());
        dedup_preserving_order(&mut self.options);
        dedup_preserving_order(&mut self.load_order);
        self.autosave.sanitize();
    }

    /// Directory for the named session sub-directory, or the configured default.
    /// 取得工作階段資料夾路徑。
    pub fn session_dir(&self, dir: Option<&str>) -> PathBuf {
        self.session_root.join(dir.unwrap_or(&self.dir))
    }
}

fn dedup_preserving_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_autosave_interval")]
    pub interval_seconds: u64,
    /// Whether autosaves produce notifications.
    #[serde(default)]
    pub notify: bool,
}

fn default_autosave_interval() -> u64 {
    300
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_autosave_interval(),
            notify: false,
        }
    }
}

impl AutosaveConfig {
    fn sanitize(&mut self) {
        if self.interval_seconds == 0 {
            self.interval_seconds = default_autosave_interval();
        }
        self.interval_seconds = self
            .interval_seconds
            .clamp(MIN_AUTOSAVE_SECONDS, MAX_AUTOSAVE_SECONDS);
    }
}

/// 設定檔存放區。 / Loads and persists a [`SessionConfig`] file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: SessionConfig,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: SessionConfig) -> Self {
        let mut data = config;
        data.sanitize();
        Self {
            path: path.into(),
            data,
        }
    }

    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut data = SessionConfig::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: SessionConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.data
    }

    pub fn into_config(self) -> SessionConfig {
        self.data
    }

    pub fn update<F>(&mut self, op: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut SessionConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let payload = serde_json::to_vec_pretty(&self.data).map_err(|source| {
            ConfigError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, &payload).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
